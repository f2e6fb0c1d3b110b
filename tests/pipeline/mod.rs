//! End-to-end workflow tests
//!
//! These run the whole workflow against files on disk, with archives served from
//! memory instead of the TNRIS bucket.

use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;

use dem_harvest::app::raster::{geotiff, GeoKeys, GeoTransform, RasterTile, SampleType};
use dem_harvest::app::{
    Catalog, DirWorkspace, MemorySource, TileId, TnrisDataset, Workflow, WorkflowPaths, Workspace,
};
use dem_harvest::errors::{AppError, InputError, MergeError};
use tempfile::TempDir;
use url::Url;
use zip::write::FileOptions;

const DIRNAME: &str = "stratmap-2017-50cm-central-texas";

fn write_inputs(dir: &Path) {
    let index = format!(
        r#"{{"type": "FeatureCollection", "features": [
            {{"type": "Feature", "properties": {{"dirname": "{DIRNAME}", "demname": "abc1234567dem"}},
             "geometry": {{"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}}}},
            {{"type": "Feature", "properties": {{"dirname": "{DIRNAME}", "demname": "xyz7654321dem"}},
             "geometry": {{"type": "Polygon", "coordinates": [[[1,0],[2,0],[2,1],[1,1],[1,0]]]}}}},
            {{"type": "Feature", "properties": {{"dirname": "{DIRNAME}", "demname": "far9999999dem"}},
             "geometry": {{"type": "Polygon", "coordinates": [[[9,9],[10,9],[10,10],[9,10],[9,9]]]}}}}
        ]}}"#
    );
    std::fs::write(dir.join("index.geojson"), index).unwrap();
    std::fs::write(
        dir.join("aoi.geojson"),
        r#"{"type": "Polygon", "coordinates": [[[0.2,0.2],[1.8,0.2],[1.8,0.8],[0.2,0.8],[0.2,0.2]]]}"#,
    )
    .unwrap();
}

fn workflow(dir: &Path) -> Workflow {
    Workflow {
        paths: WorkflowPaths {
            index: dir.join("index.geojson"),
            aoi: dir.join("aoi.geojson"),
            intersection_output: dir.join("out").join("intersection.geojson"),
            staging_dir: dir.join("staging"),
            merged_output: dir.join("out").join("dem_merge.tif"),
        },
        ..Default::default()
    }
}

fn tile_raster(origin_x: f64, value: f32) -> Vec<u8> {
    let raster = RasterTile {
        name: String::new(),
        width: 2,
        height: 2,
        transform: GeoTransform::north_up(origin_x, 1.0, 0.5, 0.5),
        nodata: Some(-9999.0),
        sample_type: SampleType::F32,
        data: vec![value; 4],
        geokeys: GeoKeys::from_epsg(4326, true),
    };
    geotiff::encode_to_vec(&raster).unwrap()
}

fn tile_archive(tile_name: &str, raster: &[u8]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default();
    let entries: [(String, &[u8]); 3] = [
        (format!("{}.img", tile_name), raster),
        (format!("{}.img.aux.xml", tile_name), b"<PAMDataset/>"),
        ("metadata/readme.txt".to_string(), b"TNRIS"),
    ];
    for (name, contents) in entries {
        writer.start_file(name, options).unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn tile_url(id: &str) -> Url {
    Catalog::default()
        .archive_url(TnrisDataset::CentralTexas2017, &TileId::parse(id).unwrap())
        .unwrap()
}

fn full_source() -> MemorySource {
    MemorySource::new()
        .with_archive(
            &tile_url("1234567"),
            tile_archive("abc1234567dem", &tile_raster(0.0, 10.0)),
        )
        .with_archive(
            &tile_url("7654321"),
            tile_archive("xyz7654321dem", &tile_raster(1.0, 20.0)),
        )
}

#[tokio::test]
async fn test_end_to_end_two_tiles() {
    let temp_dir = TempDir::new().unwrap();
    write_inputs(temp_dir.path());
    let workflow = workflow(temp_dir.path());

    let workspace = Arc::new(DirWorkspace::create(&workflow.paths.staging_dir).unwrap());
    workspace.add("stale_from_last_run.img", b"old").unwrap();
    let source = full_source();

    let report = workflow
        .run(&source, workspace.clone(), None)
        .await
        .unwrap();

    // Tile resolution
    let ids: Vec<&str> = report.plan.tiles.tile_ids().map(TileId::as_str).collect();
    assert_eq!(ids, vec!["1234567", "7654321"]);
    let urls: Vec<String> = report
        .plan
        .urls
        .iter()
        .map(|url| url.url().unwrap().to_string())
        .collect();
    assert_eq!(
        urls,
        vec![
            "https://s3.amazonaws.com/data.tnris.org/0549d3ba-3f72-4710-b26c-28c65df9c70d/resources/stratmap17-50cm-central-texas_1234567_dem.zip",
            "https://s3.amazonaws.com/data.tnris.org/0549d3ba-3f72-4710-b26c-28c65df9c70d/resources/stratmap17-50cm-central-texas_7654321_dem.zip",
        ]
    );

    // Every tile fetched exactly once
    assert!(report.fetch.is_complete());
    assert_eq!(source.attempts(&tile_url("1234567")), 1);
    assert_eq!(source.attempts(&tile_url("7654321")), 1);

    // Staging holds exactly the tile rasters
    let staged: BTreeSet<String> = workspace.list().unwrap().into_iter().collect();
    let expected: BTreeSet<String> = ["abc1234567dem.img", "xyz7654321dem.img"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(staged, expected);
    assert_eq!(report.cleared.removed, vec!["stale_from_last_run.img"]);
    assert!(report.prune.is_exact());

    // Intersection written for audit
    let intersection =
        std::fs::read_to_string(temp_dir.path().join("out").join("intersection.geojson")).unwrap();
    let parsed: geojson::FeatureCollection = intersection.parse::<geojson::GeoJson>()
        .unwrap()
        .try_into()
        .unwrap();
    assert_eq!(parsed.features.len(), 2);

    // Merged raster covers both tiles at their common resolution
    let merged_bytes = std::fs::read(&workflow.paths.merged_output).unwrap();
    let merged = geotiff::decode("dem_merge.tif", &merged_bytes).unwrap();
    assert_eq!((merged.width, merged.height), (4, 2));
    assert_eq!(merged.transform, GeoTransform::north_up(0.0, 1.0, 0.5, 0.5));
    assert_eq!(
        merged.data,
        vec![10.0, 10.0, 20.0, 20.0, 10.0, 10.0, 20.0, 20.0]
    );
    assert_eq!(report.merge.md5, format!("{:x}", md5::compute(&merged_bytes)));
}

#[tokio::test]
async fn test_merge_rerun_is_byte_identical() {
    let temp_dir = TempDir::new().unwrap();
    write_inputs(temp_dir.path());
    let workflow = workflow(temp_dir.path());
    let workspace = Arc::new(DirWorkspace::create(&workflow.paths.staging_dir).unwrap());

    let first = workflow
        .run(&full_source(), workspace.clone(), None)
        .await
        .unwrap();
    let first_bytes = std::fs::read(&workflow.paths.merged_output).unwrap();

    let second = workflow.merge_staged(workspace.as_ref()).unwrap();
    let second_bytes = std::fs::read(&workflow.paths.merged_output).unwrap();

    assert_eq!(first.merge.md5, second.md5);
    assert_eq!(first_bytes, second_bytes);
}

#[tokio::test]
async fn test_failed_tile_does_not_stop_the_rest() {
    let temp_dir = TempDir::new().unwrap();
    write_inputs(temp_dir.path());
    let workflow = workflow(temp_dir.path());
    let workspace = Arc::new(DirWorkspace::create(&workflow.paths.staging_dir).unwrap());

    let source = MemorySource::new()
        .with_archive(
            &tile_url("1234567"),
            tile_archive("abc1234567dem", &tile_raster(0.0, 10.0)),
        )
        .with_status(&tile_url("7654321"), 404);

    let report = workflow
        .run(&source, workspace.clone(), None)
        .await
        .unwrap();

    assert_eq!(report.fetch.succeeded(), 1);
    assert_eq!(report.fetch.failures_by_kind().get("http"), Some(&1));
    assert_eq!(report.prune.missing, vec!["xyz7654321dem.img"]);
    assert_eq!(report.merge.sources, vec!["abc1234567dem.img"]);
    assert_eq!((report.merge.width, report.merge.height), (2, 2));
}

#[tokio::test]
async fn test_every_tile_failing_reports_expected_and_staged() {
    let temp_dir = TempDir::new().unwrap();
    write_inputs(temp_dir.path());
    let workflow = workflow(temp_dir.path());
    let workspace = Arc::new(DirWorkspace::create(&workflow.paths.staging_dir).unwrap());

    let err = workflow
        .run(&MemorySource::new(), workspace, None)
        .await
        .unwrap_err();

    match err {
        AppError::Merge {
            source: MergeError::NoInput { .. },
            expected,
            staged,
        } => {
            assert_eq!(expected, vec!["abc1234567dem.img", "xyz7654321dem.img"]);
            assert!(staged.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!workflow.paths.merged_output.exists());
}

#[tokio::test]
async fn test_crs_mismatch_fails_before_network() {
    let temp_dir = TempDir::new().unwrap();
    write_inputs(temp_dir.path());
    std::fs::write(
        temp_dir.path().join("aoi.geojson"),
        r#"{"type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "EPSG:3857"}},
            "features": [{"type": "Feature", "properties": {},
              "geometry": {"type": "Polygon", "coordinates": [[[0,0],[2,0],[2,1],[0,1],[0,0]]]}}]}"#,
    )
    .unwrap();
    let workflow = workflow(temp_dir.path());
    let workspace = Arc::new(DirWorkspace::create(&workflow.paths.staging_dir).unwrap());
    let source = full_source();

    let err = workflow
        .run(&source, workspace, None)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Input(InputError::CrsMismatch { .. })));
    assert_eq!(source.total_attempts(), 0);
}
