//! Mosaicking of staged tiles
//!
//! Tiles are combined onto one north-up grid:
//!
//! - resolution is the finest pixel size among the inputs, per axis;
//! - extent is the union of the input extents, with the origin at the
//!   upper-left corner;
//! - each output pixel samples the inputs at its centre (nearest neighbour);
//! - where inputs overlap, the first input in file-name order holding a valid
//!   sample wins, and later inputs never overwrite it.
//!
//! CRS keys and nodata come from the last input opened.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{geotiff, open_staged, GeoTransform, RasterTile, SampleType};
use crate::app::workspace::Workspace;
use crate::constants::raster::{DEFAULT_NODATA, MAX_MOSAIC_PIXELS};
use crate::errors::{MergeError, MergeResult};

/// Merge settings
#[derive(Debug, Clone, PartialEq)]
pub struct MergeConfig {
    /// Nodata for the output; defaults to the representative source's
    pub nodata: Option<f64>,
    /// Largest output the merger will allocate
    pub max_pixels: u64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            nodata: None,
            max_pixels: MAX_MOSAIC_PIXELS,
        }
    }
}

/// Merged raster plus provenance
#[derive(Debug, Clone, PartialEq)]
pub struct Mosaic {
    /// Output raster
    pub raster: RasterTile,
    /// Source names in processing order
    pub sources: Vec<String>,
    /// Output pixels taken from each source, aligned with `sources`
    pub contributions: Vec<usize>,
}

/// Outcome of writing a merged raster
#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    /// Output file
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub transform: GeoTransform,
    /// Nodata written to the output
    pub nodata: f64,
    /// Source names in processing order
    pub sources: Vec<String>,
    /// Size of the written file
    pub bytes: u64,
    /// MD5 digest of the written file
    pub md5: String,
}

/// Mosaic loaded tiles
///
/// Tiles are processed in the order given.
///
/// # Errors
///
/// `MergeError::NoInput` for an empty slice; sample-type, georeferencing or
/// extent errors when the tiles cannot share a grid.
pub fn merge_tiles(tiles: &[RasterTile], config: &MergeConfig) -> MergeResult<Mosaic> {
    let (first, representative) = match (tiles.first(), tiles.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return Err(MergeError::NoInput {
                expected: Vec::new(),
                staged: Vec::new(),
            })
        }
    };

    for tile in tiles {
        tile.validate()?;
        if tile.sample_type != first.sample_type {
            return Err(MergeError::SampleType {
                name: tile.name.clone(),
                expected: first.sample_type.to_string(),
                found: tile.sample_type.to_string(),
            });
        }
    }

    let res_x = tiles
        .iter()
        .map(|t| t.transform.pixel_width.abs())
        .fold(f64::INFINITY, f64::min);
    let res_y = tiles
        .iter()
        .map(|t| t.transform.pixel_height.abs())
        .fold(f64::INFINITY, f64::min);

    let (min_x, min_y, max_x, max_y) = tiles.iter().map(RasterTile::bounds).fold(
        (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        |acc, b| (acc.0.min(b.0), acc.1.min(b.1), acc.2.max(b.2), acc.3.max(b.3)),
    );

    let width = ((max_x - min_x) / res_x).round();
    let height = ((max_y - min_y) / res_y).round();
    if !(width >= 1.0 && height >= 1.0) {
        return Err(MergeError::InvalidExtent {
            reason: format!("computed size {}x{} is empty", width, height),
        });
    }
    if width * height > config.max_pixels as f64 {
        return Err(MergeError::InvalidExtent {
            reason: format!(
                "{}x{} pixels exceeds the limit of {}",
                width, height, config.max_pixels
            ),
        });
    }
    let (width, height) = (width as u32, height as u32);

    let transform = GeoTransform::north_up(min_x, max_y, res_x, res_y);
    let nodata = config
        .nodata
        .or(representative.nodata)
        .unwrap_or(DEFAULT_NODATA as f64);

    debug!(
        "Mosaic grid {}x{} at {}x{} from origin ({}, {})",
        width, height, res_x, res_y, min_x, max_y
    );

    let mut data = vec![nodata as f32; width as usize * height as usize];
    let mut filled = vec![false; data.len()];
    let mut contributions = Vec::with_capacity(tiles.len());

    for tile in tiles {
        let (t_min_x, t_min_y, t_max_x, t_max_y) = tile.bounds();
        let col_start = ((t_min_x - min_x) / res_x).floor().max(0.0) as u32;
        let col_end = (((t_max_x - min_x) / res_x).ceil().max(0.0) as u32).min(width);
        let row_start = ((max_y - t_max_y) / res_y).floor().max(0.0) as u32;
        let row_end = (((max_y - t_min_y) / res_y).ceil().max(0.0) as u32).min(height);

        let mut taken = 0;
        for row in row_start..row_end {
            let y = max_y - (row as f64 + 0.5) * res_y;
            for col in col_start..col_end {
                let index = row as usize * width as usize + col as usize;
                if filled[index] {
                    continue;
                }
                let x = min_x + (col as f64 + 0.5) * res_x;
                let (src_col, src_row) = tile.transform.world_to_pixel(x, y);
                let (src_col, src_row) = (src_col.floor(), src_row.floor());
                if src_col < 0.0
                    || src_row < 0.0
                    || src_col >= tile.width as f64
                    || src_row >= tile.height as f64
                {
                    continue;
                }
                let value = tile.sample(src_col as u32, src_row as u32);
                if tile.is_valid(value) {
                    data[index] = value;
                    filled[index] = true;
                    taken += 1;
                }
            }
        }
        debug!("{} contributed {} pixels", tile.name, taken);
        contributions.push(taken);
    }

    Ok(Mosaic {
        raster: RasterTile {
            name: "mosaic".to_string(),
            width,
            height,
            transform,
            nodata: Some(nodata),
            sample_type: SampleType::F32,
            data,
            geokeys: representative.geokeys.clone(),
        },
        sources: tiles.iter().map(|t| t.name.clone()).collect(),
        contributions,
    })
}

/// Merge every staged raster and write the result as a GeoTIFF
///
/// # Errors
///
/// `MergeError::NoInput` if the workspace is empty; any load, merge or write
/// error otherwise.
pub fn merge_workspace(
    workspace: &dyn Workspace,
    config: &MergeConfig,
    output: &Path,
) -> MergeResult<MergeReport> {
    let staged = workspace.list()?;
    merge_files(workspace, &staged, config, output)
}

/// Merge the named staged rasters and write the result as a GeoTIFF
///
/// Names are processed in sorted order whatever order they are given in.
pub fn merge_files(
    workspace: &dyn Workspace,
    names: &[String],
    config: &MergeConfig,
    output: &Path,
) -> MergeResult<MergeReport> {
    if names.is_empty() {
        return Err(MergeError::NoInput {
            expected: Vec::new(),
            staged: Vec::new(),
        });
    }
    let mut names = names.to_vec();
    names.sort();

    let tiles = names
        .iter()
        .map(|name| open_staged(workspace, name))
        .collect::<MergeResult<Vec<_>>>()?;
    let mosaic = merge_tiles(&tiles, config)?;

    let bytes = geotiff::encode_to_vec(&mosaic.raster)?;
    write_output(output, &bytes)?;
    let md5 = format!("{:x}", md5::compute(&bytes));

    info!(
        "Wrote {}x{} mosaic of {} tiles to {} (md5 {})",
        mosaic.raster.width,
        mosaic.raster.height,
        mosaic.sources.len(),
        output.display(),
        md5
    );

    Ok(MergeReport {
        output: output.to_path_buf(),
        width: mosaic.raster.width,
        height: mosaic.raster.height,
        transform: mosaic.raster.transform,
        nodata: mosaic.raster.nodata.unwrap_or(DEFAULT_NODATA as f64),
        sources: mosaic.sources,
        bytes: bytes.len() as u64,
        md5,
    })
}

fn write_output(output: &Path, bytes: &[u8]) -> MergeResult<()> {
    let write_err = |source| MergeError::Write {
        path: output.to_path_buf(),
        source,
    };
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(output, bytes).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::raster::GeoKeys;
    use crate::app::workspace::MemoryWorkspace;
    use tempfile::TempDir;

    fn tile(name: &str, origin: (f64, f64), size: (u32, u32), res: f64, data: Vec<f32>) -> RasterTile {
        RasterTile {
            name: name.into(),
            width: size.0,
            height: size.1,
            transform: GeoTransform::north_up(origin.0, origin.1, res, res),
            nodata: Some(-9999.0),
            sample_type: SampleType::F32,
            data,
            geokeys: GeoKeys::from_epsg(3857, false),
        }
    }

    #[test]
    fn test_adjacent_tiles_form_union_extent() {
        let west = tile("a.tif", (0.0, 2.0), (2, 2), 1.0, vec![1.0, 2.0, 3.0, 4.0]);
        let east = tile("b.tif", (2.0, 2.0), (2, 2), 1.0, vec![5.0, 6.0, 7.0, 8.0]);

        let mosaic = merge_tiles(&[west, east], &MergeConfig::default()).unwrap();
        assert_eq!((mosaic.raster.width, mosaic.raster.height), (4, 2));
        assert_eq!(mosaic.raster.transform, GeoTransform::north_up(0.0, 2.0, 1.0, 1.0));
        assert_eq!(
            mosaic.raster.data,
            vec![1.0, 2.0, 5.0, 6.0, 3.0, 4.0, 7.0, 8.0]
        );
        assert_eq!(mosaic.contributions, vec![4, 4]);
    }

    #[test]
    fn test_first_valid_wins_in_overlap() {
        let first = tile("a.tif", (0.0, 1.0), (2, 1), 1.0, vec![10.0, -9999.0]);
        let second = tile("b.tif", (0.0, 1.0), (2, 1), 1.0, vec![20.0, 21.0]);

        let mosaic = merge_tiles(&[first, second], &MergeConfig::default()).unwrap();
        // First tile keeps its valid pixel; the nodata hole is filled by the second
        assert_eq!(mosaic.raster.data, vec![10.0, 21.0]);
        assert_eq!(mosaic.contributions, vec![1, 1]);
    }

    #[test]
    fn test_finest_resolution_and_gaps() {
        let coarse = tile("a.tif", (0.0, 2.0), (1, 1), 2.0, vec![7.0]);
        let fine = tile("b.tif", (3.0, 2.0), (1, 2), 1.0, vec![1.0, 2.0]);

        let mosaic = merge_tiles(&[coarse, fine], &MergeConfig::default()).unwrap();
        assert_eq!((mosaic.raster.width, mosaic.raster.height), (4, 2));
        assert_eq!(
            mosaic.raster.data,
            vec![7.0, 7.0, -9999.0, 1.0, 7.0, 7.0, -9999.0, 2.0]
        );
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert!(matches!(
            merge_tiles(&[], &MergeConfig::default()),
            Err(MergeError::NoInput { .. })
        ));
    }

    #[test]
    fn test_sample_type_mismatch() {
        let a = tile("a.tif", (0.0, 1.0), (1, 1), 1.0, vec![1.0]);
        let mut b = tile("b.tif", (1.0, 1.0), (1, 1), 1.0, vec![1.0]);
        b.sample_type = SampleType::I16;
        assert!(matches!(
            merge_tiles(&[a, b], &MergeConfig::default()),
            Err(MergeError::SampleType { .. })
        ));
    }

    #[test]
    fn test_pixel_limit() {
        let a = tile("a.tif", (0.0, 10.0), (10, 10), 1.0, vec![0.0; 100]);
        let config = MergeConfig {
            max_pixels: 50,
            ..Default::default()
        };
        assert!(matches!(
            merge_tiles(&[a], &config),
            Err(MergeError::InvalidExtent { .. })
        ));
    }

    #[test]
    fn test_merge_workspace_is_deterministic() {
        let workspace = MemoryWorkspace::new();
        let a = tile("a.tif", (0.0, 2.0), (2, 2), 1.0, vec![1.0, 2.0, 3.0, 4.0]);
        let b = tile("b.tif", (2.0, 2.0), (2, 2), 1.0, vec![5.0, 6.0, 7.0, 8.0]);
        workspace.add("a.tif", &geotiff::encode_to_vec(&a).unwrap()).unwrap();
        workspace.add("b.tif", &geotiff::encode_to_vec(&b).unwrap()).unwrap();

        let temp_dir = TempDir::new().unwrap();
        let first_path = temp_dir.path().join("out").join("first.tif");
        let second_path = temp_dir.path().join("second.tif");

        let first = merge_workspace(&workspace, &MergeConfig::default(), &first_path).unwrap();
        let second = merge_workspace(&workspace, &MergeConfig::default(), &second_path).unwrap();

        assert_eq!(first.md5, second.md5);
        assert_eq!(
            std::fs::read(&first_path).unwrap(),
            std::fs::read(&second_path).unwrap()
        );
        assert_eq!(first.sources, vec!["a.tif", "b.tif"]);
        assert_eq!((first.width, first.height), (4, 2));

        let written = geotiff::decode("first.tif", &std::fs::read(&first_path).unwrap()).unwrap();
        assert_eq!(written.data, vec![1.0, 2.0, 5.0, 6.0, 3.0, 4.0, 7.0, 8.0]);
        assert_eq!(written.geokeys.short_value(3072), Some(3857));
    }

    #[test]
    fn test_merge_files_ignores_unlisted_entries() {
        let workspace = MemoryWorkspace::new();
        let a = tile("a.tif", (0.0, 1.0), (1, 1), 1.0, vec![3.0]);
        workspace.add("a.tif", &geotiff::encode_to_vec(&a).unwrap()).unwrap();
        workspace.add("a.xml", b"<metadata/>").unwrap();

        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("one.tif");
        let report = merge_files(
            &workspace,
            &["a.tif".to_string()],
            &MergeConfig::default(),
            &output,
        )
        .unwrap();
        assert_eq!(report.sources, vec!["a.tif"]);

        // The sidecar is not a raster, so merging everything fails
        assert!(merge_workspace(&workspace, &MergeConfig::default(), &output).is_err());
    }

    #[test]
    fn test_merge_empty_workspace() {
        let workspace = MemoryWorkspace::new();
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("never.tif");
        assert!(matches!(
            merge_workspace(&workspace, &MergeConfig::default(), &output),
            Err(MergeError::NoInput { .. })
        ));
        assert!(!output.exists());
    }
}
