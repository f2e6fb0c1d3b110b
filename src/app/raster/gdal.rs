//! GDAL-backed reader for formats the native decoder does not handle

use std::path::Path;

use gdal::raster::{Buffer, GdalDataType};
use gdal::Dataset;
use tracing::debug;

use super::{GeoKeys, GeoTransform, RasterTile, SampleType};
use crate::app::vector::Crs;
use crate::errors::{MergeError, MergeResult};

/// Open band 1 of a raster on disk
pub fn open(name: &str, path: &Path) -> MergeResult<RasterTile> {
    let gdal_err = |source| MergeError::Gdal {
        name: name.to_string(),
        source,
    };

    let dataset = Dataset::open(path).map_err(gdal_err)?;
    if dataset.raster_count() != 1 {
        return Err(MergeError::BandCount {
            name: name.to_string(),
            found: dataset.raster_count() as usize,
        });
    }

    let transform = dataset
        .geo_transform()
        .map(GeoTransform::from_gdal)
        .map_err(|_| MergeError::MissingGeoreference {
            name: name.to_string(),
        })?;
    let (width, height) = dataset.raster_size();

    let band = dataset.rasterband(1).map_err(gdal_err)?;
    let sample_type = match band.band_type() {
        GdalDataType::UInt8 => SampleType::U8,
        GdalDataType::UInt16 => SampleType::U16,
        GdalDataType::Int16 => SampleType::I16,
        GdalDataType::UInt32 => SampleType::U32,
        GdalDataType::Int32 => SampleType::I32,
        GdalDataType::Float32 => SampleType::F32,
        _ => SampleType::F64,
    };
    let nodata = band.no_data_value();
    let buffer: Buffer<f32> = band
        .read_as((0, 0), (width, height), (width, height), None)
        .map_err(gdal_err)?;

    let geokeys = geokeys(name, &dataset)?;

    debug!("Opened {} via GDAL as {}x{} {}", name, width, height, sample_type);

    Ok(RasterTile {
        name: name.to_string(),
        width: width as u32,
        height: height as u32,
        transform,
        nodata,
        sample_type,
        data: buffer.data().to_vec(),
        geokeys,
    })
}

/// GeoKeys for the dataset's coordinate system
///
/// A dataset without a spatial reference gets no keys. One with a spatial
/// reference must resolve to an EPSG code, either from its authority, from
/// GDAL's identification, or from a known WKT name; otherwise the tile is
/// rejected rather than merged without a CRS.
fn geokeys(name: &str, dataset: &Dataset) -> MergeResult<GeoKeys> {
    let Ok(mut srs) = dataset.spatial_ref() else {
        debug!("{} declares no spatial reference", name);
        return Ok(GeoKeys::default());
    };

    let epsg_authority = |srs: &gdal::spatial_ref::SpatialRef| {
        srs.auth_name()
            .ok()
            .filter(|authority| authority.eq_ignore_ascii_case("EPSG"))
            .and_then(|_| srs.auth_code().ok())
    };

    let mut code = epsg_authority(&srs);
    if code.is_none() && srs.auto_identify_epsg().is_ok() {
        code = epsg_authority(&srs);
    }

    let wkt = srs.to_wkt().unwrap_or_default();
    let from_wkt = Crs::from_wkt(&wkt);
    let code = code.or_else(|| match from_wkt {
        Crs::Epsg(code) => i32::try_from(code).ok(),
        _ => None,
    });

    match code.and_then(|code| u16::try_from(code).ok()) {
        Some(code) => Ok(GeoKeys::from_epsg(code, srs.is_geographic())),
        None => Err(MergeError::UnknownCrs {
            name: name.to_string(),
            crs: from_wkt.to_string(),
        }),
    }
}
