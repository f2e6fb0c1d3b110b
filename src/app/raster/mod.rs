//! Raster model, format detection and source loading
//!
//! Staged tiles are loaded into [`RasterTile`]s: a single band of `f32` samples
//! with a north-up affine transform. GeoTIFF is read natively; other formats
//! (ERDAS Imagine `.img` in particular) need the `gdal` feature.
//!
//! # Module Organization
//!
//! - [`geotiff`] - GeoTIFF decoding and deterministic encoding
//! - [`merge`] - Mosaicking of staged tiles
//! - `gdal` - GDAL-backed reader (feature `gdal`)

#[cfg(feature = "gdal")]
pub mod gdal;
pub mod geotiff;
pub mod merge;

use std::fmt;

use crate::app::workspace::Workspace;
use crate::constants::raster::{HFA_MAGIC, ROTATION_EPSILON};
use crate::errors::{MergeError, MergeResult};

pub use merge::{merge_files, merge_tiles, merge_workspace, MergeConfig, MergeReport, Mosaic};

/// Affine pixel-to-world transform, in GDAL coefficient order
///
/// `x = origin_x + col * pixel_width + row * row_rotation`
/// `y = origin_y + col * col_rotation + row * pixel_height`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with the given upper-left corner and pixel size
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height: -pixel_height.abs(),
        }
    }

    /// Build from GDAL's six coefficients
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            origin_x: gt[0],
            pixel_width: gt[1],
            row_rotation: gt[2],
            origin_y: gt[3],
            col_rotation: gt[4],
            pixel_height: gt[5],
        }
    }

    /// GDAL's six coefficients
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Whether the transform has rotation or shear terms
    pub fn is_rotated(&self) -> bool {
        self.row_rotation.abs() > ROTATION_EPSILON || self.col_rotation.abs() > ROTATION_EPSILON
    }

    /// World bounds of a `width` x `height` raster as (min x, min y, max x, max y)
    pub fn bounds(&self, width: u32, height: u32) -> (f64, f64, f64, f64) {
        let x0 = self.origin_x;
        let x1 = self.origin_x + width as f64 * self.pixel_width;
        let y0 = self.origin_y;
        let y1 = self.origin_y + height as f64 * self.pixel_height;
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    /// Fractional pixel (col, row) containing a world coordinate
    ///
    /// Only valid for transforms without rotation.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }
}

/// Sample type a raster was stored with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleType::U8 => "uint8",
            SampleType::I8 => "int8",
            SampleType::U16 => "uint16",
            SampleType::I16 => "int16",
            SampleType::U32 => "uint32",
            SampleType::I32 => "int32",
            SampleType::U64 => "uint64",
            SampleType::I64 => "int64",
            SampleType::F32 => "float32",
            SampleType::F64 => "float64",
        };
        f.write_str(name)
    }
}

/// GeoTIFF georeferencing keys, carried from a source to the output untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoKeys {
    /// GeoKeyDirectory (tag 34735)
    pub directory: Vec<u16>,
    /// GeoDoubleParams (tag 34736)
    pub double_params: Vec<f64>,
    /// GeoAsciiParams (tag 34737)
    pub ascii_params: Option<String>,
}

/// GeoKey ids used when building a directory from scratch
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;

impl GeoKeys {
    /// Minimal key directory for an EPSG code
    pub fn from_epsg(code: u16, geographic: bool) -> Self {
        let (model_type, crs_key) = if geographic {
            (2, GEOGRAPHIC_TYPE_GEO_KEY)
        } else {
            (1, PROJECTED_CS_TYPE_GEO_KEY)
        };
        Self {
            directory: vec![
                1, 1, 0, 3,
                GT_MODEL_TYPE_GEO_KEY, 0, 1, model_type,
                GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA,
                crs_key, 0, 1, code,
            ],
            double_params: Vec::new(),
            ascii_params: None,
        }
    }

    /// Whether there is anything to write
    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }

    /// Value of a short, inline key
    pub fn short_value(&self, key_id: u16) -> Option<u16> {
        if self.directory.len() < 4 {
            return None;
        }
        let count = self.directory[3] as usize;
        self.directory[4..]
            .chunks_exact(4)
            .take(count)
            .find(|entry| entry[0] == key_id && entry[1] == 0)
            .map(|entry| entry[3])
    }

    /// Whether pixel values describe points rather than areas
    pub fn is_pixel_is_point(&self) -> bool {
        self.short_value(GT_RASTER_TYPE_GEO_KEY) == Some(RASTER_PIXEL_IS_POINT)
    }
}

/// A single-band raster loaded into memory
#[derive(Debug, Clone, PartialEq)]
pub struct RasterTile {
    /// Workspace entry the raster came from
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub transform: GeoTransform,
    /// Samples equal to this value are missing
    pub nodata: Option<f64>,
    /// Sample type on disk
    pub sample_type: SampleType,
    /// Samples in row-major order, north row first
    pub data: Vec<f32>,
    /// Georeferencing keys
    pub geokeys: GeoKeys,
}

impl RasterTile {
    /// Check the buffer size and transform
    pub fn validate(&self) -> MergeResult<()> {
        let expected = self.width as usize * self.height as usize;
        if self.data.len() != expected {
            return Err(MergeError::SizeMismatch {
                name: self.name.clone(),
                expected,
                found: self.data.len(),
            });
        }
        if self.transform.is_rotated() {
            return Err(MergeError::RotatedTransform {
                name: self.name.clone(),
            });
        }
        if self.transform.pixel_width == 0.0 || self.transform.pixel_height == 0.0 {
            return Err(MergeError::MissingGeoreference {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    /// World bounds as (min x, min y, max x, max y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.width, self.height)
    }

    /// Whether a sample holds data
    pub fn is_valid(&self, value: f32) -> bool {
        !value.is_nan() && self.nodata.map_or(true, |nodata| value != nodata as f32)
    }

    /// Sample at a pixel
    pub fn sample(&self, col: u32, row: u32) -> f32 {
        self.data[row as usize * self.width as usize + col as usize]
    }
}

/// Raster file formats recognised by content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    /// Classic or BigTIFF
    GeoTiff,
    /// ERDAS Imagine
    Hfa,
    /// Anything else
    Unknown,
}

impl RasterFormat {
    /// Identify a format from the leading bytes of a file
    pub fn sniff(bytes: &[u8]) -> Self {
        match bytes.get(..4) {
            Some(b"II*\0") | Some(b"MM\0*") | Some(b"II+\0") | Some(b"MM\0+") => {
                RasterFormat::GeoTiff
            }
            _ if bytes.starts_with(HFA_MAGIC) => RasterFormat::Hfa,
            _ => RasterFormat::Unknown,
        }
    }

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            RasterFormat::GeoTiff => "GeoTIFF",
            RasterFormat::Hfa => "ERDAS Imagine (HFA)",
            RasterFormat::Unknown => "an unrecognised format",
        }
    }
}

/// Load a staged raster
///
/// # Errors
///
/// `MergeError::UnsupportedFormat` when the content is not readable in this
/// build, or a decode error for corrupt files.
pub fn open_staged(workspace: &dyn Workspace, name: &str) -> MergeResult<RasterTile> {
    let bytes = workspace.read(name)?;
    let tile = match RasterFormat::sniff(&bytes) {
        RasterFormat::GeoTiff => geotiff::decode(name, &bytes)?,
        other => open_with_gdal(workspace, name, other)?,
    };
    tile.validate()?;
    Ok(tile)
}

#[cfg(feature = "gdal")]
fn open_with_gdal(
    workspace: &dyn Workspace,
    name: &str,
    format: RasterFormat,
) -> MergeResult<RasterTile> {
    match workspace.local_path(name) {
        Some(path) => gdal::open(name, &path),
        None => Err(MergeError::UnsupportedFormat {
            name: name.to_string(),
            format: format!("{} without an on-disk path", format.name()),
        }),
    }
}

#[cfg(not(feature = "gdal"))]
fn open_with_gdal(
    _workspace: &dyn Workspace,
    name: &str,
    format: RasterFormat,
) -> MergeResult<RasterTile> {
    Err(MergeError::UnsupportedFormat {
        name: name.to_string(),
        format: format!("{} (rebuild with the `gdal` feature)", format.name()),
    })
}
