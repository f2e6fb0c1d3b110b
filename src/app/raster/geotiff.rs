//! GeoTIFF decoding and encoding
//!
//! Reading understands both ways of georeferencing a GeoTIFF (tiepoint plus pixel
//! scale, or a full model transformation matrix) and the GDAL nodata tag.
//! Writing produces a single-band, uncompressed float32 GeoTIFF. The output
//! contains no timestamps, so identical input gives byte-identical files.

use std::io::{Cursor, Read, Seek, Write};

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tracing::debug;

use super::{GeoKeys, GeoTransform, RasterTile, SampleType};
use crate::errors::{MergeError, MergeResult};

// GeoTIFF tag ids (looked up via `Tag::from_u16_exhaustive` so they match
// the named variants tiff 0.9 decodes them into)
const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GEO_DOUBLE_PARAMS: u16 = 34736;
const GEO_ASCII_PARAMS: u16 = 34737;
const GDAL_NODATA: u16 = 42113;

const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const RASTER_PIXEL_IS_AREA: u16 = 1;

fn decoder_limits() -> Limits {
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024;
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;
    limits.ifd_value_size = 64 * 1024 * 1024;
    limits
}

/// Decode a GeoTIFF held in memory
///
/// # Errors
///
/// Returns `MergeError` if the file is not a readable TIFF, has more than one
/// band, or carries no georeferencing.
pub fn decode(name: &str, bytes: &[u8]) -> MergeResult<RasterTile> {
    let decode_err = |source| MergeError::Decode {
        name: name.to_string(),
        source,
    };

    let mut decoder = Decoder::new(Cursor::new(bytes))
        .map_err(decode_err)?
        .with_limits(decoder_limits());

    let (width, height) = decoder.dimensions().map_err(decode_err)?;
    let bands = decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1);
    if bands != 1 {
        return Err(MergeError::BandCount {
            name: name.to_string(),
            found: bands as usize,
        });
    }

    let geokeys = read_geokeys(&mut decoder);
    let transform = read_transform(&mut decoder, name, &geokeys)?;
    let nodata = read_nodata(&mut decoder);
    let (sample_type, data) = decode_samples(decoder.read_image().map_err(decode_err)?);

    debug!(
        "Decoded {}: {}x{} {} (nodata {:?})",
        name, width, height, sample_type, nodata
    );

    Ok(RasterTile {
        name: name.to_string(),
        width,
        height,
        transform,
        nodata,
        sample_type,
        data,
        geokeys,
    })
}

fn read_geokeys<R: Read + Seek>(decoder: &mut Decoder<R>) -> GeoKeys {
    GeoKeys {
        directory: decoder
            .get_tag_u16_vec(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY))
            .unwrap_or_default(),
        double_params: decoder
            .get_tag_f64_vec(Tag::from_u16_exhaustive(GEO_DOUBLE_PARAMS))
            .unwrap_or_default(),
        ascii_params: decoder
            .get_tag_ascii_string(Tag::from_u16_exhaustive(GEO_ASCII_PARAMS))
            .ok()
            .map(|s| s.trim_end_matches('\0').to_string()),
    }
}

fn read_transform<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    name: &str,
    geokeys: &GeoKeys,
) -> MergeResult<GeoTransform> {
    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT));
    let pixel_scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE));

    let mut transform = match (tiepoint, pixel_scale) {
        (Ok(tiepoint), Ok(scale)) if tiepoint.len() >= 6 && scale.len() >= 2 => {
            // Tiepoint: [i, j, k, x, y, z] ties raster (i, j) to world (x, y)
            GeoTransform {
                origin_x: tiepoint[3] - tiepoint[0] * scale[0],
                pixel_width: scale[0],
                row_rotation: 0.0,
                origin_y: tiepoint[4] + tiepoint[1] * scale[1],
                col_rotation: 0.0,
                pixel_height: -scale[1],
            }
        }
        _ => {
            let matrix = decoder
                .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TRANSFORMATION))
                .ok()
                .filter(|m| m.len() >= 8)
                .ok_or_else(|| MergeError::MissingGeoreference {
                    name: name.to_string(),
                })?;
            GeoTransform {
                origin_x: matrix[3],
                pixel_width: matrix[0],
                row_rotation: matrix[1],
                origin_y: matrix[7],
                col_rotation: matrix[4],
                pixel_height: matrix[5],
            }
        }
    };

    // PixelIsPoint rasters tie pixel centres; shift to the corner convention
    if geokeys.is_pixel_is_point() {
        transform.origin_x -= 0.5 * transform.pixel_width;
        transform.origin_y -= 0.5 * transform.pixel_height;
    }
    Ok(transform)
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_end_matches('\0').trim().parse().ok())
}

fn decode_samples(result: DecodingResult) -> (SampleType, Vec<f32>) {
    match result {
        DecodingResult::F32(data) => (SampleType::F32, data),
        DecodingResult::F64(data) => (SampleType::F64, data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I16(data) => (SampleType::I16, data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I32(data) => (SampleType::I32, data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U16(data) => (SampleType::U16, data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U32(data) => (SampleType::U32, data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U8(data) => (SampleType::U8, data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I8(data) => (SampleType::I8, data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U64(data) => (SampleType::U64, data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I64(data) => (SampleType::I64, data.into_iter().map(|v| v as f32).collect()),
    }
}

/// Encode a raster as a single-band float32 GeoTIFF
///
/// The raster must be north-up. Its transform is written as a tiepoint plus
/// pixel scale; geokeys are copied with the raster type forced to PixelIsArea.
pub fn encode<W: Write + Seek>(raster: &RasterTile, writer: W) -> MergeResult<()> {
    if raster.transform.is_rotated() {
        return Err(MergeError::RotatedTransform {
            name: raster.name.clone(),
        });
    }

    let mut encoder = TiffEncoder::new(writer).map_err(MergeError::Encode)?;
    let mut image = encoder
        .new_image::<Gray32Float>(raster.width, raster.height)
        .map_err(MergeError::Encode)?;

    {
        let dir = image.encoder();
        let gt = &raster.transform;

        let pixel_scale = [gt.pixel_width, -gt.pixel_height, 0.0];
        dir.write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), pixel_scale.as_slice())
            .map_err(MergeError::Encode)?;

        let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
        dir.write_tag(Tag::Unknown(MODEL_TIEPOINT), tiepoint.as_slice())
            .map_err(MergeError::Encode)?;

        let geokeys = pixel_is_area(&raster.geokeys);
        if !geokeys.directory.is_empty() {
            dir.write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), geokeys.directory.as_slice())
                .map_err(MergeError::Encode)?;
        }
        if !geokeys.double_params.is_empty() {
            dir.write_tag(
                Tag::Unknown(GEO_DOUBLE_PARAMS),
                geokeys.double_params.as_slice(),
            )
            .map_err(MergeError::Encode)?;
        }
        if let Some(ascii) = geokeys.ascii_params.as_deref().filter(|s| !s.is_empty()) {
            dir.write_tag(Tag::Unknown(GEO_ASCII_PARAMS), ascii)
                .map_err(MergeError::Encode)?;
        }
        if let Some(nodata) = raster.nodata {
            dir.write_tag(Tag::Unknown(GDAL_NODATA), nodata.to_string().as_str())
                .map_err(MergeError::Encode)?;
        }
    }

    image.write_data(&raster.data).map_err(MergeError::Encode)?;
    Ok(())
}

/// Encode a raster into an in-memory GeoTIFF
pub fn encode_to_vec(raster: &RasterTile) -> MergeResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    encode(raster, &mut cursor)?;
    Ok(cursor.into_inner())
}

fn pixel_is_area(geokeys: &GeoKeys) -> GeoKeys {
    let mut keys = geokeys.clone();
    if keys.directory.len() >= 4 {
        let count = keys.directory[3] as usize;
        for entry in keys.directory[4..].chunks_exact_mut(4).take(count) {
            if entry[0] == GT_RASTER_TYPE_GEO_KEY && entry[1] == 0 {
                entry[3] = RASTER_PIXEL_IS_AREA;
            }
        }
    }
    keys
}
