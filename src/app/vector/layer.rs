//! Vector layer loading
//!
//! Both the tile index and the area of interest are polygon layers. They are read
//! from ESRI shapefiles (CRS from the `.prj` sidecar) or GeoJSON files into the
//! same in-memory representation: a list of multipolygon features with JSON
//! attribute maps.

use std::path::{Path, PathBuf};

use geo::MultiPolygon;
use geojson::{FeatureCollection, GeoJson};
use serde_json::{Map, Number, Value};
use shapefile::dbase::FieldValue;
use tracing::{debug, info};

use super::crs::Crs;
use crate::constants::vector;
use crate::errors::{InputError, InputResult};

/// Attribute map of a feature
pub type Properties = Map<String, Value>;

/// One polygon feature and its attributes
#[derive(Debug, Clone, PartialEq)]
pub struct VectorFeature {
    /// Feature footprint
    pub geometry: MultiPolygon<f64>,
    /// Feature attributes
    pub properties: Properties,
}

impl VectorFeature {
    /// Read a text attribute, accepting numbers as text
    pub fn text_field(&self, field: &str) -> Option<String> {
        text_value(self.properties.get(field)?)
    }
}

/// A loaded polygon layer
#[derive(Debug, Clone, PartialEq)]
pub struct VectorLayer {
    /// Display name (usually the file name)
    pub name: String,
    /// Declared coordinate reference system
    pub crs: Crs,
    /// Features in file order
    pub features: Vec<VectorFeature>,
}

/// Supported on-disk vector formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorFormat {
    /// ESRI shapefile (`.shp` + `.dbf` + optional `.prj`)
    Shapefile,
    /// GeoJSON FeatureCollection, Feature or Geometry
    GeoJson,
}

impl VectorFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "shp" => Some(VectorFormat::Shapefile),
            "geojson" | "json" => Some(VectorFormat::GeoJson),
            _ => None,
        }
    }
}

impl VectorLayer {
    /// Open a vector layer, dispatching on the file extension
    ///
    /// # Errors
    ///
    /// Returns `InputError` if the file is missing, has an unsupported extension,
    /// cannot be parsed, or contains non-polygon features.
    pub fn open(path: &Path) -> InputResult<Self> {
        if !path.exists() {
            return Err(InputError::LayerNotFound {
                path: path.to_path_buf(),
            });
        }

        let layer = match VectorFormat::from_path(path) {
            Some(VectorFormat::Shapefile) => Self::read_shapefile(path)?,
            Some(VectorFormat::GeoJson) => {
                let content = std::fs::read_to_string(path).map_err(|source| InputError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_geojson_str(&layer_name(path), &content).map_err(|e| match e {
                    InputError::GeoJson { source, .. } => InputError::GeoJson {
                        path: path.to_path_buf(),
                        source,
                    },
                    other => other,
                })?
            }
            None => {
                return Err(InputError::UnsupportedFormat {
                    path: path.to_path_buf(),
                })
            }
        };

        info!(
            "Loaded {} features from {} (CRS {})",
            layer.features.len(),
            path.display(),
            layer.crs
        );
        Ok(layer)
    }

    /// Parse a GeoJSON document into a layer
    ///
    /// A document without a legacy `crs` member is EPSG:4326, as RFC 7946 requires.
    pub fn from_geojson_str(name: &str, content: &str) -> InputResult<Self> {
        let geojson: GeoJson = content.parse().map_err(|source| InputError::GeoJson {
            path: PathBuf::from(name),
            source,
        })?;

        let (crs_member, raw_features) = match geojson {
            GeoJson::FeatureCollection(collection) => {
                let crs_member = collection
                    .foreign_members
                    .as_ref()
                    .and_then(|members| members.get("crs"))
                    .cloned();
                (crs_member, collection.features)
            }
            GeoJson::Feature(feature) => {
                let crs_member = feature
                    .foreign_members
                    .as_ref()
                    .and_then(|members| members.get("crs"))
                    .cloned();
                (crs_member, vec![feature])
            }
            GeoJson::Geometry(geometry) => (
                None,
                vec![geojson::Feature {
                    bbox: None,
                    geometry: Some(geometry),
                    id: None,
                    properties: None,
                    foreign_members: None,
                }],
            ),
        };

        let crs = crs_member
            .as_ref()
            .map(Crs::from_geojson_member)
            .unwrap_or(Crs::Epsg(vector::GEOJSON_DEFAULT_EPSG));

        let mut features = Vec::with_capacity(raw_features.len());
        for (index, feature) in raw_features.into_iter().enumerate() {
            let geometry = feature.geometry.ok_or_else(|| InputError::InvalidGeometry {
                layer: name.to_string(),
                index,
                reason: "feature has no geometry".to_string(),
            })?;
            let geometry = geo::Geometry::<f64>::try_from(geometry).map_err(|e| {
                InputError::InvalidGeometry {
                    layer: name.to_string(),
                    index,
                    reason: e.to_string(),
                }
            })?;
            features.push(VectorFeature {
                geometry: to_multi_polygon(geometry).ok_or_else(|| InputError::InvalidGeometry {
                    layer: name.to_string(),
                    index,
                    reason: "geometry is not a polygon or multipolygon".to_string(),
                })?,
                properties: feature.properties.unwrap_or_default(),
            });
        }

        debug!("Parsed {} GeoJSON features from {}", features.len(), name);
        Ok(Self {
            name: name.to_string(),
            crs,
            features,
        })
    }

    /// Read a polygon shapefile and its attribute table
    fn read_shapefile(path: &Path) -> InputResult<Self> {
        let shapes = shapefile::read_as::<_, shapefile::Polygon, shapefile::dbase::Record>(path)
            .map_err(|source| InputError::Shapefile {
                path: path.to_path_buf(),
                source,
            })?;

        let prj_path = path.with_extension("prj");
        let crs = if prj_path.exists() {
            let wkt = std::fs::read_to_string(&prj_path).map_err(|source| InputError::Io {
                path: prj_path.clone(),
                source,
            })?;
            Crs::from_wkt(&wkt)
        } else {
            debug!("No .prj sidecar next to {}", path.display());
            Crs::Unspecified
        };

        let features = shapes
            .into_iter()
            .map(|(polygon, record)| VectorFeature {
                geometry: MultiPolygon::<f64>::from(polygon),
                properties: record
                    .into_iter()
                    .map(|(name, value)| (name, field_value_to_json(value)))
                    .collect(),
            })
            .collect();

        Ok(Self {
            name: layer_name(path),
            crs,
            features,
        })
    }

    /// Number of features
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the layer has no features
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Convert to a GeoJSON FeatureCollection, with a legacy `crs` member when known
    pub fn to_feature_collection(&self) -> FeatureCollection {
        let features = self
            .features
            .iter()
            .map(|feature| geojson::Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(
                    &feature.geometry,
                ))),
                id: None,
                properties: Some(feature.properties.clone()),
                foreign_members: None,
            })
            .collect();

        let foreign_members = self.crs.to_geojson_member().map(|member| {
            let mut members = Map::new();
            members.insert("crs".to_string(), member);
            members
        });

        FeatureCollection {
            bbox: None,
            features,
            foreign_members,
        }
    }

    /// Write the layer as a GeoJSON FeatureCollection
    pub fn write_geojson(&self, path: &Path) -> InputResult<()> {
        let content = serde_json::to_string_pretty(&self.to_feature_collection())?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| InputError::WriteFailed {
                path: path.to_path_buf(),
                source,
            })?;
        }

        // Readers never see a half-written layer
        let temp_path = path.with_extension("geojson.part");
        std::fs::write(&temp_path, content).map_err(|source| InputError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })?;
        if let Err(source) = std::fs::rename(&temp_path, path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(InputError::WriteFailed {
                path: path.to_path_buf(),
                source,
            });
        }
        info!("Wrote {} features to {}", self.features.len(), path.display());
        Ok(())
    }
}

fn layer_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Keep only the areal parts of a geometry
fn to_multi_polygon(geometry: geo::Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        geo::Geometry::Polygon(polygon) => Some(MultiPolygon(vec![polygon])),
        geo::Geometry::MultiPolygon(multi) => Some(multi),
        geo::Geometry::Rect(rect) => Some(MultiPolygon(vec![rect.to_polygon()])),
        geo::Geometry::GeometryCollection(collection) => {
            let polygons: Vec<_> = collection
                .0
                .into_iter()
                .filter_map(to_multi_polygon)
                .flat_map(|multi| multi.0)
                .collect();
            (!polygons.is_empty()).then(|| MultiPolygon(polygons))
        }
        _ => None,
    }
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// dBase stores every numeric field as a float; whole values become JSON integers
/// so a numeric tile name reads back as `1234567`, not `1234567.0`
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < MAX_EXACT_INTEGER {
        Value::Number((n as i64).into())
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Largest magnitude below which every whole f64 is an exact integer (2^53)
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

fn field_value_to_json(value: FieldValue) -> Value {
    match value {
        FieldValue::Character(Some(s)) => Value::String(s.trim_end().to_string()),
        FieldValue::Memo(s) => Value::String(s),
        FieldValue::Numeric(Some(n)) | FieldValue::Double(n) | FieldValue::Currency(n) => {
            number_value(n)
        }
        FieldValue::Float(Some(n)) => number_value(f64::from(n)),
        FieldValue::Integer(n) => Value::Number(n.into()),
        FieldValue::Logical(Some(b)) => Value::Bool(b),
        FieldValue::Character(None)
        | FieldValue::Numeric(None)
        | FieldValue::Float(None)
        | FieldValue::Logical(None)
        | FieldValue::Date(None) => Value::Null,
        other => Value::String(format!("{:?}", other)),
    }
}
