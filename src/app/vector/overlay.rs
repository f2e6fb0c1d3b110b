//! Polygon overlay of the tile index against the area of interest

use geo::{Area, BooleanOps, BoundingRect, Intersects, MultiPolygon};
use tracing::debug;

use super::crs::Crs;
use super::layer::{Properties, VectorFeature, VectorLayer};
use crate::errors::{InputError, InputResult};

/// One tile index record clipped to one area-of-interest feature
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionRecord {
    /// Position of the source record in the tile index
    pub index_record: usize,
    /// Position of the source feature in the area of interest
    pub aoi_record: usize,
    /// Clipped footprint
    pub geometry: MultiPolygon<f64>,
    /// Index attributes plus area-of-interest attributes
    pub properties: Properties,
}

impl IntersectionRecord {
    /// Read a text attribute, accepting numbers as text
    pub fn text_field(&self, field: &str) -> Option<String> {
        match self.properties.get(field)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Result of overlaying the tile index with the area of interest
#[derive(Debug, Clone, PartialEq)]
pub struct Intersection {
    /// CRS shared by both inputs
    pub crs: Crs,
    /// Clipped records, ordered by index record then AOI feature
    pub records: Vec<IntersectionRecord>,
}

impl Intersection {
    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the overlay produced nothing
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Read a required text attribute from every record, in order
    ///
    /// # Errors
    ///
    /// Returns `InputError::MissingField` for the first record lacking the field.
    pub fn text_column(&self, field: &str) -> InputResult<Vec<String>> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                record
                    .text_field(field)
                    .ok_or_else(|| InputError::MissingField {
                        layer: "intersection".to_string(),
                        index,
                        field: field.to_string(),
                    })
            })
            .collect()
    }

    /// View the intersection as a vector layer, for writing
    pub fn to_layer(&self, name: &str) -> VectorLayer {
        VectorLayer {
            name: name.to_string(),
            crs: self.crs.clone(),
            features: self
                .records
                .iter()
                .map(|record| VectorFeature {
                    geometry: record.geometry.clone(),
                    properties: record.properties.clone(),
                })
                .collect(),
        }
    }
}

/// Overlay two layers, keeping the parts of the tile index inside the area of interest
///
/// Every (index, AOI) pair with a non-empty areal intersection yields one record.
/// Attributes are combined with index attributes taking their own names; an AOI
/// attribute whose name is already used is stored with a `_2` suffix. Pairs that
/// only touch along an edge or at a point produce no record.
///
/// # Errors
///
/// Returns `InputError::CrsMismatch` when the layers declare different CRSs.
pub fn overlay(index: &VectorLayer, aoi: &VectorLayer) -> InputResult<Intersection> {
    if !index.crs.is_compatible(&aoi.crs) {
        return Err(InputError::CrsMismatch {
            index_crs: index.crs.to_string(),
            aoi_crs: aoi.crs.to_string(),
        });
    }

    let aoi_bounds: Vec<_> = aoi
        .features
        .iter()
        .map(|feature| feature.geometry.bounding_rect())
        .collect();

    let mut records = Vec::new();
    for (index_record, tile) in index.features.iter().enumerate() {
        let Some(tile_bounds) = tile.geometry.bounding_rect() else {
            continue;
        };

        for (aoi_record, area) in aoi.features.iter().enumerate() {
            let overlaps_bounds = aoi_bounds[aoi_record]
                .map(|bounds| bounds.intersects(&tile_bounds))
                .unwrap_or(false);
            if !overlaps_bounds {
                continue;
            }

            let clipped = tile.geometry.intersection(&area.geometry);
            if clipped.0.is_empty() || clipped.unsigned_area() <= 0.0 {
                continue;
            }

            records.push(IntersectionRecord {
                index_record,
                aoi_record,
                geometry: clipped,
                properties: combine_properties(&tile.properties, &area.properties),
            });
        }
    }

    debug!(
        "Overlay of {} index records and {} AOI features produced {} records",
        index.len(),
        aoi.len(),
        records.len()
    );

    Ok(Intersection {
        crs: index.crs.clone(),
        records,
    })
}

fn combine_properties(index: &Properties, aoi: &Properties) -> Properties {
    let mut combined = index.clone();
    for (key, value) in aoi {
        if combined.contains_key(key) {
            combined.insert(format!("{}_2", key), value.clone());
        } else {
            combined.insert(key.clone(), value.clone());
        }
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};
    use serde_json::json;

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]])
    }

    fn feature(geometry: MultiPolygon<f64>, properties: serde_json::Value) -> VectorFeature {
        VectorFeature {
            geometry,
            properties: properties.as_object().cloned().unwrap_or_default(),
        }
    }

    fn index_layer() -> VectorLayer {
        VectorLayer {
            name: "index".into(),
            crs: Crs::Epsg(3857),
            features: vec![
                feature(square(0.0, 0.0, 10.0), json!({"demname": "t1234567", "name": "a"})),
                feature(square(10.0, 0.0, 10.0), json!({"demname": "t7654321"})),
                feature(square(100.0, 100.0, 10.0), json!({"demname": "t1111111"})),
            ],
        }
    }

    #[test]
    fn test_overlay_keeps_overlapping_tiles() {
        let aoi = VectorLayer {
            name: "aoi".into(),
            crs: Crs::Epsg(3857),
            features: vec![feature(square(5.0, 5.0, 10.0), json!({"name": "watershed"}))],
        };

        let result = overlay(&index_layer(), &aoi).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.records[0].index_record, 0);
        assert_eq!(result.records[1].index_record, 1);

        // Clipped to the 5x5 quadrant of each tile
        assert!((result.records[0].geometry.unsigned_area() - 25.0).abs() < 1e-9);
        assert_eq!(result.records[0].properties["name"], json!("a"));
        assert_eq!(result.records[0].properties["name_2"], json!("watershed"));
        assert_eq!(result.records[1].properties["name"], json!("watershed"));
    }

    #[test]
    fn test_edge_contact_is_not_an_intersection() {
        let aoi = VectorLayer {
            name: "aoi".into(),
            crs: Crs::Epsg(3857),
            features: vec![feature(square(20.0, 0.0, 5.0), json!({}))],
        };
        let result = overlay(&index_layer(), &aoi).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_crs_mismatch_is_rejected() {
        let aoi = VectorLayer {
            name: "aoi".into(),
            crs: Crs::Epsg(4326),
            features: vec![feature(square(5.0, 5.0, 10.0), json!({}))],
        };
        let err = overlay(&index_layer(), &aoi).unwrap_err();
        match err {
            InputError::CrsMismatch { index_crs, aoi_crs } => {
                assert_eq!(index_crs, "EPSG:3857");
                assert_eq!(aoi_crs, "EPSG:4326");
            }
            other => panic!("Expected CrsMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_text_column_requires_field() {
        let aoi = VectorLayer {
            name: "aoi".into(),
            crs: Crs::Epsg(3857),
            features: vec![feature(square(0.0, 0.0, 20.0), json!({}))],
        };
        let result = overlay(&index_layer(), &aoi).unwrap();
        assert_eq!(
            result.text_column("demname").unwrap(),
            vec!["t1234567".to_string(), "t7654321".to_string()]
        );
        assert!(matches!(
            result.text_column("dirname"),
            Err(InputError::MissingField { index: 0, .. })
        ));
    }
}
