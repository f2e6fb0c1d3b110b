//! Tile identifier resolution
//!
//! Each intersection record names its tile in a free-form text attribute (for
//! TNRIS, `demname`), with the numeric tile identifier embedded somewhere in it.
//! This module pulls the identifier out, pairs it with the record's dataset
//! name, and derives the file names the staging directory is expected to hold.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::app::vector::Intersection;
use crate::constants::vector::TILE_ID_DIGITS;
use crate::errors::{ResolveError, ResolveResult, Result};

/// Fixed-length numeric tile identifier, such as `3097344`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TileId(String);

impl TileId {
    /// Accept a string made of exactly the expected number of ASCII digits
    pub fn parse(value: &str) -> Option<Self> {
        (value.len() == TILE_ID_DIGITS && value.bytes().all(|b| b.is_ascii_digit()))
            .then(|| TileId(value.to_string()))
    }

    /// Identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl TryFrom<String> for TileId {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        TileId::parse(&value).ok_or_else(|| format!("'{}' is not a {}-digit tile id", value, TILE_ID_DIGITS))
    }
}

impl From<TileId> for String {
    fn from(id: TileId) -> Self {
        id.0
    }
}

fn digit_run_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+").expect("digit run regex should be valid"))
}

/// Extract the tile identifier from a tile name
///
/// The identifier is the one maximal run of digits whose length is exactly
/// [`TILE_ID_DIGITS`]. Shorter or longer runs (dataset years, resolutions) are
/// ignored.
///
/// # Errors
///
/// `ResolveError::NoTileId` if no such run exists, `ResolveError::AmbiguousTileId`
/// if more than one does.
pub fn extract_tile_id(record: usize, tile_name: &str) -> ResolveResult<TileId> {
    let mut matches: Vec<&str> = digit_run_regex()
        .find_iter(tile_name)
        .map(|m| m.as_str())
        .filter(|run| run.len() == TILE_ID_DIGITS)
        .collect();

    match matches.len() {
        0 => Err(ResolveError::NoTileId {
            record,
            value: tile_name.to_string(),
        }),
        1 => Ok(TileId(matches.remove(0).to_string())),
        _ => Err(ResolveError::AmbiguousTileId {
            record,
            value: tile_name.to_string(),
            matches: matches.into_iter().map(str::to_string).collect(),
        }),
    }
}

/// A tile to download, keyed by identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRequest {
    /// Tile identifier
    pub tile_id: TileId,
    /// Dataset directory name the tile belongs to
    pub dataset: String,
}

/// Unique tiles required by an intersection, plus the staged file names they imply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileSet {
    tiles: BTreeMap<TileId, String>,
    expected_files: BTreeSet<String>,
}

impl TileSet {
    /// Build the tile set from the dataset and tile-name attributes of an intersection
    ///
    /// # Errors
    ///
    /// Returns an input error if a record lacks either attribute, or a resolution
    /// error if a tile name does not contain exactly one identifier.
    pub fn from_intersection(
        intersection: &Intersection,
        dataset_field: &str,
        tile_name_field: &str,
        extension: &str,
    ) -> Result<Self> {
        let datasets = intersection.text_column(dataset_field)?;
        let tile_names = intersection.text_column(tile_name_field)?;
        Ok(Self::from_columns(&datasets, &tile_names, extension)?)
    }

    /// Build the tile set from parallel dataset and tile-name columns
    ///
    /// Later records win when two records share a tile identifier.
    pub fn from_columns(
        datasets: &[String],
        tile_names: &[String],
        extension: &str,
    ) -> ResolveResult<Self> {
        let mut tiles = BTreeMap::new();
        let mut expected_files = BTreeSet::new();

        for (record, (dataset, tile_name)) in datasets.iter().zip(tile_names).enumerate() {
            let tile_id = extract_tile_id(record, tile_name)?;
            if let Some(previous) = tiles.insert(tile_id.clone(), dataset.clone()) {
                if &previous != dataset {
                    warn!(
                        "Tile {} appears in datasets '{}' and '{}'; keeping '{}'",
                        tile_id, previous, dataset, dataset
                    );
                }
            }
            expected_files.insert(format!("{}{}", tile_name, extension));
        }

        debug!(
            "Resolved {} unique tiles from {} records",
            tiles.len(),
            tile_names.len()
        );
        Ok(Self {
            tiles,
            expected_files,
        })
    }

    /// Number of unique tiles
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Whether there are no tiles
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Dataset name for a tile
    pub fn dataset_of(&self, tile_id: &TileId) -> Option<&str> {
        self.tiles.get(tile_id).map(String::as_str)
    }

    /// Tiles in identifier order
    pub fn requests(&self) -> impl Iterator<Item = TileRequest> + '_ {
        self.tiles.iter().map(|(tile_id, dataset)| TileRequest {
            tile_id: tile_id.clone(),
            dataset: dataset.clone(),
        })
    }

    /// Tile identifiers in order
    pub fn tile_ids(&self) -> impl Iterator<Item = &TileId> {
        self.tiles.keys()
    }

    /// Distinct dataset names
    pub fn datasets(&self) -> BTreeSet<&str> {
        self.tiles.values().map(String::as_str).collect()
    }

    /// File names the staging directory should hold after pruning
    pub fn expected_files(&self) -> &BTreeSet<String> {
        &self.expected_files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extract_tile_id() {
        assert_eq!(extract_tile_id(0, "abc1234567dem").unwrap().as_str(), "1234567");
        assert_eq!(
            extract_tile_id(0, "stratmap17-50cm-central-texas_3097344_dem")
                .unwrap()
                .as_str(),
            "3097344"
        );
    }

    #[test]
    fn test_missing_tile_id_is_an_error() {
        assert_eq!(
            extract_tile_id(3, "no-digits-here"),
            Err(ResolveError::NoTileId {
                record: 3,
                value: "no-digits-here".into()
            })
        );
        // An eight-digit run is not a tile id
        assert!(matches!(
            extract_tile_id(0, "tile_12345678"),
            Err(ResolveError::NoTileId { .. })
        ));
    }

    #[test]
    fn test_multiple_tile_ids_are_ambiguous() {
        match extract_tile_id(1, "1234567_7654321") {
            Err(ResolveError::AmbiguousTileId { record, matches, .. }) => {
                assert_eq!(record, 1);
                assert_eq!(matches, strings(&["1234567", "7654321"]));
            }
            other => panic!("Expected AmbiguousTileId, got {:?}", other),
        }
    }

    #[test]
    fn test_tile_set_contains_exactly_distinct_ids() {
        let datasets = strings(&["ds-a", "ds-a", "ds-b"]);
        let names = strings(&["abc1234567dem", "xyz7654321dem", "other1234567"]);

        let set = TileSet::from_columns(&datasets, &names, ".img").unwrap();
        let ids: Vec<_> = set.tile_ids().map(TileId::as_str).collect();
        assert_eq!(ids, vec!["1234567", "7654321"]);

        // Last write wins for the duplicated identifier
        assert_eq!(set.dataset_of(&TileId::parse("1234567").unwrap()), Some("ds-b"));
        assert_eq!(set.dataset_of(&TileId::parse("7654321").unwrap()), Some("ds-a"));

        let expected: Vec<_> = set.expected_files().iter().cloned().collect();
        assert_eq!(
            expected,
            strings(&["abc1234567dem.img", "other1234567.img", "xyz7654321dem.img"])
        );
    }

    #[test]
    fn test_tile_set_fails_on_bad_record() {
        let datasets = strings(&["ds", "ds"]);
        let names = strings(&["abc1234567dem", "broken"]);
        assert!(matches!(
            TileSet::from_columns(&datasets, &names, ".img"),
            Err(ResolveError::NoTileId { record: 1, .. })
        ));
    }

    #[test]
    fn test_tile_id_parse_and_serde() {
        assert!(TileId::parse("123456").is_none());
        assert!(TileId::parse("12345a7").is_none());
        let id = TileId::parse("0001234").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"0001234\"");
        let back: TileId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<TileId>("\"12\"").is_err());
    }
}
