//! Dataset URL resolution
//!
//! TNRIS publishes each LiDAR collection under a fixed GUID, and names tile
//! archives with a per-collection header. Both are static, so the catalog is an
//! enum with one variant per supported collection. Dataset names that are not in
//! the catalog resolve to [`TileUrl::Unresolved`], which callers must handle
//! explicitly.

use std::fmt;

use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::app::tiles::{TileId, TileRequest, TileSet};
use crate::constants::tnris::{ARCHIVE_SUFFIX, BASE_URL, RESOURCES_SEGMENT};
use crate::errors::{ResolveError, ResolveResult};

/// LiDAR collections with known archive locations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TnrisDataset {
    /// StratMap 2017 50cm Central Texas
    CentralTexas2017,
    /// StratMap 2009 50cm Tarrant County
    Tarrant2009,
    /// StratMap 2009 1m Dallas
    Dallas2009,
    /// LCRA 2007 140cm
    Lcra2007,
    /// StratMap 2017 50cm Jefferson County
    Jefferson2017,
    /// FEMA 2016 70cm DeWitt County
    Dewitt2016,
    /// StratMap 2011 50cm Blanco, Kendall and Kerr Counties
    BlancoKendallKerr2011,
}

impl TnrisDataset {
    /// Every dataset in the catalog
    pub const ALL: [TnrisDataset; 7] = [
        TnrisDataset::CentralTexas2017,
        TnrisDataset::Tarrant2009,
        TnrisDataset::Dallas2009,
        TnrisDataset::Lcra2007,
        TnrisDataset::Jefferson2017,
        TnrisDataset::Dewitt2016,
        TnrisDataset::BlancoKendallKerr2011,
    ];

    /// Canonical directory name, as written in the tile index
    pub fn dirname(self) -> &'static str {
        self.dirnames()[0]
    }

    /// All directory names that refer to this dataset
    ///
    /// Two collections appear under different spellings in different TNRIS
    /// index releases.
    pub fn dirnames(self) -> &'static [&'static str] {
        match self {
            TnrisDataset::CentralTexas2017 => &["stratmap-2017-50cm-central-texas"],
            TnrisDataset::Tarrant2009 => &["stratmap-2009-50cm-tarrant", "stratmap09-50cm-tarrant"],
            TnrisDataset::Dallas2009 => &["stratmap09-1m-dallas"],
            TnrisDataset::Lcra2007 => &["lcra-2007-140cm", "lcra07-140cm"],
            TnrisDataset::Jefferson2017 => &["stratmap-2017-50cm-jefferson"],
            TnrisDataset::Dewitt2016 => &["fema-2016-70cm-dewitt"],
            TnrisDataset::BlancoKendallKerr2011 => &["stratmap-2011-50cm-blanco-kendall-kerr"],
        }
    }

    /// GUID of the dataset's resource directory in the TNRIS bucket
    pub fn guid(self) -> &'static str {
        match self {
            TnrisDataset::CentralTexas2017 => "0549d3ba-3f72-4710-b26c-28c65df9c70d",
            TnrisDataset::Tarrant2009 => "7bc5f57d-f679-454f-8fd3-bdffc8d54272",
            TnrisDataset::Dallas2009 => "9aba8b42-4a55-4687-95aa-5a7cf75c970a",
            TnrisDataset::Lcra2007 => "ab743202-206c-4c37-99b1-9a46db93bd4c",
            TnrisDataset::Jefferson2017 => "12342f12-2d74-44c4-9f00-a5c12ac2659c",
            TnrisDataset::Dewitt2016 => "4bd279fc-e358-4cdb-abc0-4e34516b21d3",
            TnrisDataset::BlancoKendallKerr2011 => "760f9068-426e-4c30-9829-177259d1da0f",
        }
    }

    /// Prefix of the dataset's tile archive names
    pub fn tile_header(self) -> &'static str {
        match self {
            TnrisDataset::CentralTexas2017 => "stratmap17-50cm-central-texas",
            TnrisDataset::Tarrant2009 => "stratmap09-50cm-tarrant",
            TnrisDataset::Dallas2009 => "stratmap09-1m-dallas",
            TnrisDataset::Lcra2007 => "lcra07-140cm",
            TnrisDataset::Jefferson2017 => "stratmap17-50cm-jefferson",
            TnrisDataset::Dewitt2016 => "fema16-70cm-dewitt",
            TnrisDataset::BlancoKendallKerr2011 => "stratmap11-50cm-blanco-kendall-kerr",
        }
    }

    /// Look a dataset up by any of its directory names
    pub fn from_dirname(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|dataset| dataset.dirnames().iter().any(|alias| *alias == name))
    }

    /// Archive file name for a tile of this dataset
    pub fn archive_name(self, tile_id: &TileId) -> String {
        format!("{}_{}{}", self.tile_header(), tile_id, ARCHIVE_SUFFIX)
    }
}

impl fmt::Display for TnrisDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dirname())
    }
}

/// Download location of one tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileUrl {
    /// Dataset is in the catalog
    Resolved {
        tile_id: TileId,
        dataset: TnrisDataset,
        url: Url,
    },
    /// Dataset name is unknown; there is nothing to download
    Unresolved { tile_id: TileId, dataset_name: String },
}

impl TileUrl {
    /// Tile identifier
    pub fn tile_id(&self) -> &TileId {
        match self {
            TileUrl::Resolved { tile_id, .. } | TileUrl::Unresolved { tile_id, .. } => tile_id,
        }
    }

    /// Dataset directory name as it appeared in the index
    pub fn dataset_name(&self) -> &str {
        match self {
            TileUrl::Resolved { dataset, .. } => dataset.dirname(),
            TileUrl::Unresolved { dataset_name, .. } => dataset_name,
        }
    }

    /// Download URL, if resolved
    pub fn url(&self) -> Option<&Url> {
        match self {
            TileUrl::Resolved { url, .. } => Some(url),
            TileUrl::Unresolved { .. } => None,
        }
    }

    /// Whether the dataset was found in the catalog
    pub fn is_resolved(&self) -> bool {
        matches!(self, TileUrl::Resolved { .. })
    }
}

impl fmt::Display for TileUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileUrl::Resolved { url, .. } => write!(f, "{}", url),
            TileUrl::Unresolved { dataset_name, .. } => {
                write!(f, "<unresolved dataset '{}'>", dataset_name)
            }
        }
    }
}

/// Builds tile download URLs against a base location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    base_url: String,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
        }
    }
}

impl Catalog {
    /// Create a catalog rooted at a custom base URL
    ///
    /// A trailing slash is added when missing.
    pub fn new(base_url: &str) -> ResolveResult<Self> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base).map_err(|e| ResolveError::InvalidUrl {
            url: base.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self { base_url: base })
    }

    /// Base URL that GUIDs are appended to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of a tile archive: `base + GUID + "/resources/" + header + "_" + id + "_dem.zip"`
    pub fn archive_url(&self, dataset: TnrisDataset, tile_id: &TileId) -> ResolveResult<Url> {
        let url = format!(
            "{}{}/{}/{}",
            self.base_url,
            dataset.guid(),
            RESOURCES_SEGMENT,
            dataset.archive_name(tile_id)
        );
        Url::parse(&url).map_err(|e| ResolveError::InvalidUrl {
            url,
            reason: e.to_string(),
        })
    }

    /// Resolve one tile request
    pub fn resolve(&self, request: &TileRequest) -> ResolveResult<TileUrl> {
        match TnrisDataset::from_dirname(&request.dataset) {
            Some(dataset) => Ok(TileUrl::Resolved {
                tile_id: request.tile_id.clone(),
                dataset,
                url: self.archive_url(dataset, &request.tile_id)?,
            }),
            None => {
                debug!(
                    "Dataset '{}' for tile {} is not in the catalog",
                    request.dataset, request.tile_id
                );
                Ok(TileUrl::Unresolved {
                    tile_id: request.tile_id.clone(),
                    dataset_name: request.dataset.clone(),
                })
            }
        }
    }

    /// Resolve every tile in a tile set, in tile identifier order
    pub fn resolve_all(&self, tiles: &TileSet) -> ResolveResult<Vec<TileUrl>> {
        tiles.requests().map(|request| self.resolve(&request)).collect()
    }
}

/// Distinct dataset names that failed to resolve, sorted
pub fn unresolved_datasets(urls: &[TileUrl]) -> Vec<String> {
    let mut names: Vec<String> = urls
        .iter()
        .filter_map(|url| match url {
            TileUrl::Unresolved { dataset_name, .. } => Some(dataset_name.clone()),
            TileUrl::Resolved { .. } => None,
        })
        .collect();
    names.sort();
    names.dedup();
    names
}
