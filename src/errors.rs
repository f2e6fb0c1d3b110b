//! Error types for DEM Harvest
//!
//! This module defines the error types for every stage of the workflow. Errors are
//! grouped by the stage that raises them so that the pipeline can apply the right
//! propagation policy: input and resolution errors halt before any network activity,
//! fetch errors are isolated per tile, workspace errors are logged and skipped, and
//! merge errors are fatal.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading and intersecting the vector inputs
#[derive(Error, Debug)]
pub enum InputError {
    /// Vector layer file does not exist
    #[error("Vector layer not found: {path}")]
    LayerNotFound { path: PathBuf },

    /// File extension is not a supported vector format
    #[error("Unsupported vector format for {path}. Expected .shp, .geojson or .json")]
    UnsupportedFormat { path: PathBuf },

    /// I/O error reading a layer or its sidecar files
    #[error("Failed to read vector layer {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// GeoJSON parsing error
    #[error("Invalid GeoJSON in {path}: {source}")]
    GeoJson {
        path: PathBuf,
        #[source]
        source: geojson::Error,
    },

    /// Shapefile parsing error
    #[error("Invalid shapefile {path}: {source}")]
    Shapefile {
        path: PathBuf,
        #[source]
        source: shapefile::Error,
    },

    /// A feature geometry is missing or is not areal
    #[error("Feature {index} in {layer} has no polygon geometry: {reason}")]
    InvalidGeometry {
        layer: String,
        index: usize,
        reason: String,
    },

    /// A required attribute is missing from a record
    #[error("Record {index} in {layer} is missing the '{field}' attribute")]
    MissingField {
        layer: String,
        index: usize,
        field: String,
    },

    /// The two input layers do not share a coordinate reference system
    #[error(
        "CRS mismatch: tile index is {index_crs} but area of interest is {aoi_crs}. Reproject one layer before running"
    )]
    CrsMismatch { index_crs: String, aoi_crs: String },

    /// The overlay produced no records
    #[error(
        "The area of interest does not intersect any tile in the index. Check that both layers use the same CRS"
    )]
    EmptyIntersection,

    /// Failed to write the intersection layer
    #[error("Failed to write intersection layer to {path}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error
    #[error("JSON serialization error")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while turning intersection records into downloadable tiles
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Tile name field contains no run of exactly seven digits
    #[error("Record {record}: tile name '{value}' contains no 7-digit tile identifier")]
    NoTileId { record: usize, value: String },

    /// Tile name field contains more than one run of exactly seven digits
    #[error("Record {record}: tile name '{value}' contains several 7-digit identifiers: {matches:?}")]
    AmbiguousTileId {
        record: usize,
        value: String,
        matches: Vec<String>,
    },

    /// One or more dataset names are absent from the catalog
    #[error("Unknown dataset name(s): {names:?}. Use --allow-unresolved to continue without them")]
    UnresolvedDatasets { names: Vec<String> },

    /// A constructed URL failed to parse
    #[error("Invalid download URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Per-tile failure of the concurrent fetcher
#[derive(Error, Debug)]
pub enum FetchError {
    /// Dataset could not be resolved, so there is no URL to fetch
    #[error("Dataset '{dataset}' is not in the catalog; tile was not requested")]
    Unresolved { dataset: String },

    /// Transport-level HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned a non-success status
    #[error("Server returned HTTP {status}")]
    Status { status: u16 },

    /// Rate limit exceeded after retries
    #[error("Rate limit exceeded. Server responded with HTTP 429")]
    RateLimitExceeded,

    /// Server overloaded after retries
    #[error("Server overloaded. Server responded with HTTP 503")]
    ServerOverloaded,

    /// Request failed repeatedly
    #[error("Maximum retry attempts ({max_retries}) exceeded")]
    MaxRetriesExceeded { max_retries: u32 },

    /// Request did not finish within the per-request timeout
    #[error("Download timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The overall fetch budget ran out before this tile finished
    #[error("Fetch budget exhausted before the tile completed")]
    BudgetExhausted,

    /// Response body is not a readable archive
    #[error("Malformed archive: {reason}")]
    MalformedArchive { reason: String },

    /// Archive contained no files
    #[error("Archive contained no files")]
    EmptyArchive,

    /// Extracted file could not be written to the workspace
    #[error("Failed to stage extracted file")]
    Workspace(#[from] WorkspaceError),

    /// Extraction task panicked or was cancelled
    #[error("Extraction task failed: {reason}")]
    TaskFailed { reason: String },
}

impl FetchError {
    /// Short failure kind used in summaries
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Unresolved { .. } => "unresolved",
            FetchError::Http(_)
            | FetchError::Status { .. }
            | FetchError::RateLimitExceeded
            | FetchError::ServerOverloaded
            | FetchError::MaxRetriesExceeded { .. } => "http",
            FetchError::Timeout { .. } | FetchError::BudgetExhausted => "timeout",
            FetchError::MalformedArchive { .. } | FetchError::EmptyArchive => "archive",
            FetchError::Workspace(_) | FetchError::TaskFailed { .. } => "staging",
        }
    }

    /// Whether a later re-run could succeed for this tile
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(_)
            | FetchError::RateLimitExceeded
            | FetchError::ServerOverloaded
            | FetchError::MaxRetriesExceeded { .. }
            | FetchError::Timeout { .. }
            | FetchError::BudgetExhausted => true,
            FetchError::Status { status } => *status >= 500,
            _ => false,
        }
    }
}

impl From<zip::result::ZipError> for FetchError {
    fn from(error: zip::result::ZipError) -> Self {
        FetchError::MalformedArchive {
            reason: error.to_string(),
        }
    }
}

/// Staging directory errors
#[derive(Error, Debug)]
pub enum WorkspaceError {
    /// I/O error on a workspace entry
    #[error("Workspace I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Requested entry does not exist
    #[error("Workspace entry not found: {name}")]
    NotFound { name: String },

    /// Entry name would escape the workspace
    #[error("Invalid workspace entry name: {name}")]
    InvalidName { name: String },

    /// Workspace root exists but is not a directory
    #[error("Workspace root is not a directory: {path}")]
    NotADirectory { path: PathBuf },
}

/// Raster merge errors
#[derive(Error, Debug)]
pub enum MergeError {
    /// Nothing left to merge after pruning
    #[error("No input rasters to merge. Expected {expected:?}, staged {staged:?}")]
    NoInput {
        expected: Vec<String>,
        staged: Vec<String>,
    },

    /// TIFF decoding failure
    #[error("Failed to decode raster {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: tiff::TiffError,
    },

    /// Raster carries no georeferencing tags
    #[error("Raster {name} has no georeferencing (ModelTiepoint/ModelPixelScale or ModelTransformation)")]
    MissingGeoreference { name: String },

    /// Raster transform has rotation terms
    #[error("Raster {name} has a rotated geotransform, which cannot be mosaicked")]
    RotatedTransform { name: String },

    /// File format is recognised but not readable in this build
    #[error("Raster {name} is {format}, which this build cannot read")]
    UnsupportedFormat { name: String, format: String },

    /// Source declares a coordinate system with no EPSG equivalent
    #[error("Raster {name} uses coordinate system {crs}, which has no EPSG code to carry into the mosaic")]
    UnknownCrs { name: String, crs: String },

    /// Source has more than one band
    #[error("Raster {name} has {found} bands; only single-band rasters can be merged")]
    BandCount { name: String, found: usize },

    /// Sources use different sample types
    #[error("Raster {name} stores {found} samples but {expected} was expected")]
    SampleType {
        name: String,
        expected: String,
        found: String,
    },

    /// Pixel buffer does not match the declared dimensions
    #[error("Raster {name} has {found} samples, expected {expected}")]
    SizeMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    /// Output extent is degenerate or too large
    #[error("Invalid mosaic extent: {reason}")]
    InvalidExtent { reason: String },

    /// TIFF encoding failure
    #[error("Failed to encode merged raster: {0}")]
    Encode(#[source] tiff::TiffError),

    /// Output could not be written
    #[error("Failed to write merged raster to {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Staged file could not be read
    #[error("Failed to read staged raster")]
    Workspace(#[from] WorkspaceError),

    /// GDAL failure (only with the `gdal` feature)
    #[cfg(feature = "gdal")]
    #[error("GDAL error on {name}: {source}")]
    Gdal {
        name: String,
        #[source]
        source: gdal::errors::GdalError,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Configuration file could not be read or written
    #[error("Configuration file I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration format
    #[error("Invalid configuration format in {path}: {source}")]
    InvalidFormat {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Configuration could not be serialized
    #[error("Failed to serialize configuration")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required configuration field
    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// No user configuration directory on this platform
    #[error("Could not determine user config directory")]
    NoConfigDir,
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Vector input error
    #[error(transparent)]
    Input(#[from] InputError),

    /// Tile or dataset resolution error
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Fetch error surfaced outside the per-tile summary
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Workspace error
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// Merge failure with the staged/expected tile lists for diagnosis
    #[error("{source}\n  expected tiles: {expected:?}\n  staged files:   {staged:?}")]
    Merge {
        #[source]
        source: MergeError,
        expected: Vec<String>,
        staged: Vec<String>,
    },

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Attach the expected and staged file lists to a merge error
    pub fn merge(source: MergeError, expected: Vec<String>, staged: Vec<String>) -> Self {
        Self::Merge {
            source,
            expected,
            staged,
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Fetch(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Input(_) => "input",
            AppError::Resolve(_) => "resolution",
            AppError::Fetch(_) => "fetch",
            AppError::Workspace(_) => "workspace",
            AppError::Merge { .. } => "merge",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

impl From<MergeError> for AppError {
    fn from(source: MergeError) -> Self {
        AppError::merge(source, Vec::new(), Vec::new())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Vector input result type alias
pub type InputResult<T> = std::result::Result<T, InputError>;

/// Resolution result type alias
pub type ResolveResult<T> = std::result::Result<T, ResolveError>;

/// Per-tile fetch result type alias
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Workspace result type alias
pub type WorkspaceResult<T> = std::result::Result<T, WorkspaceError>;

/// Merge result type alias
pub type MergeResult<T> = std::result::Result<T, MergeError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let input = AppError::Input(InputError::EmptyIntersection);
        assert_eq!(input.category(), "input");
        assert!(!input.is_recoverable());

        let fetch = AppError::Fetch(FetchError::Timeout { seconds: 5 });
        assert_eq!(fetch.category(), "fetch");
        assert!(fetch.is_recoverable());
    }

    #[test]
    fn test_transient_fetch_errors() {
        assert!(FetchError::BudgetExhausted.is_transient());
        assert!(FetchError::Status { status: 503 }.is_transient());
        assert!(!FetchError::Status { status: 404 }.is_transient());
        assert!(!FetchError::EmptyArchive.is_transient());
        assert!(!FetchError::Unresolved {
            dataset: "x".into()
        }
        .is_transient());
    }

    #[test]
    fn test_fetch_error_kinds() {
        assert_eq!(
            FetchError::Unresolved {
                dataset: "x".into()
            }
            .kind(),
            "unresolved"
        );
        assert_eq!(FetchError::Status { status: 404 }.kind(), "http");
        assert_eq!(FetchError::EmptyArchive.kind(), "archive");
        assert_eq!(FetchError::BudgetExhausted.kind(), "timeout");
    }

    #[test]
    fn test_merge_error_carries_context() {
        let err = AppError::merge(
            MergeError::InvalidExtent {
                reason: "zero width".into(),
            },
            vec!["a.img".into()],
            vec![],
        );
        let message = err.to_string();
        assert!(message.contains("zero width"));
        assert!(message.contains("a.img"));
        assert_eq!(err.category(), "merge");
    }
}
