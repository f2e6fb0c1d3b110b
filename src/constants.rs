//! Application constants for DEM Harvest
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// TNRIS archive locations
pub mod tnris {
    /// Base URL of the TNRIS data bucket; dataset GUIDs are appended to it
    pub const BASE_URL: &str = "https://s3.amazonaws.com/data.tnris.org/";

    /// Path segment between the dataset GUID and the archive name
    pub const RESOURCES_SEGMENT: &str = "resources";

    /// Suffix appended to `{tile_header}_{tile_id}` to form the archive name
    pub const ARCHIVE_SUFFIX: &str = "_dem.zip";
}

/// Vector input defaults
pub mod vector {
    /// Attribute holding the dataset directory name in the tile index
    pub const DATASET_FIELD: &str = "dirname";

    /// Attribute holding the tile file name in the tile index
    pub const TILE_NAME_FIELD: &str = "demname";

    /// Length of the numeric tile identifier embedded in tile names
    pub const TILE_ID_DIGITS: usize = 7;

    /// EPSG code implied by a GeoJSON file without a `crs` member
    pub const GEOJSON_DEFAULT_EPSG: u32 = 4326;
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = concat!("DEM-Harvest/", env!("CARGO_PKG_VERSION"));

    /// Default per-request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 10;
}

/// Rate limiting and retry configuration
pub mod limits {
    /// Default request rate limit (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 10;

    /// Maximum retry attempts for transient request failures
    pub const MAX_RETRIES: u32 = 2;

    /// Base delay for exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 500;

    /// Largest single file accepted from a tile archive (bytes)
    pub const MAX_ARCHIVE_ENTRY_BYTES: u64 = 4 * 1024 * 1024 * 1024;
}

/// Worker and concurrency configuration
pub mod workers {
    use super::Duration;

    /// Default number of concurrent downloads
    pub const DEFAULT_POOL_SIZE: usize = 10;

    /// Maximum recommended concurrent downloads
    pub const MAX_POOL_SIZE: usize = 64;

    /// Default overall fetch budget
    pub const DEFAULT_FETCH_BUDGET: Duration = Duration::from_secs(60 * 60);

    /// Capacity of the fetch progress channel
    pub const EVENT_BUFFER_SIZE: usize = 256;
}

/// File and staging constants
pub mod files {
    /// Extension appended to tile names to form the expected staged file name
    pub const TILE_EXTENSION: &str = ".img";

    /// Default intersection output file
    pub const INTERSECTION_FILE: &str = "intersection.geojson";

    /// Default merged raster file
    pub const MERGED_FILE: &str = "dem_merge.tif";

    /// Default staging directory
    pub const STAGING_DIR: &str = "staging";

    /// Local project configuration file names, searched in order
    pub const LOCAL_CONFIG_FILES: [&str; 2] = ["./dem-harvest.toml", "./config.toml"];

    /// Directory name under the user config dir
    pub const CONFIG_DIR_NAME: &str = "dem-harvest";
}

/// Raster constants
pub mod raster {
    /// Nodata written when no source declares one
    pub const DEFAULT_NODATA: f32 = -9999.0;

    /// Tolerance used when comparing transform terms to zero
    pub const ROTATION_EPSILON: f64 = 1e-12;

    /// Largest mosaic (in pixels) the merger will allocate
    pub const MAX_MOSAIC_PIXELS: u64 = 1_500_000_000;

    /// Magic bytes that open an ERDAS Imagine (.img) file
    pub const HFA_MAGIC: &[u8] = b"EHFA_HEADER_TAG";
}

/// Logging constants
pub mod logging {
    /// Default log level
    pub const DEFAULT_LOG_LEVEL: &str = "warn";
}

/// Progress reporting
pub mod progress {
    /// Spinner/bar refresh interval (milliseconds)
    pub const TICK_MS: u64 = 120;
}

// Re-export commonly used constants for convenience
pub use files::TILE_EXTENSION;
pub use http::{DEFAULT_TIMEOUT as HTTP_TIMEOUT, USER_AGENT};
pub use limits::{DEFAULT_RATE_LIMIT_RPS, MAX_RETRIES};
pub use tnris::BASE_URL as TNRIS_BASE_URL;
pub use workers::DEFAULT_POOL_SIZE;
