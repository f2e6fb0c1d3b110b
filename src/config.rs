//! Configuration management for DEM Harvest
//!
//! Settings come from built-in defaults, then a TOML file, then command-line
//! flags. The file is the first of: an explicit `--config` path, a project-local
//! `dem-harvest.toml` or `config.toml`, or `<config dir>/dem-harvest/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use humantime_serde::re::humantime::format_duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::{
    Catalog, ClientConfig, FetchConfig, MergeConfig, TileFields, Workflow, WorkflowPaths,
};
use crate::constants::{files, http, limits, logging, raster, tnris, vector, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Input and output locations
    pub paths: PathsConfigToml,
    /// Tile index attribute names
    pub tiles: TilesConfigToml,
    /// Fetch phase settings
    pub fetch: FetchConfigToml,
    /// HTTP client settings
    pub client: ClientConfigToml,
    /// Raster merge settings
    pub merge: MergeConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly path configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfigToml {
    /// Tile index layer (shapefile or GeoJSON)
    pub index: PathBuf,
    /// Area of interest layer
    pub aoi: PathBuf,
    /// Intersection output (GeoJSON)
    pub intersection_output: PathBuf,
    /// Staging directory, cleared at the start of every run
    pub staging_dir: PathBuf,
    /// Merged raster output (GeoTIFF)
    pub merged_output: PathBuf,
}

impl Default for PathsConfigToml {
    fn default() -> Self {
        let defaults = WorkflowPaths::default();
        Self {
            index: defaults.index,
            aoi: defaults.aoi,
            intersection_output: defaults.intersection_output,
            staging_dir: defaults.staging_dir,
            merged_output: defaults.merged_output,
        }
    }
}

/// TOML-friendly tile index configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilesConfigToml {
    /// Attribute holding the dataset directory name
    pub dataset_field: String,
    /// Attribute holding the tile name
    pub tile_name_field: String,
    /// Extension appended to tile names to form staged file names
    pub extension: String,
}

impl Default for TilesConfigToml {
    fn default() -> Self {
        Self {
            dataset_field: vector::DATASET_FIELD.to_string(),
            tile_name_field: vector::TILE_NAME_FIELD.to_string(),
            extension: files::TILE_EXTENSION.to_string(),
        }
    }
}

/// TOML-friendly fetch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfigToml {
    /// Concurrent downloads
    pub pool_size: usize,
    /// Overall time allowed for the fetch phase ("0s" for no limit)
    #[serde(with = "humantime_serde")]
    pub budget: Duration,
    /// Base URL the dataset GUIDs are appended to
    pub base_url: String,
    /// Continue when some datasets are not in the catalog
    pub allow_unresolved: bool,
}

impl Default for FetchConfigToml {
    fn default() -> Self {
        Self {
            pool_size: workers::DEFAULT_POOL_SIZE,
            budget: workers::DEFAULT_FETCH_BUDGET,
            base_url: tnris::BASE_URL.to_string(),
            allow_unresolved: false,
        }
    }
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfigToml {
    /// TCP keep-alive interval ("0s" to disable)
    #[serde(with = "humantime_serde")]
    pub tcp_keepalive: Duration,
    /// TCP nodelay setting
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout ("0s" for no timeout)
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host
    pub pool_max_per_host: usize,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
    /// Retries after a transient failure
    pub max_retries: u32,
    /// Base delay for exponential backoff
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
}

impl Default for ClientConfigToml {
    fn default() -> Self {
        Self {
            tcp_keepalive: Duration::from_secs(30),
            tcp_nodelay: true,
            pool_idle_timeout: http::POOL_IDLE_TIMEOUT,
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            max_retries: limits::MAX_RETRIES,
            retry_base_delay: Duration::from_millis(limits::RETRY_BASE_DELAY_MS),
        }
    }
}

/// TOML-friendly merge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfigToml {
    /// Output nodata (omit to copy it from the sources)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodata: Option<f64>,
    /// Largest mosaic, in pixels, that will be allocated
    pub max_pixels: u64,
}

impl Default for MergeConfigToml {
    fn default() -> Self {
        Self {
            nodata: None,
            max_pixels: raster::MAX_MOSAIC_PIXELS,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level for the application
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl AppConfig {
    /// Convert TOML-friendly configuration to runtime configuration
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidValue` for values the workflow cannot run with.
    pub fn to_runtime_config(&self) -> ConfigResult<(Workflow, ClientConfig)> {
        self.validate()?;

        let catalog = Catalog::new(&self.fetch.base_url).map_err(|e| ConfigError::InvalidValue {
            field: "fetch.base_url".to_string(),
            value: self.fetch.base_url.clone(),
            reason: e.to_string(),
        })?;

        let workflow = Workflow {
            paths: self.paths.to_runtime_config(),
            fields: self.tiles.to_runtime_config(),
            catalog,
            fetch: self.fetch.to_runtime_config(),
            merge: self.merge.to_runtime_config(),
            allow_unresolved: self.fetch.allow_unresolved,
        };
        Ok((workflow, self.client.to_runtime_config()))
    }

    /// Check values that would otherwise fail deep inside the workflow
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |field: &str, value: String, reason: &str| ConfigError::InvalidValue {
            field: field.to_string(),
            value,
            reason: reason.to_string(),
        };

        if self.fetch.pool_size == 0 || self.fetch.pool_size > workers::MAX_POOL_SIZE {
            return Err(invalid(
                "fetch.pool_size",
                self.fetch.pool_size.to_string(),
                &format!("Must be between 1 and {}", workers::MAX_POOL_SIZE),
            ));
        }
        if self.client.rate_limit_rps == 0 {
            return Err(invalid(
                "client.rate_limit_rps",
                "0".to_string(),
                "Must be at least 1",
            ));
        }
        if self.merge.max_pixels == 0 {
            return Err(invalid("merge.max_pixels", "0".to_string(), "Must be at least 1"));
        }
        if self.tiles.dataset_field.is_empty() || self.tiles.tile_name_field.is_empty() {
            return Err(invalid(
                "tiles",
                format!("{:?}/{:?}", self.tiles.dataset_field, self.tiles.tile_name_field),
                "Field names cannot be empty",
            ));
        }
        Ok(())
    }

    /// Load configuration with multi-source precedence:
    /// 1. Default values
    /// 2. Config file (if exists)
    ///
    /// Command-line overrides are applied by the caller.
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let config_path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound { path });
                }
                Some(path)
            }
            None => Self::find_config_file(),
        };

        match config_path {
            Some(path) => Self::load_from_file(&path).await,
            None => {
                debug!("No config file found; using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths: Vec<PathBuf> = files::LOCAL_CONFIG_FILES
            .iter()
            .map(PathBuf::from)
            .collect();
        if let Ok(user_config) = Self::get_default_config_path() {
            search_paths.push(user_config);
        }

        let found = search_paths.into_iter().find(|path| path.exists());
        if let Some(path) = &found {
            debug!("Found config file: {}", path.display());
        }
        found
    }

    /// Get the default config file path for the current user
    pub fn get_default_config_path() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join(files::CONFIG_DIR_NAME).join("config.toml"))
    }

    /// Load configuration from a TOML file
    pub async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let config: AppConfig =
            toml::from_str(&content).map_err(|source| ConfigError::InvalidFormat {
                path: path.to_path_buf(),
                source,
            })?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Write the commented default configuration
    ///
    /// Refuses to replace an existing file unless `force` is set.
    pub async fn write_default(path: &Path, force: bool) -> ConfigResult<()> {
        if path.exists() && !force {
            return Err(ConfigError::InvalidValue {
                field: "path".to_string(),
                value: path.display().to_string(),
                reason: "File already exists (use --force to overwrite)".to_string(),
            });
        }

        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(path, Self::generate_default_config_content())
            .await
            .map_err(io_err)?;

        info!("Wrote default configuration to {}", path.display());
        Ok(())
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Generate default configuration content with helpful comments
    pub fn generate_default_config_content() -> String {
        format!(
            r#"# DEM Harvest Configuration
# Command-line flags override anything set here.

[paths]
# Tile index layer (.shp or .geojson) with one record per LiDAR tile
index = "tile_index.shp"
# Area of interest; must use the same CRS as the tile index
aoi = "aoi.geojson"
intersection_output = "{intersection}"
# Cleared at the start of every run
staging_dir = "{staging}"
merged_output = "{merged}"

[tiles]
dataset_field = "{dataset_field}"
tile_name_field = "{tile_name_field}"
extension = "{extension}"

[fetch]
pool_size = {pool_size}
# Overall time allowed for downloads; "0s" for no limit
budget = "{budget}"
base_url = "{base_url}"
# Continue when a dataset is missing from the catalog
allow_unresolved = false

[client]
tcp_keepalive = "30s"
tcp_nodelay = true
pool_idle_timeout = "{pool_idle}"
pool_max_per_host = {pool_max}
request_timeout = "{request_timeout}"
connect_timeout = "{connect_timeout}"
rate_limit_rps = {rps}
max_retries = {max_retries}
retry_base_delay = "{retry_delay}ms"

[merge]
# Output nodata; copied from the sources when unset
# nodata = -9999.0
max_pixels = {max_pixels}

[logging]
level = "{level}"  # error, warn, info, debug, trace
"#,
            intersection = files::INTERSECTION_FILE,
            staging = files::STAGING_DIR,
            merged = files::MERGED_FILE,
            dataset_field = vector::DATASET_FIELD,
            tile_name_field = vector::TILE_NAME_FIELD,
            extension = files::TILE_EXTENSION,
            pool_size = workers::DEFAULT_POOL_SIZE,
            budget = format_duration(workers::DEFAULT_FETCH_BUDGET),
            base_url = tnris::BASE_URL,
            pool_idle = format_duration(http::POOL_IDLE_TIMEOUT),
            pool_max = http::POOL_MAX_PER_HOST,
            request_timeout = format_duration(http::DEFAULT_TIMEOUT),
            connect_timeout = format_duration(http::CONNECT_TIMEOUT),
            rps = limits::DEFAULT_RATE_LIMIT_RPS,
            max_retries = limits::MAX_RETRIES,
            retry_delay = limits::RETRY_BASE_DELAY_MS,
            max_pixels = raster::MAX_MOSAIC_PIXELS,
            level = logging::DEFAULT_LOG_LEVEL,
        )
    }
}

/// Zero durations switch a limit off
fn non_zero(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then_some(duration)
}

impl PathsConfigToml {
    /// Convert to runtime WorkflowPaths
    pub fn to_runtime_config(&self) -> WorkflowPaths {
        WorkflowPaths {
            index: self.index.clone(),
            aoi: self.aoi.clone(),
            intersection_output: self.intersection_output.clone(),
            staging_dir: self.staging_dir.clone(),
            merged_output: self.merged_output.clone(),
        }
    }
}

impl TilesConfigToml {
    /// Convert to runtime TileFields
    pub fn to_runtime_config(&self) -> TileFields {
        TileFields {
            dataset: self.dataset_field.clone(),
            tile_name: self.tile_name_field.clone(),
            extension: self.extension.clone(),
        }
    }
}

impl FetchConfigToml {
    /// Convert to runtime FetchConfig
    pub fn to_runtime_config(&self) -> FetchConfig {
        FetchConfig {
            pool_size: self.pool_size,
            budget: non_zero(self.budget),
        }
    }
}

impl ClientConfigToml {
    /// Convert to runtime ClientConfig
    pub fn to_runtime_config(&self) -> ClientConfig {
        ClientConfig {
            tcp_keepalive: non_zero(self.tcp_keepalive),
            tcp_nodelay: self.tcp_nodelay,
            pool_idle_timeout: non_zero(self.pool_idle_timeout),
            pool_max_per_host: self.pool_max_per_host,
            request_timeout: self.request_timeout,
            connect_timeout: self.connect_timeout,
            rate_limit_rps: self.rate_limit_rps,
            max_retries: self.max_retries,
            retry_base_delay: self.retry_base_delay,
        }
    }
}

impl MergeConfigToml {
    /// Convert to runtime MergeConfig
    pub fn to_runtime_config(&self) -> MergeConfig {
        MergeConfig {
            nodata: self.nodata,
            max_pixels: self.max_pixels,
        }
    }
}
