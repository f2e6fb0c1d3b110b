//! Command-line argument parsing for DEM Harvest
//!
//! This module defines the CLI structure using clap derive macros. Path and
//! tuning flags override the matching configuration file entries.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use humantime_serde::re::humantime;

use crate::config::AppConfig;

/// DEM Harvest - Build elevation mosaics from TNRIS LiDAR tiles
#[derive(Parser, Debug)]
#[command(
    name = "dem_harvest",
    version,
    about = "Download and merge the TNRIS LiDAR DEM tiles covering an area of interest",
    long_about = "Intersects a LiDAR tile index with an area-of-interest polygon, downloads the matching
DEM tile archives concurrently, keeps only the tile rasters and merges them into one GeoTIFF."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the whole workflow: intersect, fetch, prune and merge
    Run(RunArgs),

    /// Show the tiles and URLs a run would use, without downloading
    Plan(PlanArgs),

    /// Merge the rasters already in the staging directory
    Merge(MergeArgs),

    /// List the datasets in the built-in catalog
    Datasets,

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// Input layer locations
#[derive(Args, Debug, Clone, Default)]
pub struct InputArgs {
    /// Tile index layer (.shp or .geojson)
    #[arg(long, value_name = "FILE")]
    pub index: Option<PathBuf>,

    /// Area of interest layer (.shp or .geojson)
    #[arg(long, value_name = "FILE")]
    pub aoi: Option<PathBuf>,

    /// Attribute naming each tile's dataset
    #[arg(long, value_name = "NAME")]
    pub dataset_field: Option<String>,

    /// Attribute naming each tile's file
    #[arg(long, value_name = "NAME")]
    pub tile_name_field: Option<String>,
}

/// Arguments for the run command
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Where to write the intersection layer (GeoJSON)
    #[arg(long, value_name = "FILE")]
    pub intersection_output: Option<PathBuf>,

    /// Staging directory (cleared before downloading)
    #[arg(long, value_name = "DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Merged raster output
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Number of concurrent downloads
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Overall time allowed for downloads (e.g. "30m"; "0s" for no limit)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub budget: Option<Duration>,

    /// Continue when some datasets are not in the catalog
    #[arg(long)]
    pub allow_unresolved: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// Arguments for the plan command
#[derive(Args, Debug, Clone, Default)]
pub struct PlanArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

/// Arguments for the merge command
#[derive(Args, Debug, Clone, Default)]
pub struct MergeArgs {
    /// Staging directory holding the rasters
    #[arg(long, value_name = "DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Merged raster output
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Nodata value for the output
    #[arg(long, allow_negative_numbers = true)]
    pub nodata: Option<f64>,
}

/// Arguments for configuration management
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a commented default configuration file
    Init {
        /// Target file (defaults to the user config location)
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level based on global arguments
    pub fn log_level(&self) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.very_verbose {
            tracing::Level::DEBUG
        } else if self.global.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }

    /// Level for the crate's log directive
    ///
    /// Verbosity flags win; otherwise the configured level is used when given.
    pub fn log_directive_level(&self, configured: Option<&str>) -> String {
        let flagged = self.global.quiet || self.global.verbose || self.global.very_verbose;
        match configured {
            Some(level) if !flagged => level.to_lowercase(),
            _ => self.log_level().to_string().to_lowercase(),
        }
    }

    /// Directive for the crate's own logs, or `None` when `RUST_LOG` is set
    ///
    /// A non-empty `RUST_LOG` overrides both the flags and the configured level.
    pub fn crate_log_directive(
        &self,
        configured: Option<&str>,
        rust_log: Option<&str>,
    ) -> Option<String> {
        match rust_log {
            Some(directives) if !directives.trim().is_empty() => None,
            _ => Some(format!("dem_harvest={}", self.log_directive_level(configured))),
        }
    }
}

impl InputArgs {
    /// Apply flag overrides to a loaded configuration
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(index) = &self.index {
            config.paths.index = index.clone();
        }
        if let Some(aoi) = &self.aoi {
            config.paths.aoi = aoi.clone();
        }
        if let Some(field) = &self.dataset_field {
            config.tiles.dataset_field = field.clone();
        }
        if let Some(field) = &self.tile_name_field {
            config.tiles.tile_name_field = field.clone();
        }
    }
}

impl RunArgs {
    /// Apply flag overrides to a loaded configuration
    pub fn apply(&self, config: &mut AppConfig) {
        self.input.apply(config);
        if let Some(path) = &self.intersection_output {
            config.paths.intersection_output = path.clone();
        }
        if let Some(dir) = &self.staging_dir {
            config.paths.staging_dir = dir.clone();
        }
        if let Some(output) = &self.output {
            config.paths.merged_output = output.clone();
        }
        if let Some(workers) = self.workers {
            config.fetch.pool_size = workers;
        }
        if let Some(budget) = self.budget {
            config.fetch.budget = budget;
        }
        if self.allow_unresolved {
            config.fetch.allow_unresolved = true;
        }
    }
}

impl MergeArgs {
    /// Apply flag overrides to a loaded configuration
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.staging_dir {
            config.paths.staging_dir = dir.clone();
        }
        if let Some(output) = &self.output {
            config.paths.merged_output = output.clone();
        }
        if self.nodata.is_some() {
            config.merge.nodata = self.nodata;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_parse_and_override() {
        let cli = Cli::try_parse_from([
            "dem_harvest",
            "run",
            "--index",
            "StratMap_Lidar_Index.shp",
            "--aoi",
            "aoi.shp",
            "-w",
            "4",
            "--budget",
            "15m",
            "--allow-unresolved",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert_eq!(config.paths.index, PathBuf::from("StratMap_Lidar_Index.shp"));
        assert_eq!(config.paths.aoi, PathBuf::from("aoi.shp"));
        assert_eq!(config.fetch.pool_size, 4);
        assert_eq!(config.fetch.budget, Duration::from_secs(900));
        assert!(config.fetch.allow_unresolved);
        // Untouched values keep their configured defaults
        assert_eq!(config.paths.staging_dir, AppConfig::default().paths.staging_dir);
    }

    #[test]
    fn test_merge_args_accept_negative_nodata() {
        let cli = Cli::try_parse_from(["dem_harvest", "merge", "--nodata", "-9999"]).unwrap();
        let Commands::Merge(args) = cli.command else {
            panic!("expected merge command");
        };
        let mut config = AppConfig::default();
        args.apply(&mut config);
        assert_eq!(config.merge.nodata, Some(-9999.0));
    }

    #[test]
    fn test_log_level() {
        let cli_quiet = Cli {
            global: GlobalArgs {
                quiet: true,
                ..Default::default()
            },
            command: Commands::Datasets,
        };

        let cli_verbose = Cli {
            global: GlobalArgs {
                verbose: true,
                ..Default::default()
            },
            command: Commands::Datasets,
        };

        assert_eq!(cli_quiet.log_level(), tracing::Level::ERROR);
        assert_eq!(cli_verbose.log_level(), tracing::Level::INFO);

        // Flags override the configured level
        assert_eq!(cli_verbose.log_directive_level(Some("debug")), "info");
        let cli_plain = Cli {
            global: GlobalArgs::default(),
            command: Commands::Datasets,
        };
        assert_eq!(cli_plain.log_directive_level(Some("DEBUG")), "debug");
        assert_eq!(cli_plain.log_directive_level(None), "warn");
    }

    #[test]
    fn test_rust_log_overrides_flags_and_config() {
        let cli = Cli {
            global: GlobalArgs {
                verbose: true,
                ..Default::default()
            },
            command: Commands::Datasets,
        };

        assert_eq!(
            cli.crate_log_directive(Some("debug"), None).as_deref(),
            Some("dem_harvest=info")
        );
        assert_eq!(
            cli.crate_log_directive(Some("debug"), Some("  ")).as_deref(),
            Some("dem_harvest=info")
        );
        assert_eq!(
            cli.crate_log_directive(Some("debug"), Some("dem_harvest=trace")),
            None
        );
    }
}
