//! DEM Harvest CLI application
//!
//! Command-line interface for building elevation mosaics from TNRIS LiDAR tiles.

use std::process;

use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use dem_harvest::cli::{
    Cli, Commands, handle_config, handle_datasets, handle_merge, handle_plan, handle_run,
};
use dem_harvest::config::AppConfig;
use dem_harvest::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error [{}]: {}", e.category(), e);
        if e.is_recoverable() {
            eprintln!("This failure is usually temporary; running the command again may succeed.");
        }
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();
    let configured_level = AppConfig::load(cli.global.config.clone())
        .await
        .ok()
        .map(|config| config.logging.level);
    init_logging(&cli, configured_level.as_deref());

    info!("DEM Harvest v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run(args) => {
            info!("Executing run command");
            handle_run(&cli.global, args).await
        }
        Commands::Plan(args) => {
            info!("Executing plan command");
            handle_plan(&cli.global, args).await
        }
        Commands::Merge(args) => {
            info!("Executing merge command");
            handle_merge(&cli.global, args).await
        }
        Commands::Datasets => handle_datasets().await,
        Commands::Config(args) => handle_config(&cli.global, args).await,
    }
}

/// Initialize logging based on CLI verbosity settings
///
/// `RUST_LOG` wins when set. Otherwise the level comes from the flags or,
/// without flags, the `[logging]` level from the config file.
fn init_logging(cli: &Cli, configured_level: Option<&str>) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    let mut filter = EnvFilter::from_default_env();
    if let Some(directive) = cli.crate_log_directive(configured_level, rust_log.as_deref()) {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose) // Show levels only in very verbose mode
        .with_writer(std::io::stderr)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
