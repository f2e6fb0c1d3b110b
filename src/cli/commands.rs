//! Command handlers for DEM Harvest CLI
//!
//! This module implements the command handlers that coordinate between CLI
//! arguments, the configuration file and the workflow.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::app::fetcher::format_bytes;
use crate::app::{DirWorkspace, TileUrl, TnrisClient, TnrisDataset, WorkflowReport};
use crate::cli::{ConfigAction, ConfigArgs, GlobalArgs, MergeArgs, PlanArgs, ProgressDisplay, RunArgs};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

/// Handle the run command
///
/// Runs every workflow stage and prints a summary of each.
pub async fn handle_run(global: &GlobalArgs, args: RunArgs) -> Result<()> {
    let start_time = Instant::now();

    let mut config = AppConfig::load(global.config.clone()).await?;
    args.apply(&mut config);
    let (workflow, client_config) = config.to_runtime_config()?;

    let client = TnrisClient::with_config(client_config)?;
    let workspace = Arc::new(DirWorkspace::create(&workflow.paths.staging_dir)?);
    info!(
        "Staging tiles in {} with {} concurrent downloads",
        workflow.paths.staging_dir.display(),
        workflow.fetch.pool_size
    );

    let display = ProgressDisplay::new(!args.no_progress && !global.quiet);
    let (events, progress) = display.spawn();

    let result = workflow.run(&client, workspace, Some(events)).await;
    if let Err(e) = progress.await {
        warn!("Progress display task failed: {}", e);
    }
    let report = result?;

    if !global.quiet {
        print_run_report(&report);
        println!("⏱️  Finished in {:.1}s", start_time.elapsed().as_secs_f64());
    }
    Ok(())
}

fn print_run_report(report: &WorkflowReport) {
    println!();
    println!(
        "📐 Intersection: {} records, {} tiles",
        report.plan.intersection.len(),
        report.plan.tiles.len()
    );
    if !report.cleared.removed.is_empty() {
        println!(
            "🧹 Cleared {} stale staging entries",
            report.cleared.removed.len()
        );
    }

    println!("📥 {}", report.fetch.summary());
    for outcome in report.fetch.failures() {
        if let Err(e) = &outcome.result {
            let retry = if e.is_transient() { " (retryable)" } else { "" };
            println!("   ✗ {} [{}] {}{}", outcome.tile_id, outcome.dataset, e, retry);
        }
    }

    println!(
        "✂️  Pruned {} files, kept {}",
        report.prune.removed.len(),
        report.prune.kept.len()
    );
    for (name, reason) in &report.prune.failed {
        println!("   ⚠️  could not remove {}: {}", name, reason);
    }
    if !report.prune.missing.is_empty() {
        println!("   ⚠️  missing tiles: {}", report.prune.missing.join(", "));
    }

    let merge = &report.merge;
    println!(
        "🗺️  Merged {} tiles into {} ({}x{}, {})",
        merge.sources.len(),
        merge.output.display(),
        merge.width,
        merge.height,
        format_bytes(merge.bytes)
    );
    println!("   md5 {}", merge.md5);
}

/// Handle the plan command
///
/// Prints the tile table without downloading or touching the staging directory.
pub async fn handle_plan(global: &GlobalArgs, args: PlanArgs) -> Result<()> {
    let mut config = AppConfig::load(global.config.clone()).await?;
    args.input.apply(&mut config);
    let (workflow, _) = config.to_runtime_config()?;

    let plan = workflow.plan()?;

    println!(
        "{} intersected records, {} unique tiles",
        plan.intersection.len(),
        plan.tiles.len()
    );
    println!();
    println!("{:<9} {:<36} URL", "TILE", "DATASET");
    for url in &plan.urls {
        match url {
            TileUrl::Resolved {
                tile_id,
                dataset,
                url,
            } => println!("{:<9} {:<36} {}", tile_id, dataset.dirname(), url),
            TileUrl::Unresolved {
                tile_id,
                dataset_name,
            } => println!("{:<9} {:<36} UNRESOLVED", tile_id, dataset_name),
        }
    }

    let unresolved = plan.unresolved();
    if !unresolved.is_empty() {
        println!();
        println!("⚠️  Datasets not in the catalog: {}", unresolved.join(", "));
        if !workflow.allow_unresolved {
            println!("   A run would stop here; pass --allow-unresolved to fetch the rest.");
        }
    }
    Ok(())
}

/// Handle the merge command
pub async fn handle_merge(global: &GlobalArgs, args: MergeArgs) -> Result<()> {
    let mut config = AppConfig::load(global.config.clone()).await?;
    args.apply(&mut config);
    let (workflow, _) = config.to_runtime_config()?;

    let workspace = DirWorkspace::create(&workflow.paths.staging_dir)?;
    let report = tokio::task::spawn_blocking(move || workflow.merge_staged(&workspace))
        .await
        .map_err(|e| AppError::generic(format!("Merge task failed: {}", e)))??;

    if !global.quiet {
        println!(
            "🗺️  Merged {} tiles into {} ({}x{}, {})",
            report.sources.len(),
            report.output.display(),
            report.width,
            report.height,
            format_bytes(report.bytes)
        );
        println!("   md5 {}", report.md5);
    }
    Ok(())
}

/// Handle the datasets command
pub async fn handle_datasets() -> Result<()> {
    println!("{:<36} {:<38} TILE HEADER", "DIRNAME", "GUID");
    for dataset in TnrisDataset::ALL {
        println!(
            "{:<36} {:<38} {}",
            dataset.dirname(),
            dataset.guid(),
            dataset.tile_header()
        );
        for alias in &dataset.dirnames()[1..] {
            println!("  also: {}", alias);
        }
    }
    Ok(())
}

/// Handle the config command
pub async fn handle_config(global: &GlobalArgs, args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Init { path, force } => {
            let path = match path {
                Some(path) => path,
                None => AppConfig::get_default_config_path()?,
            };
            AppConfig::write_default(&path, force).await?;
            println!("📁 Created configuration file:");
            println!("   {}", path.display());
        }
        ConfigAction::Show => {
            let config = AppConfig::load(global.config.clone()).await?;
            config.validate()?;
            print!("{}", config.to_toml()?);
        }
    }
    Ok(())
}
