//! Command-line interface components
//!
//! This module contains CLI-specific code for the DEM Harvest application,
//! including argument parsing, command handlers and progress display.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{
    Cli, Commands, ConfigAction, ConfigArgs, GlobalArgs, InputArgs, MergeArgs, PlanArgs, RunArgs,
};
pub use commands::{handle_config, handle_datasets, handle_merge, handle_plan, handle_run};
pub use progress::{ProgressDisplay, ProgressTally};
