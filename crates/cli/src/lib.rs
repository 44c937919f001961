pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;

pub use trove_core as core;
pub use trove_core::database as db;
pub use trove_core::model;

pub use trove_core::AppConfig;

use anyhow::{Context, Result};

use crate::cli::Cli;

/// Entry point used by the `trove` binary.
pub fn run_blocking(cli: Cli) -> Result<()> {
    logging::init_tracing(cli.log_filter.clone())?;
    let config = config::from_cli(&cli)?;
    let command = cli.command.unwrap_or_default();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let stdout = std::io::stdout();
    runtime.block_on(commands::execute(&config, command, stdout.lock()))
}
