pub use trove_cli::cli;
pub use trove_cli::commands;
pub use trove_cli::config;
pub use trove_cli::AppConfig;
pub use trove_cli::run_blocking;

pub use trove_core as core;
pub use trove_core::database as db;
pub use trove_core::model;
pub use trove_core::services;
