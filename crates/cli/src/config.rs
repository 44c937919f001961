pub use trove_core::config::*;

use crate::cli::Cli;

/// Everything a command needs to open a session.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub app: AppConfig,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub demo: bool,
    pub options: SyncOptions,
}

impl CliConfig {
    pub fn new(app: AppConfig) -> Self {
        Self {
            app,
            endpoint: None,
            api_key: None,
            demo: false,
            options: SyncOptions::default(),
        }
    }
}

pub fn from_cli(cli: &Cli) -> anyhow::Result<CliConfig> {
    let app = AppConfig::discover(cli.data_dir.clone())?;
    Ok(CliConfig {
        endpoint: cli.endpoint.clone(),
        api_key: cli.api_key.clone(),
        demo: cli.demo,
        ..CliConfig::new(app)
    })
}
