use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use directories::{BaseDirs, ProjectDirs};
use once_cell::sync::Lazy;

use crate::store::SettingsStore;
use crate::view::DEFAULT_PAGE_SIZE;

static DEFAULT_DB_NAME: &str = "trove.sqlite3";
static ENV_DATA_DIR: &str = "TROVE_DATA_DIR";
static ENV_ENDPOINT: &str = "TROVE_ENDPOINT";
static ENV_API_KEY: &str = "TROVE_API_KEY";

pub const SETTING_ENDPOINT: &str = "connection.endpoint";
pub const SETTING_API_KEY: &str = "connection.api_key";

pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

static PROJECT_DIRS: Lazy<Option<ProjectDirs>> =
    Lazy::new(|| ProjectDirs::from("dev", "trove", "trove"));

#[derive(Debug, Clone)]
pub struct AppConfig {
    data_dir: PathBuf,
    db_path: PathBuf,
}

impl AppConfig {
    /// Construct [`AppConfig`] by resolving the data directory using the provided override,
    /// environment variables, and platform defaults.
    pub fn discover(data_dir_override: Option<PathBuf>) -> Result<Self> {
        let data_dir = resolve_data_dir(data_dir_override)?;
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).with_context(|| {
                format!("Failed to create data directory at {}", data_dir.display())
            })?;
        }
        Self::from_data_dir(data_dir)
    }

    /// Construct [`AppConfig`] directly from a resolved data directory.
    pub fn from_data_dir(data_dir: PathBuf) -> Result<Self> {
        let db_path = data_dir.join(DEFAULT_DB_NAME);
        Ok(Self { data_dir, db_path })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

/// Where the task server lives and how to authenticate against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub endpoint: String,
    pub api_key: String,
}

impl ConnectionConfig {
    /// Both parts must be present for a connection to count as configured.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Option<Self> {
        let endpoint = endpoint.into().trim().to_string();
        let api_key = api_key.into().trim().to_string();
        if endpoint.is_empty() || api_key.is_empty() {
            return None;
        }
        Some(Self { endpoint, api_key })
    }

    /// Flags win over the environment, which wins over stored settings.
    pub fn resolve(
        endpoint_override: Option<String>,
        api_key_override: Option<String>,
        settings: &dyn SettingsStore,
    ) -> Result<Option<Self>> {
        let endpoint = match endpoint_override.or_else(|| env::var(ENV_ENDPOINT).ok()) {
            Some(value) => Some(value),
            None => settings.load_setting(SETTING_ENDPOINT)?,
        };
        let api_key = match api_key_override.or_else(|| env::var(ENV_API_KEY).ok()) {
            Some(value) => Some(value),
            None => settings.load_setting(SETTING_API_KEY)?,
        };

        Ok(match (endpoint, api_key) {
            (Some(endpoint), Some(api_key)) => Self::new(endpoint, api_key),
            _ => None,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            Ok(())
        } else {
            Err(anyhow!(
                "The endpoint '{}' is not valid. Please ensure it includes 'http://' or 'https://'.",
                self.endpoint
            ))
        }
    }

    pub fn save(&self, settings: &dyn SettingsStore) -> Result<()> {
        self.validate()?;
        settings.save_setting(SETTING_ENDPOINT, &self.endpoint)?;
        settings.save_setting(SETTING_API_KEY, &self.api_key)?;
        Ok(())
    }
}

/// Tunables for the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub debounce_window: Duration,
    pub page_size: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

fn resolve_data_dir(data_dir_override: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = data_dir_override {
        return Ok(dir);
    }

    if let Ok(env_dir) = env::var(ENV_DATA_DIR) {
        return Ok(PathBuf::from(env_dir));
    }

    if cfg!(debug_assertions) {
        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        let dev_dir = manifest_dir.join("..").join("tmp").join("dev-trove");
        return Ok(dev_dir);
    }

    if let Some(project) = &*PROJECT_DIRS {
        return Ok(project.data_dir().to_path_buf());
    }

    if let Some(base) = BaseDirs::new() {
        return Ok(base.home_dir().join(".trove"));
    }

    Ok(env::current_dir()?.join(".trove"))
}
