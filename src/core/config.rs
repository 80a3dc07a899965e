use crate::core::asset::AssetClass;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_SOURCE_URL: &str = "https://farside.co.uk";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const DATABASE_FILE: &str = "etf_flows.db";
const DEBUG_DIR: &str = "debug";

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// Headless Chromium driven over CDP.
    #[default]
    Browser,
    /// Plain HTTP fetch, for mirrors serving pre-rendered HTML.
    Http,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ScraperConfig {
    pub renderer: RendererKind,
    pub base_url: String,
    pub headless: bool,
    pub timeout_secs: u64,
    pub settle_secs: u64,
    pub user_agent: String,
    pub chrome_executable: Option<String>,
    /// Where page source and screenshots of failed attempts are saved.
    /// Defaults to `debug/` under the data directory.
    pub debug_dir: Option<String>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        ScraperConfig {
            renderer: RendererKind::Browser,
            base_url: DEFAULT_SOURCE_URL.to_string(),
            headless: true,
            timeout_secs: 60,
            settle_secs: 2,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            chrome_executable: None,
            debug_dir: None,
        }
    }
}

impl ScraperConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}

/// Fixed-delay retry policy for one acquisition attempt.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct RetrySchedule {
    /// Total attempts, including the first.
    pub max_attempts: usize,
    pub backoff_seconds: u64,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        RetrySchedule {
            max_attempts: 5,
            backoff_seconds: 5,
        }
    }
}

impl RetrySchedule {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Daily trigger times, `HH:MM` in UTC.
    pub times: Vec<String>,
    pub asset_classes: Vec<AssetClass>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            times: ["00:00", "06:00", "12:00", "18:00"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            asset_classes: vec![AssetClass::Btc],
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    pub data_path: Option<String>,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub retry: RetrySchedule,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl AppConfig {
    /// Loads the config from the default location, or built-in defaults when
    /// no config file has been set up.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config at {}, using built-in defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("uk", "etfflow", "etfflow")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("uk", "etfflow", "etfflow")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.default_data_path()?.join(DATABASE_FILE))
    }

    pub fn debug_dir(&self) -> Result<PathBuf> {
        match &self.scraper.debug_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Ok(self.default_data_path()?.join(DEBUG_DIR)),
        }
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
