//! Saves what the browser saw when an acquisition attempt failed, so a
//! layout change can be diagnosed after the fact.

use crate::core::AssetClass;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct FailureDump {
    dir: PathBuf,
}

impl FailureDump {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_path(&self, asset_class: AssetClass, at: DateTime<Utc>, extension: &str) -> PathBuf {
        self.dir.join(format!(
            "error_{}_{}.{extension}",
            asset_class.slug(),
            at.format("%Y%m%dT%H%M%S%.9f")
        ))
    }

    /// Writes the page source and, when available, a screenshot. Failures to
    /// write are logged and otherwise ignored. Returns the files written.
    pub async fn save(
        &self,
        asset_class: AssetClass,
        at: DateTime<Utc>,
        html: Option<&str>,
        screenshot: Option<&[u8]>,
    ) -> Vec<PathBuf> {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            error!("Failed to create debug directory {}: {e}", self.dir.display());
            return Vec::new();
        }

        let mut written = Vec::new();
        if let Some(bytes) = screenshot {
            let path = self.file_path(asset_class, at, "png");
            match tokio::fs::write(&path, bytes).await {
                Ok(()) => {
                    info!("Saved debug screenshot: {}", path.display());
                    written.push(path);
                }
                Err(e) => error!("Failed to save debug screenshot: {e}"),
            }
        }
        if let Some(html) = html {
            let path = self.file_path(asset_class, at, "html");
            match tokio::fs::write(&path, html).await {
                Ok(()) => {
                    info!("Saved debug page source: {}", path.display());
                    written.push(path);
                }
                Err(e) => error!("Failed to save debug page source: {e}"),
            }
        }
        written
    }
}
