pub mod browser;
pub mod http;

use crate::core::PageRenderer;
use crate::core::config::{RendererKind, ScraperConfig};
use crate::dump::FailureDump;
use anyhow::{Context, Result};
use std::sync::Arc;

pub use browser::BrowserRenderer;
pub use http::HttpRenderer;

/// Builds the configured renderer. Only the browser can capture screenshots,
/// so `dump` is used by it alone.
pub fn build_renderer(
    config: &ScraperConfig,
    dump: Option<FailureDump>,
) -> Result<Arc<dyn PageRenderer>> {
    match config.renderer {
        RendererKind::Browser => {
            let mut renderer = BrowserRenderer::new(config.clone());
            if let Some(dump) = dump {
                renderer = renderer.with_failure_dump(dump);
            }
            Ok(Arc::new(renderer))
        }
        RendererKind::Http => {
            let renderer = HttpRenderer::new(config).context("Failed to build HTTP client")?;
            Ok(Arc::new(renderer))
        }
    }
}
