//! Page rendering abstractions

use crate::core::asset::AssetClass;
use crate::core::error::RenderFailure;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A fully rendered page, ready for extraction.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub asset_class: AssetClass,
    pub url: String,
    pub html: String,
    pub fetched_at: DateTime<Utc>,
}

impl RenderedDocument {
    pub fn new(asset_class: AssetClass, url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            asset_class,
            url: url.into(),
            html: html.into(),
            fetched_at: Utc::now(),
        }
    }
}

/// Per-call overrides of the configured rendering behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Show or hide the browser window for this call only. Renderers
    /// without a window ignore it.
    pub headless: Option<bool>,
}

/// Navigates to an asset class's flow page and returns it once its data table
/// has rendered.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(
        &self,
        asset_class: AssetClass,
        options: RenderOptions,
    ) -> Result<RenderedDocument, RenderFailure>;
}

const CHALLENGE_MARKERS: &[&str] = &[
    "just a moment...",
    "cf-challenge",
    "challenge-platform",
    "attention required!",
    "cf-browser-verification",
    "checking your browser before accessing",
    "enable javascript and cookies to continue",
];

/// Whether the HTML is an anti-bot interstitial rather than the page itself.
pub fn is_challenge_page(html: &str) -> bool {
    let lower = html.to_lowercase();
    CHALLENGE_MARKERS.iter().any(|m| lower.contains(m))
}
