//! Headless Chromium rendering over the DevTools protocol.
//!
//! The flow pages sit behind a bot challenge and build their table with
//! script, so a real browser is launched for every render. The session is
//! always closed and its child process reaped before `render` returns,
//! whatever the outcome.

use crate::core::config::ScraperConfig;
use crate::core::render::is_challenge_page;
use crate::core::{AssetClass, PageRenderer, RenderFailure, RenderOptions, RenderedDocument};
use crate::dump::FailureDump;
use crate::extract::HEADER_SCAN_ROWS;
use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chrono::Utc;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
    "--no-sandbox",
    "--disable-gpu",
];

pub struct BrowserRenderer {
    config: ScraperConfig,
    dump: Option<FailureDump>,
}

/// A launched browser plus the task pumping its CDP connection.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch(config: BrowserConfig, url: &str) -> Result<Self, RenderFailure> {
        let (browser, mut handler) =
            Browser::launch(config)
                .await
                .map_err(|e| RenderFailure::NavigationError {
                    url: url.to_string(),
                    reason: format!("browser launch failed: {e}"),
                })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler stopped: {e}");
                    break;
                }
            }
        });
        Ok(Self { browser, handler })
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {e}");
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Failed to reap browser process: {e}");
        }
        self.handler.abort();
    }
}

/// Script evaluating to true once a table headed by one of the asset class's
/// tickers has a dated data row.
fn flow_table_ready_script(asset_class: AssetClass) -> String {
    let tickers = asset_class
        .tickers()
        .iter()
        .map(|t| format!("'{t}'"))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        r#"(() => {{
    const tickers = new Set([{tickers}]);
    const dated = /\d{{1,2}} [A-Za-z]{{3}}[a-z]* \d{{4}}|\d{{4}}-\d{{2}}-\d{{2}}/;
    return Array.from(document.querySelectorAll('table')).some(table => {{
        const rows = Array.from(table.rows);
        const headed = rows.slice(0, {HEADER_SCAN_ROWS}).some(row =>
            Array.from(row.cells).some(cell =>
                tickers.has(cell.textContent.trim().toUpperCase())));
        return headed && rows.some(row => {{
            const first = row.querySelector('td');
            return first !== null && dated.test(first.textContent);
        }});
    }});
}})()"#
    )
}

impl BrowserRenderer {
    pub fn new(config: ScraperConfig) -> Self {
        Self { config, dump: None }
    }

    /// Save page source and a screenshot whenever a render fails.
    pub fn with_failure_dump(mut self, dump: FailureDump) -> Self {
        self.dump = Some(dump);
        self
    }

    fn browser_config(&self, headless: bool) -> Result<BrowserConfig, String> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .request_timeout(self.config.timeout())
            .args(LAUNCH_ARGS.iter().copied())
            .arg(format!("--user-agent={}", self.config.user_agent));
        if !headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.config.chrome_executable {
            builder = builder.chrome_executable(executable);
        }
        builder.build()
    }

    /// Navigates and waits for the flow table. Sets `challenged` whenever an
    /// interstitial is seen so a timeout can be reported as a block.
    async fn load(
        &self,
        page: &Page,
        asset_class: AssetClass,
        url: &str,
        challenged: &AtomicBool,
    ) -> Result<String, RenderFailure> {
        let nav = |e: CdpError| RenderFailure::NavigationError {
            url: url.to_string(),
            reason: e.to_string(),
        };

        page.enable_stealth_mode_with_agent(&self.config.user_agent)
            .await
            .map_err(nav)?;
        page.goto(url).await.map_err(nav)?;
        page.wait_for_navigation().await.map_err(nav)?;

        let ready_script = flow_table_ready_script(asset_class);
        loop {
            let ready = page
                .evaluate(ready_script.as_str())
                .await
                .map_err(nav)?
                .into_value::<bool>()
                .unwrap_or(false);
            if ready {
                break;
            }
            let html = page.content().await.map_err(nav)?;
            if is_challenge_page(&html) {
                challenged.store(true, Ordering::SeqCst);
                debug!("Waiting on challenge page");
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        // Some rows are only filled in once scrolled into view
        page.evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await
            .map_err(nav)?;
        tokio::time::sleep(self.config.settle()).await;
        page.evaluate("window.scrollTo(0, 0)").await.map_err(nav)?;

        let html = page.content().await.map_err(nav)?;
        if is_challenge_page(&html) {
            return Err(RenderFailure::Blocked {
                url: url.to_string(),
            });
        }
        Ok(html)
    }

    /// Captures whatever the page currently shows. Bounded, since the page
    /// may be the reason the render failed.
    async fn capture(&self, dump: &FailureDump, page: &Page, asset_class: AssetClass) {
        let captured = tokio::time::timeout(CAPTURE_TIMEOUT, async {
            let screenshot = page
                .screenshot(ScreenshotParams::builder().full_page(true).build())
                .await
                .map_err(|e| warn!("Failed to take debug screenshot: {e}"))
                .ok();
            let html = page
                .content()
                .await
                .map_err(|e| warn!("Failed to read page source: {e}"))
                .ok();
            (screenshot, html)
        })
        .await;

        match captured {
            Ok((screenshot, html)) => {
                dump.save(asset_class, Utc::now(), html.as_deref(), screenshot.as_deref())
                    .await;
            }
            Err(_) => warn!("Timed out capturing debug information"),
        }
    }
}

#[async_trait]
impl PageRenderer for BrowserRenderer {
    #[instrument(name = "BrowserRender", skip(self), fields(asset_class = %asset_class))]
    async fn render(
        &self,
        asset_class: AssetClass,
        options: RenderOptions,
    ) -> Result<RenderedDocument, RenderFailure> {
        let url = asset_class.page_url(&self.config.base_url);
        let headless = options.headless.unwrap_or(self.config.headless);
        let browser_config =
            self.browser_config(headless)
                .map_err(|reason| RenderFailure::NavigationError {
                    url: url.clone(),
                    reason,
                })?;

        debug!(headless, "Launching browser for {}", url);
        let session = BrowserSession::launch(browser_config, &url).await?;
        let challenged = AtomicBool::new(false);

        let outcome = match session.browser.new_page("about:blank").await {
            Ok(page) => {
                let loaded = tokio::time::timeout(
                    self.config.timeout() + self.config.settle(),
                    self.load(&page, asset_class, &url, &challenged),
                )
                .await;
                let failed = !matches!(loaded, Ok(Ok(_)));
                if let (true, Some(dump)) = (failed, &self.dump) {
                    self.capture(dump, &page, asset_class).await;
                }
                if let Err(e) = page.close().await {
                    debug!("Failed to close page: {e}");
                }
                loaded
            }
            Err(e) => Ok(Err(RenderFailure::NavigationError {
                url: url.clone(),
                reason: e.to_string(),
            })),
        };
        session.close().await;

        match outcome {
            Ok(Ok(html)) => {
                debug!(bytes = html.len(), "Rendered flow page");
                Ok(RenderedDocument::new(asset_class, url, html))
            }
            Ok(Err(failure)) => Err(failure),
            Err(_) if challenged.load(Ordering::SeqCst) => Err(RenderFailure::Blocked { url }),
            Err(_) => Err(RenderFailure::Timeout { url }),
        }
    }
}
