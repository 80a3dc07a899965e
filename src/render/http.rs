use crate::core::config::ScraperConfig;
use crate::core::render::is_challenge_page;
use crate::core::{AssetClass, PageRenderer, RenderFailure, RenderOptions, RenderedDocument};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use tracing::{debug, instrument};

/// Fetches the flow page with a plain GET. Only useful where the page is
/// served pre-rendered (a mirror, a cache, or a test server).
pub struct HttpRenderer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRenderer {
    pub fn new(config: &ScraperConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .build()?;
        Ok(HttpRenderer {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

fn request_failure(url: &str, err: reqwest::Error) -> RenderFailure {
    if err.is_timeout() {
        RenderFailure::Timeout {
            url: url.to_string(),
        }
    } else {
        RenderFailure::NavigationError {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    #[instrument(name = "HttpRender", skip(self, _options), fields(asset_class = %asset_class))]
    async fn render(
        &self,
        asset_class: AssetClass,
        _options: RenderOptions,
    ) -> Result<RenderedDocument, RenderFailure> {
        let url = asset_class.page_url(&self.base_url);
        debug!("Requesting flow page from {}", url);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "text/html,application/xhtml+xml")
            .header(ACCEPT_LANGUAGE, "en-GB,en;q=0.9")
            .send()
            .await
            .map_err(|e| request_failure(&url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| request_failure(&url, e))?;

        // Challenge interstitials usually arrive as 403 or 503, sometimes 200
        if is_challenge_page(&body) {
            return Err(RenderFailure::Blocked { url });
        }
        if !status.is_success() {
            return Err(RenderFailure::NavigationError {
                url,
                reason: format!("HTTP {status}"),
            });
        }

        debug!(bytes = body.len(), "Received flow page");
        Ok(RenderedDocument::new(asset_class, url, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn renderer_for(server: &MockServer, timeout_secs: u64) -> HttpRenderer {
        let config = ScraperConfig {
            base_url: server.uri(),
            timeout_secs,
            ..Default::default()
        };
        HttpRenderer::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_renders_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<table></table>"))
            .mount(&server)
            .await;

        let document = renderer_for(&server, 5)
            .await
            .render(AssetClass::Eth, RenderOptions::default())
            .await
            .unwrap();
        assert_eq!(document.asset_class, AssetClass::Eth);
        assert_eq!(document.url, format!("{}/eth/", server.uri()));
        assert_eq!(document.html, "<table></table>");
    }

    #[tokio::test]
    async fn test_challenge_page_is_blocked() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/btc/"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_string("<title>Just a moment...</title><div id=\"cf-challenge\">"),
            )
            .mount(&server)
            .await;

        let err = renderer_for(&server, 5)
            .await
            .render(AssetClass::Btc, RenderOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderFailure::Blocked { .. }));
    }

    #[tokio::test]
    async fn test_server_error_is_navigation_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sol/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = renderer_for(&server, 5)
            .await
            .render(AssetClass::Sol, RenderOptions::default())
            .await
            .unwrap_err();
        match err {
            RenderFailure::NavigationError { reason, .. } => assert!(reason.contains("500")),
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_challenge_body_with_ok_status_is_blocked() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<div class=\"challenge-platform\">Checking</div>"),
            )
            .mount(&server)
            .await;

        let err = renderer_for(&server, 5)
            .await
            .render(AssetClass::Eth, RenderOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderFailure::Blocked { .. }));
    }

    #[tokio::test]
    async fn test_rate_limit_without_challenge_is_navigation_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/btc/"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
            .mount(&server)
            .await;

        let err = renderer_for(&server, 5)
            .await
            .render(AssetClass::Btc, RenderOptions::default())
            .await
            .unwrap_err();
        match err {
            RenderFailure::NavigationError { reason, .. } => assert!(reason.contains("429")),
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/btc/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<table></table>")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = renderer_for(&server, 1)
            .await
            .render(AssetClass::Btc, RenderOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderFailure::Timeout { .. }));
    }
}
