use axum::body::Body;
use axum::http::{Request, StatusCode};
use etfflow::core::config::{RetrySchedule, ScraperConfig};
use etfflow::core::{AssetClass, SyncOutcome};
use etfflow::render::HttpRenderer;
use etfflow::store::{FlowStore, SqliteFlowStore};
use etfflow::synchronizer::Synchronizer;
use std::fs;
use std::sync::Arc;
use tower::ServiceExt;
use tracing::info;

mod test_utils {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub const BTC_PAGE: &str = r#"
<html><body>
<table class="etf">
  <tr><th></th><th>Blackrock</th><th>Fidelity</th><th>Grayscale</th><th></th></tr>
  <tr><th></th><th>IBIT</th><th>FBTC</th><th>GBTC</th><th>Total</th></tr>
  <tr><td>Fee</td><td>0.25%</td><td>0.25%</td><td>1.50%</td><td></td></tr>
  <tr><td>24 Dec 2025</td><td>(91.4)</td><td>-</td><td></td><td>(91.4)</td></tr>
  <tr><td>26 Dec 2025</td><td>(192.6)</td><td>(74.4)</td><td>(8.9)</td><td>(275.9)</td></tr>
  <tr><td>29 Dec 2025</td><td>-</td><td>-</td><td>-</td><td>-</td></tr>
  <tr><td>Total</td><td>(284.0)</td><td>(74.4)</td><td>(8.9)</td><td>(367.3)</td></tr>
</table>
</body></html>"#;

    pub async fn create_flows_mock_server(slug: &str, page: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{slug}/")))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .mount(&mock_server)
            .await;
        mock_server
    }
}

fn write_config(dir: &std::path::Path, base_url: &str) -> std::path::PathBuf {
    let config_path = dir.join("config.yaml");
    let config_content = format!(
        r#"
        data_path: "{}"
        scraper:
          renderer: http
          base_url: "{}"
          timeout_secs: 5
        retry:
          max_attempts: 2
          backoff_seconds: 0
    "#,
        dir.join("data").display(),
        base_url
    );
    fs::write(&config_path, config_content).expect("Failed to write config file");
    config_path
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_with_mock() {
    let mock_server = test_utils::create_flows_mock_server("btc", test_utils::BTC_PAGE).await;
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), &mock_server.uri());
    let config_path = config_path.to_str().unwrap();

    let result = etfflow::run_command(
        etfflow::AppCommand::Scrape {
            etf_type: AssetClass::Btc,
            headless: None,
            dry_run: false,
        },
        Some(config_path),
    )
    .await;
    assert!(result.is_ok(), "Scrape failed with: {:?}", result.err());

    let commands = vec![
        etfflow::AppCommand::List {
            etf_type: AssetClass::Btc,
            days: 15,
        },
        etfflow::AppCommand::Date {
            etf_type: AssetClass::Btc,
            date: chrono::NaiveDate::from_ymd_opt(2025, 12, 26).unwrap(),
        },
        etfflow::AppCommand::Ticker {
            etf_type: AssetClass::Btc,
            ticker: "ibit".to_string(),
            days: 30,
        },
        etfflow::AppCommand::Summary {
            etf_type: AssetClass::Btc,
        },
    ];
    for command in commands {
        let result = etfflow::run_command(command, Some(config_path)).await;
        assert!(result.is_ok(), "Command failed with: {:?}", result.err());
    }

    let store = SqliteFlowStore::open(dir.path().join("data").join("etf_flows.db")).unwrap();
    let stored = store.all(AssetClass::Btc).await.unwrap();
    assert_eq!(stored.len(), 2);
}

#[test_log::test(tokio::test)]
async fn test_dry_run_scrape_leaves_store_untouched() {
    let mock_server = test_utils::create_flows_mock_server("btc", test_utils::BTC_PAGE).await;
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), &mock_server.uri());

    let result = etfflow::run_command(
        etfflow::AppCommand::Scrape {
            etf_type: AssetClass::Btc,
            headless: None,
            dry_run: true,
        },
        Some(config_path.to_str().unwrap()),
    )
    .await;
    assert!(result.is_ok(), "Dry run failed with: {:?}", result.err());

    let store = SqliteFlowStore::open(dir.path().join("data").join("etf_flows.db")).unwrap();
    assert!(store.all(AssetClass::Btc).await.unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_lookup_commands_fail_without_data() {
    let mock_server = test_utils::create_flows_mock_server("btc", test_utils::BTC_PAGE).await;
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), &mock_server.uri());

    let result = etfflow::run_command(
        etfflow::AppCommand::Date {
            etf_type: AssetClass::Eth,
            date: chrono::NaiveDate::from_ymd_opt(2025, 12, 26).unwrap(),
        },
        Some(config_path.to_str().unwrap()),
    )
    .await;
    assert!(result.is_err());
}

#[test_log::test(tokio::test)]
async fn test_scrape_command_fails_when_source_unavailable() {
    let mock_server = wiremock::MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), &mock_server.uri());

    let result = etfflow::run_command(
        etfflow::AppCommand::Scrape {
            etf_type: AssetClass::Sol,
            headless: None,
            dry_run: false,
        },
        Some(config_path.to_str().unwrap()),
    )
    .await;
    assert!(result.is_err());
}

#[test_log::test(tokio::test)]
async fn test_failed_scrape_saves_page_source_for_diagnosis() {
    let page = "<html><body><div id=\"flows\">Loading</div></body></html>";
    let mock_server = test_utils::create_flows_mock_server("eth", page).await;
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), &mock_server.uri());

    let result = etfflow::run_command(
        etfflow::AppCommand::Scrape {
            etf_type: AssetClass::Eth,
            headless: Some(true),
            dry_run: false,
        },
        Some(config_path.to_str().unwrap()),
    )
    .await;
    assert!(result.is_err());

    let debug_dir = dir.path().join("data").join("debug");
    let saved: Vec<_> = fs::read_dir(&debug_dir)
        .expect("debug directory should exist")
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(saved.len(), 2, "one page source per attempt: {saved:?}");
    for path in saved {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("error_eth_") && name.ends_with(".html"));
        assert_eq!(fs::read_to_string(&path).unwrap(), page);
    }
}

#[test_log::test(tokio::test)]
async fn test_sync_then_query_over_api() {
    let mock_server = test_utils::create_flows_mock_server("btc", test_utils::BTC_PAGE).await;
    let dir = tempfile::tempdir().unwrap();

    let scraper = ScraperConfig {
        base_url: mock_server.uri(),
        timeout_secs: 5,
        ..ScraperConfig::default()
    };
    let renderer = Arc::new(HttpRenderer::new(&scraper).unwrap());
    let store = Arc::new(SqliteFlowStore::open(dir.path().join("flows.db")).unwrap());
    let synchronizer = Arc::new(Synchronizer::new(
        renderer,
        store,
        RetrySchedule {
            max_attempts: 1,
            backoff_seconds: 0,
        },
    ));

    let first = synchronizer.sync(AssetClass::Btc).await;
    info!(?first, "First sync finished");
    assert_eq!(first.outcome, SyncOutcome::Success);
    assert_eq!(first.inserted, 2);

    let second = synchronizer.sync(AssetClass::Btc).await;
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.skipped, 2);

    let app = etfflow::api::build_router(etfflow::api::AppState::new(synchronizer));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/etf/btc/date/2025-12-26")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let record: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(record["total_flow"], -275.9);
    assert_eq!(record["ticker_flows"]["IBIT"], -192.6);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/etf/btc/flows")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let flows: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
    assert_eq!(flows.len(), 2);
    assert_eq!(flows[0]["date"], "2025-12-26");
}
