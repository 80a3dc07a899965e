//! Read-only HTTP API over the stored flow history, plus a manual sync
//! trigger.

pub mod error;

use crate::core::flow::round2;
use crate::core::{AssetClass, FlowSummary, RenderOptions};
use crate::store::FlowStore;
use crate::synchronizer::Synchronizer;
use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::NaiveDate;
use error::ApiError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

const DEFAULT_FLOW_DAYS: usize = 15;
const DEFAULT_TICKER_DAYS: usize = 30;
const MAX_DAYS: usize = 365;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn FlowStore>,
    pub synchronizer: Arc<Synchronizer>,
}

impl AppState {
    pub fn new(synchronizer: Arc<Synchronizer>) -> Self {
        Self {
            store: synchronizer.store(),
            synchronizer,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/api/etf/{etf_type}/flows", get(get_flows))
        .route("/api/etf/{etf_type}/date/{date}", get(get_flow_by_date))
        .route("/api/etf/{etf_type}/ticker/{ticker}", get(get_ticker_flows))
        .route("/api/etf/{etf_type}/summary", get(get_summary))
        .route("/api/etf/{etf_type}/tickers", get(get_ticker_totals))
        .route("/api/scrape/{etf_type}", post(trigger_sync))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves until Ctrl-C.
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("API listening on http://{addr}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested, stopping API server");
        })
        .await
        .context("API server error")
}

#[derive(Debug, Deserialize)]
struct DaysQuery {
    days: Option<String>,
}

impl DaysQuery {
    fn resolve(&self, default: usize) -> Result<usize, ApiError> {
        match &self.days {
            None => Ok(default),
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(days) if (1..=MAX_DAYS).contains(&days) => Ok(days),
                _ => Err(ApiError::InvalidDays(raw.clone())),
            },
        }
    }
}

fn parse_etf_type(raw: &str) -> Result<AssetClass, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::InvalidEtfType(raw.to_string()))
}

async fn index() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "etfflow",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "flows": "GET /api/etf/{type}/flows?days=15",
            "by_date": "GET /api/etf/{type}/date/{YYYY-MM-DD}",
            "by_ticker": "GET /api/etf/{type}/ticker/{ticker}?days=30",
            "summary": "GET /api/etf/{type}/summary",
            "tickers": "GET /api/etf/{type}/tickers",
            "scrape": "POST /api/scrape/{type}?headless=true",
            "health": "GET /health"
        },
        "etf_types": AssetClass::ALL,
    }))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "etfflow",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn get_flows(
    State(state): State<AppState>,
    Path(etf_type): Path<String>,
    Query(query): Query<DaysQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let asset_class = parse_etf_type(&etf_type)?;
    let days = query.resolve(DEFAULT_FLOW_DAYS)?;
    let records = state.store.recent(asset_class, days).await?;
    Ok(Json(records))
}

async fn get_flow_by_date(
    State(state): State<AppState>,
    Path((etf_type, date)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let asset_class = parse_etf_type(&etf_type)?;
    let parsed = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| ApiError::InvalidDate(date.clone()))?;

    let record = state
        .store
        .by_date(asset_class, parsed)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No {asset_class} flow data for {parsed}")))?;
    Ok(Json(record))
}

async fn get_ticker_flows(
    State(state): State<AppState>,
    Path((etf_type, ticker)): Path<(String, String)>,
    Query(query): Query<DaysQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let asset_class = parse_etf_type(&etf_type)?;
    let days = query.resolve(DEFAULT_TICKER_DAYS)?;
    let ticker = ticker.to_uppercase();

    let points = state
        .store
        .ticker_history(asset_class, &ticker, days)
        .await?;
    if points.is_empty() {
        return Err(ApiError::NotFound(format!(
            "No flow data for ticker {ticker}"
        )));
    }
    Ok(Json(points))
}

async fn get_summary(
    State(state): State<AppState>,
    Path(etf_type): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let asset_class = parse_etf_type(&etf_type)?;
    let records = state.store.all(asset_class).await?;
    let summary = FlowSummary::from_records(asset_class, &records);
    if summary.trading_days == 0 {
        return Err(ApiError::NotFound(format!(
            "No {asset_class} flow data yet, run a scrape first"
        )));
    }
    Ok(Json(summary))
}

async fn get_ticker_totals(
    State(state): State<AppState>,
    Path(etf_type): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let asset_class = parse_etf_type(&etf_type)?;
    let records = state.store.all(asset_class).await?;
    let tickers: BTreeMap<String, f64> = FlowSummary::from_records(asset_class, &records)
        .ticker_totals
        .into_iter()
        .map(|(ticker, total)| (ticker, round2(total)))
        .collect();
    Ok(Json(serde_json::json!({
        "etf_type": asset_class,
        "tickers": tickers,
    })))
}

#[derive(Debug, Deserialize)]
struct ScrapeQuery {
    headless: Option<bool>,
}

async fn trigger_sync(
    State(state): State<AppState>,
    Path(etf_type): Path<String>,
    Query(query): Query<ScrapeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let asset_class = parse_etf_type(&etf_type)?;
    info!(%asset_class, headless = ?query.headless, "Manual sync requested");
    let options = RenderOptions {
        headless: query.headless,
    };
    let run = state.synchronizer.sync_with(asset_class, options).await;
    let status = if run.is_success() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(run)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RetrySchedule;
    use crate::core::{DailyFlowRecord, PageRenderer, RenderFailure, RenderedDocument};
    use crate::store::MemoryFlowStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    /// Always fails, reporting the options it was called with.
    struct UnreachableRenderer;

    #[async_trait]
    impl PageRenderer for UnreachableRenderer {
        async fn render(
            &self,
            asset_class: AssetClass,
            options: RenderOptions,
        ) -> Result<RenderedDocument, RenderFailure> {
            Err(RenderFailure::NavigationError {
                url: asset_class.page_url("https://farside.co.uk"),
                reason: format!("headless={:?}", options.headless),
            })
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    async fn test_app() -> Router {
        let store = Arc::new(MemoryFlowStore::new());
        store
            .merge(
                AssetClass::Btc,
                vec![
                    DailyFlowRecord::new(AssetClass::Btc, day(26), -275.9)
                        .with_ticker("IBIT", -192.6)
                        .with_ticker("FBTC", -74.4)
                        .with_ticker("GBTC", -8.9),
                    DailyFlowRecord::new(AssetClass::Btc, day(24), -91.4).with_ticker("IBIT", -91.4),
                    DailyFlowRecord::new(AssetClass::Btc, day(23), 300.0).with_ticker("IBIT", 300.0),
                ],
            )
            .await
            .unwrap();
        let synchronizer = Arc::new(Synchronizer::new(
            Arc::new(UnreachableRenderer),
            store,
            RetrySchedule {
                max_attempts: 1,
                backoff_seconds: 0,
            },
        ));
        build_router(AppState::new(synchronizer))
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_flows_most_recent_first() {
        let (status, json) = call(test_app().await, "GET", "/api/etf/btc/flows?days=2").await;
        assert_eq!(status, StatusCode::OK);
        let flows = json.as_array().unwrap();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0]["date"], "2025-12-26");
        assert_eq!(flows[0]["etf_type"], "btc");
        assert_eq!(flows[1]["date"], "2025-12-24");
    }

    #[tokio::test]
    async fn test_days_out_of_range_is_rejected() {
        for uri in [
            "/api/etf/btc/flows?days=0",
            "/api/etf/btc/flows?days=366",
            "/api/etf/btc/ticker/IBIT?days=abc",
        ] {
            let (status, json) = call(test_app().await, "GET", uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(json["success"], false);
            assert_eq!(json["error"]["code"], "INVALID_DAYS");
        }
    }

    #[tokio::test]
    async fn test_flow_by_date() {
        let (status, json) = call(test_app().await, "GET", "/api/etf/BTC/date/2025-12-26").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total_flow"], -275.9);
        assert_eq!(json["ticker_flows"]["IBIT"], -192.6);
        assert_eq!(json["ticker_flows"]["FBTC"], -74.4);
        assert_eq!(json["ticker_flows"]["GBTC"], -8.9);
        assert!(json["price_usd"].is_null());

        let (status, _) = call(test_app().await, "GET", "/api/etf/btc/date/2025-12-25").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, json) = call(test_app().await, "GET", "/api/etf/btc/date/26-12-2025").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "INVALID_DATE");
    }

    #[tokio::test]
    async fn test_ticker_history_is_case_insensitive() {
        let (status, json) = call(test_app().await, "GET", "/api/etf/btc/ticker/fbtc").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            serde_json::json!([{"date": "2025-12-26", "flow_usd": -74.4}])
        );

        let (status, _) = call(test_app().await, "GET", "/api/etf/btc/ticker/ARKB").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_summary_and_ticker_totals() {
        let (status, json) = call(test_app().await, "GET", "/api/etf/btc/summary").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["trading_days"], 3);
        assert_eq!(json["total_inflow"], 300.0);
        assert_eq!(json["total_outflow"], 367.3);
        assert_eq!(json["start_date"], "2025-12-23");
        assert_eq!(json["end_date"], "2025-12-26");

        let (status, json) = call(test_app().await, "GET", "/api/etf/btc/tickers").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["tickers"]["IBIT"], 16.0);

        let (status, _) = call(test_app().await, "GET", "/api/etf/eth/summary").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_etf_type() {
        let (status, json) = call(test_app().await, "GET", "/api/etf/doge/flows").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "INVALID_ETF_TYPE");
    }

    #[tokio::test]
    async fn test_failed_manual_sync_returns_bad_gateway() {
        let (status, json) = call(test_app().await, "POST", "/api/scrape/eth").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["outcome"], "failure");
        assert_eq!(json["attempts"], 1);
        assert!(json["error"].as_str().unwrap().contains("headless=None"));
    }

    #[tokio::test]
    async fn test_manual_sync_passes_headless_override() {
        let (status, json) =
            call(test_app().await, "POST", "/api/scrape/btc?headless=false").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(json["error"].as_str().unwrap().contains("headless=Some(false)"));
    }

    #[tokio::test]
    async fn test_health() {
        let (status, json) = call(test_app().await, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
    }
}
