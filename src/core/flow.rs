//! Daily flow records and the aggregates computed over them

use crate::core::asset::AssetClass;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// One trading day of flows for one asset class. Values are millions of USD,
/// positive for inflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyFlowRecord {
    #[serde(rename = "etf_type")]
    pub asset_class: AssetClass,
    pub date: NaiveDate,
    pub total_flow: f64,
    #[serde(rename = "price_usd")]
    pub price: Option<f64>,
    /// Tickers without data for the day are absent rather than zero.
    pub ticker_flows: BTreeMap<String, f64>,
}

impl DailyFlowRecord {
    pub fn new(asset_class: AssetClass, date: NaiveDate, total_flow: f64) -> Self {
        Self {
            asset_class,
            date,
            total_flow,
            price: None,
            ticker_flows: BTreeMap::new(),
        }
    }

    pub fn with_ticker(mut self, ticker: &str, flow: f64) -> Self {
        self.ticker_flows.insert(ticker.to_uppercase(), flow);
        self
    }

    pub fn ticker_flow(&self, ticker: &str) -> Option<f64> {
        self.ticker_flows.get(&ticker.to_uppercase()).copied()
    }

    /// Whether every figure is a real number. Storage cannot represent
    /// NaN or infinity.
    pub fn is_finite(&self) -> bool {
        self.total_flow.is_finite()
            && self.price.is_none_or(f64::is_finite)
            && self.ticker_flows.values().all(|v| v.is_finite())
    }

    /// Exact comparison of the figures the source reports. Price is not part
    /// of it.
    pub fn same_figures(&self, other: &DailyFlowRecord) -> bool {
        self.total_flow == other.total_flow && self.ticker_flows == other.ticker_flows
    }
}

/// A single ticker's flow on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerFlowPoint {
    pub date: NaiveDate,
    pub flow_usd: f64,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn serialize_rounded<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round2(*value))
}

fn serialize_rounded_map<S: Serializer>(
    map: &BTreeMap<String, f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeMap;
    let mut out = serializer.serialize_map(Some(map.len()))?;
    for (ticker, total) in map {
        out.serialize_entry(ticker, &round2(*total))?;
    }
    out.end()
}

/// Aggregate statistics over the full stored history of one asset class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowSummary {
    pub etf_type: AssetClass,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(serialize_with = "serialize_rounded")]
    pub total_inflow: f64,
    #[serde(serialize_with = "serialize_rounded")]
    pub total_outflow: f64,
    #[serde(serialize_with = "serialize_rounded")]
    pub net_flow: f64,
    #[serde(serialize_with = "serialize_rounded")]
    pub avg_daily_flow: f64,
    pub trading_days: usize,
    #[serde(serialize_with = "serialize_rounded_map")]
    pub ticker_totals: BTreeMap<String, f64>,
}

impl FlowSummary {
    pub fn from_records(asset_class: AssetClass, records: &[DailyFlowRecord]) -> Self {
        let mut total_inflow = 0.0;
        let mut total_outflow = 0.0;
        let mut ticker_totals: BTreeMap<String, f64> = BTreeMap::new();

        for record in records {
            if record.total_flow > 0.0 {
                total_inflow += record.total_flow;
            } else {
                total_outflow += record.total_flow.abs();
            }
            for (ticker, flow) in &record.ticker_flows {
                *ticker_totals.entry(ticker.clone()).or_insert(0.0) += flow;
            }
        }

        let trading_days = records.len();
        let net_flow = total_inflow - total_outflow;
        let avg_daily_flow = if trading_days > 0 {
            net_flow / trading_days as f64
        } else {
            0.0
        };

        FlowSummary {
            etf_type: asset_class,
            start_date: records.iter().map(|r| r.date).min(),
            end_date: records.iter().map(|r| r.date).max(),
            total_inflow,
            total_outflow,
            net_flow,
            avg_daily_flow,
            trading_days,
            ticker_totals,
        }
    }

    /// Tickers ordered by cumulative flow, largest first.
    pub fn ranked_tickers(&self) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .ticker_totals
            .iter()
            .map(|(t, v)| (t.as_str(), *v))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}
