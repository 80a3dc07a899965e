pub mod memory;
pub mod sqlite;

use crate::core::{AssetClass, DailyFlowRecord, MergeCounts, StoreFailure, TickerFlowPoint};
use async_trait::async_trait;
use chrono::NaiveDate;

pub use memory::MemoryFlowStore;
pub use sqlite::SqliteFlowStore;

/// Durable per-asset-class history of daily flows, keyed by date.
///
/// `merge` is the only write path. It reads what is stored for the incoming
/// dates and applies the insert/skip/overwrite decision atomically, so two
/// merges for the same asset class never interleave their read and write.
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn merge(
        &self,
        asset_class: AssetClass,
        records: Vec<DailyFlowRecord>,
    ) -> Result<MergeCounts, StoreFailure>;

    /// The `limit` most recent records, newest first.
    async fn recent(
        &self,
        asset_class: AssetClass,
        limit: usize,
    ) -> Result<Vec<DailyFlowRecord>, StoreFailure>;

    async fn by_date(
        &self,
        asset_class: AssetClass,
        date: NaiveDate,
    ) -> Result<Option<DailyFlowRecord>, StoreFailure>;

    /// The `limit` most recent days on which `ticker` reported a flow, newest
    /// first.
    async fn ticker_history(
        &self,
        asset_class: AssetClass,
        ticker: &str,
        limit: usize,
    ) -> Result<Vec<TickerFlowPoint>, StoreFailure>;

    /// Full history, oldest first.
    async fn all(&self, asset_class: AssetClass) -> Result<Vec<DailyFlowRecord>, StoreFailure>;

    async fn latest_date(&self, asset_class: AssetClass) -> Result<Option<NaiveDate>, StoreFailure>;
}

/// Picks `ticker`'s flows out of records already ordered newest first.
pub(crate) fn ticker_points<'a>(
    records: impl IntoIterator<Item = &'a DailyFlowRecord>,
    ticker: &str,
    limit: usize,
) -> Vec<TickerFlowPoint> {
    records
        .into_iter()
        .filter_map(|record| {
            record.ticker_flow(ticker).map(|flow_usd| TickerFlowPoint {
                date: record.date,
                flow_usd,
            })
        })
        .take(limit)
        .collect()
}
