use super::{FlowStore, ticker_points};
use crate::core::{AssetClass, DailyFlowRecord, MergeCounts, StoreFailure, TickerFlowPoint};
use crate::merge;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

type History = BTreeMap<NaiveDate, DailyFlowRecord>;

/// Non-persistent flow store. `scrape --dry-run` merges into a copy of the
/// stored history held here.
#[derive(Clone, Default)]
pub struct MemoryFlowStore {
    inner: Arc<Mutex<HashMap<AssetClass, History>>>,
}

impl MemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding `records` for `asset_class`.
    pub async fn seeded(asset_class: AssetClass, records: Vec<DailyFlowRecord>) -> Self {
        let store = Self::new();
        let history: History = records.into_iter().map(|r| (r.date, r)).collect();
        store.inner.lock().await.insert(asset_class, history);
        store
    }
}

#[async_trait]
impl FlowStore for MemoryFlowStore {
    async fn merge(
        &self,
        asset_class: AssetClass,
        records: Vec<DailyFlowRecord>,
    ) -> Result<MergeCounts, StoreFailure> {
        let mut store = self.inner.lock().await;
        let history = store.entry(asset_class).or_default();

        let merge_plan = merge::plan(history, records);
        for record in merge_plan.inserts.into_iter().chain(merge_plan.updates) {
            history.insert(record.date, record);
        }
        debug!(%asset_class, counts = ?merge_plan.counts, "Merged into memory store");
        Ok(merge_plan.counts)
    }

    async fn recent(
        &self,
        asset_class: AssetClass,
        limit: usize,
    ) -> Result<Vec<DailyFlowRecord>, StoreFailure> {
        let store = self.inner.lock().await;
        Ok(store
            .get(&asset_class)
            .map(|h| h.values().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn by_date(
        &self,
        asset_class: AssetClass,
        date: NaiveDate,
    ) -> Result<Option<DailyFlowRecord>, StoreFailure> {
        let store = self.inner.lock().await;
        Ok(store.get(&asset_class).and_then(|h| h.get(&date)).cloned())
    }

    async fn ticker_history(
        &self,
        asset_class: AssetClass,
        ticker: &str,
        limit: usize,
    ) -> Result<Vec<TickerFlowPoint>, StoreFailure> {
        let store = self.inner.lock().await;
        Ok(store
            .get(&asset_class)
            .map(|h| ticker_points(h.values().rev(), ticker, limit))
            .unwrap_or_default())
    }

    async fn all(&self, asset_class: AssetClass) -> Result<Vec<DailyFlowRecord>, StoreFailure> {
        let store = self.inner.lock().await;
        Ok(store
            .get(&asset_class)
            .map(|h| h.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn latest_date(&self, asset_class: AssetClass) -> Result<Option<NaiveDate>, StoreFailure> {
        let store = self.inner.lock().await;
        Ok(store
            .get(&asset_class)
            .and_then(|h| h.keys().next_back().copied()))
    }
}
