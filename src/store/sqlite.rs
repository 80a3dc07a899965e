//! SQLite-backed flow history.
//!
//! One row per `(asset_class, date)`; per-ticker flows are kept as a JSON
//! object so that funds launching or closing never need a schema change.
//! Merges run inside a `BEGIN IMMEDIATE` transaction, which takes the
//! database write lock before the existing rows are read. Separate processes
//! sharing the file (scheduler and API server) therefore serialize on it, and
//! the busy timeout absorbs the wait.
//!
//! A row that cannot be decoded is skipped by list queries and reported by
//! `by_date`. A merge that brings a valid record for its date overwrites it.

use super::{FlowStore, ticker_points};
use crate::core::{AssetClass, DailyFlowRecord, MergeCounts, StoreFailure, TickerFlowPoint};
use crate::merge;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS etf_daily_flows (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    asset_class TEXT NOT NULL,
    date TEXT NOT NULL,
    total_flow REAL NOT NULL,
    ticker_flows TEXT NOT NULL DEFAULT '{}',
    price_usd REAL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(asset_class, date)
);

CREATE INDEX IF NOT EXISTS idx_etf_daily_flows_asset_date
ON etf_daily_flows(asset_class, date DESC);
"#;

const SELECT_COLUMNS: &str = "SELECT date, total_flow, ticker_flows, price_usd FROM etf_daily_flows";

/// Columns as stored, before validation.
struct StoredRow {
    date: String,
    total_flow: f64,
    ticker_flows: String,
    price_usd: Option<f64>,
}

impl StoredRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            date: row.get(0)?,
            total_flow: row.get(1)?,
            ticker_flows: row.get(2)?,
            price_usd: row.get(3)?,
        })
    }

    fn into_record(self, asset_class: AssetClass) -> Result<DailyFlowRecord, StoreFailure> {
        let corrupt = |reason: String| StoreFailure::Corrupt {
            asset_class: asset_class.to_string(),
            date: self.date.clone(),
            reason,
        };
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .map_err(|e| corrupt(format!("bad date: {e}")))?;
        let ticker_flows: BTreeMap<String, f64> = serde_json::from_str(&self.ticker_flows)
            .map_err(|e| corrupt(format!("bad ticker_flows: {e}")))?;

        let record = DailyFlowRecord {
            asset_class,
            date,
            total_flow: self.total_flow,
            price: self.price_usd,
            ticker_flows,
        };
        if !record.is_finite() {
            return Err(corrupt("non-finite figure".to_string()));
        }
        Ok(record)
    }
}

pub struct SqliteFlowStore {
    // Connection is Send but not Sync
    conn: Arc<Mutex<Connection>>,
}

impl SqliteFlowStore {
    /// Opens (creating if needed) the database file and its schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreFailure> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| StoreFailure::Open {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StoreFailure::CreateDir {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }

        let conn = Connection::open(&path).map_err(open_err)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(open_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(open_err)?;
        conn.execute_batch(CREATE_TABLES_SQL).map_err(open_err)?;

        info!(db_path = %path.display(), "Opened flow store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn collect_records(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
        asset_class: AssetClass,
    ) -> Result<Vec<DailyFlowRecord>, StoreFailure> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, StoredRow::from_row)?;
        let mut records = Vec::new();
        for row in rows {
            match row?.into_record(asset_class) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable stored row: {e}"),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl FlowStore for SqliteFlowStore {
    async fn merge(
        &self,
        asset_class: AssetClass,
        records: Vec<DailyFlowRecord>,
    ) -> Result<MergeCounts, StoreFailure> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut existing = BTreeMap::new();
        let mut unreadable = BTreeSet::new();
        {
            let mut stmt = tx.prepare(&format!(
                "{SELECT_COLUMNS} WHERE asset_class = ?1 AND date = ?2"
            ))?;
            for record in &records {
                let stored = stmt
                    .query_row(
                        params![asset_class.slug(), record.date.to_string()],
                        StoredRow::from_row,
                    )
                    .optional()?;
                match stored.map(|row| row.into_record(asset_class)) {
                    Some(Ok(stored)) => {
                        existing.insert(record.date, stored);
                    }
                    Some(Err(e)) => {
                        warn!("Overwriting unreadable stored row: {e}");
                        unreadable.insert(record.date);
                    }
                    None => {}
                }
            }
        }

        let mut merge_plan = merge::plan(&existing, records);
        // An unreadable row still occupies its date, so it is replaced in place
        let (repairs, inserts): (Vec<_>, Vec<_>) = merge_plan
            .inserts
            .into_iter()
            .partition(|r| unreadable.contains(&r.date));
        merge_plan.counts.inserted -= repairs.len();
        merge_plan.counts.updated += repairs.len();
        merge_plan.inserts = inserts;
        merge_plan.updates.extend(repairs);

        if merge_plan.is_empty() {
            tx.commit()?;
            debug!(%asset_class, skipped = merge_plan.counts.skipped, "Flow store already up to date");
            return Ok(merge_plan.counts);
        }
        let now = Utc::now().to_rfc3339();

        for record in &merge_plan.inserts {
            tx.execute(
                r#"
                INSERT INTO etf_daily_flows
                (asset_class, date, total_flow, ticker_flows, price_usd, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                "#,
                params![
                    asset_class.slug(),
                    record.date.to_string(),
                    record.total_flow,
                    serde_json::to_string(&record.ticker_flows)?,
                    record.price,
                    now,
                ],
            )?;
        }
        for record in &merge_plan.updates {
            tx.execute(
                r#"
                UPDATE etf_daily_flows
                SET total_flow = ?3, ticker_flows = ?4, price_usd = ?5, updated_at = ?6
                WHERE asset_class = ?1 AND date = ?2
                "#,
                params![
                    asset_class.slug(),
                    record.date.to_string(),
                    record.total_flow,
                    serde_json::to_string(&record.ticker_flows)?,
                    record.price,
                    now,
                ],
            )?;
        }
        tx.commit()?;

        debug!(
            %asset_class,
            written = merge_plan.counts.written(),
            counts = ?merge_plan.counts,
            "Merged into flow store"
        );
        Ok(merge_plan.counts)
    }

    async fn recent(
        &self,
        asset_class: AssetClass,
        limit: usize,
    ) -> Result<Vec<DailyFlowRecord>, StoreFailure> {
        let conn = self.conn.lock().await;
        Self::collect_records(
            &conn,
            &format!("{SELECT_COLUMNS} WHERE asset_class = ?1 ORDER BY date DESC LIMIT ?2"),
            params![asset_class.slug(), limit as i64],
            asset_class,
        )
    }

    async fn by_date(
        &self,
        asset_class: AssetClass,
        date: NaiveDate,
    ) -> Result<Option<DailyFlowRecord>, StoreFailure> {
        let conn = self.conn.lock().await;
        let stored = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE asset_class = ?1 AND date = ?2"),
                params![asset_class.slug(), date.to_string()],
                StoredRow::from_row,
            )
            .optional()?;
        stored.map(|row| row.into_record(asset_class)).transpose()
    }

    async fn ticker_history(
        &self,
        asset_class: AssetClass,
        ticker: &str,
        limit: usize,
    ) -> Result<Vec<TickerFlowPoint>, StoreFailure> {
        let conn = self.conn.lock().await;
        let records = Self::collect_records(
            &conn,
            &format!("{SELECT_COLUMNS} WHERE asset_class = ?1 ORDER BY date DESC"),
            params![asset_class.slug()],
            asset_class,
        )?;
        Ok(ticker_points(&records, ticker, limit))
    }

    async fn all(&self, asset_class: AssetClass) -> Result<Vec<DailyFlowRecord>, StoreFailure> {
        let conn = self.conn.lock().await;
        Self::collect_records(
            &conn,
            &format!("{SELECT_COLUMNS} WHERE asset_class = ?1 ORDER BY date ASC"),
            params![asset_class.slug()],
            asset_class,
        )
    }

    async fn latest_date(&self, asset_class: AssetClass) -> Result<Option<NaiveDate>, StoreFailure> {
        let conn = self.conn.lock().await;
        let latest: Option<String> = conn.query_row(
            "SELECT MAX(date) FROM etf_daily_flows WHERE asset_class = ?1",
            params![asset_class.slug()],
            |row| row.get(0),
        )?;
        latest
            .map(|date| {
                NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| StoreFailure::Corrupt {
                    asset_class: asset_class.to_string(),
                    date,
                    reason: e.to_string(),
                })
            })
            .transpose()
    }
}
