//! Acquisition cycle outcomes

use crate::core::asset::AssetClass;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What a merge did to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeCounts {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl MergeCounts {
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    Success,
    /// Merged, but the extractor had to drop some rows.
    Partial,
    Failure,
}

/// Record of one acquisition cycle for one asset class.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRun {
    pub asset_class: AssetClass,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: SyncOutcome,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub rejected_rows: usize,
    pub attempts: usize,
    pub error: Option<String>,
}

impl SyncRun {
    pub fn start(asset_class: AssetClass) -> Self {
        Self {
            asset_class,
            started_at: Utc::now(),
            finished_at: None,
            outcome: SyncOutcome::Failure,
            inserted: 0,
            updated: 0,
            skipped: 0,
            rejected_rows: 0,
            attempts: 0,
            error: None,
        }
    }

    pub fn succeed(mut self, counts: MergeCounts, rejected_rows: usize) -> Self {
        self.inserted = counts.inserted;
        self.updated = counts.updated;
        self.skipped = counts.skipped;
        self.rejected_rows = rejected_rows;
        self.outcome = if rejected_rows > 0 {
            SyncOutcome::Partial
        } else {
            SyncOutcome::Success
        };
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn fail(mut self, error: impl ToString) -> Self {
        self.outcome = SyncOutcome::Failure;
        self.error = Some(error.to_string());
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn counts(&self) -> MergeCounts {
        MergeCounts {
            inserted: self.inserted,
            updated: self.updated,
            skipped: self.skipped,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome != SyncOutcome::Failure
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
    }

    pub fn log_summary(&self) {
        match self.outcome {
            SyncOutcome::Failure => tracing::error!(
                asset_class = %self.asset_class,
                attempts = self.attempts,
                error = self.error.as_deref().unwrap_or("unknown"),
                elapsed_secs = self.elapsed_secs(),
                "Sync failed"
            ),
            _ => tracing::info!(
                asset_class = %self.asset_class,
                outcome = ?self.outcome,
                inserted = self.inserted,
                updated = self.updated,
                skipped = self.skipped,
                rejected_rows = self.rejected_rows,
                attempts = self.attempts,
                elapsed_secs = self.elapsed_secs(),
                "Sync finished"
            ),
        }
    }
}
