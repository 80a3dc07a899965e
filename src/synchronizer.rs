use crate::core::config::RetrySchedule;
use crate::core::{AcquireError, AssetClass, PageRenderer, RenderOptions, SyncRun};
use crate::dump::FailureDump;
use crate::extract::TableExtractor;
use crate::retry::RetryController;
use crate::store::FlowStore;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Runs acquisition cycles: render, extract, merge.
///
/// Cycles for the same asset class are serialized for their whole duration,
/// so a manual trigger and a scheduled cycle never merge concurrently.
/// Different asset classes do not block each other.
pub struct Synchronizer {
    renderer: Arc<dyn PageRenderer>,
    store: Arc<dyn FlowStore>,
    retry: RetryController,
    dump: Option<FailureDump>,
    locks: [Mutex<()>; 3],
}

impl Synchronizer {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        store: Arc<dyn FlowStore>,
        retry: RetrySchedule,
    ) -> Self {
        Self {
            renderer,
            store,
            retry: RetryController::new(retry),
            dump: None,
            locks: Default::default(),
        }
    }

    /// Save the page source whenever a rendered page yields no flow table.
    pub fn with_failure_dump(mut self, dump: FailureDump) -> Self {
        self.dump = Some(dump);
        self
    }

    pub fn store(&self) -> Arc<dyn FlowStore> {
        Arc::clone(&self.store)
    }

    fn lock_for(&self, asset_class: AssetClass) -> &Mutex<()> {
        match asset_class {
            AssetClass::Btc => &self.locks[0],
            AssetClass::Eth => &self.locks[1],
            AssetClass::Sol => &self.locks[2],
        }
    }

    pub async fn sync(&self, asset_class: AssetClass) -> SyncRun {
        self.sync_with(asset_class, RenderOptions::default()).await
    }

    /// Runs one full cycle. Failures are reported in the returned run rather
    /// than as an error so callers can always record and display it.
    pub async fn sync_with(&self, asset_class: AssetClass, options: RenderOptions) -> SyncRun {
        let _guard = self.lock_for(asset_class).lock().await;
        let mut run = SyncRun::start(asset_class);
        match self.store.latest_date(asset_class).await {
            Ok(Some(latest)) => info!(%asset_class, %latest, "Starting sync"),
            Ok(None) => info!(%asset_class, "Starting sync, no data stored yet"),
            Err(e) => warn!(%asset_class, "Starting sync, latest stored date unavailable: {e}"),
        }

        let renderer = &self.renderer;
        let extractor = &TableExtractor::new(asset_class);
        let dump = self.dump.as_ref();
        let acquired = self
            .retry
            .run(move || async move {
                let document = renderer.render(asset_class, options).await?;
                match extractor.extract(&document) {
                    Ok(extraction) => Ok(extraction),
                    Err(failure) => {
                        if let Some(dump) = dump {
                            dump.save(asset_class, document.fetched_at, Some(&document.html), None)
                                .await;
                        }
                        Err(AcquireError::from(failure))
                    }
                }
            })
            .await;

        let (extraction, attempts) = match acquired {
            Ok(acquired) => acquired,
            Err(exhausted) => {
                run.attempts = exhausted.attempts;
                let run = run.fail(exhausted.last);
                run.log_summary();
                return run;
            }
        };
        run.attempts = attempts;

        let run = match self.store.merge(asset_class, extraction.records).await {
            Ok(counts) => run.succeed(counts, extraction.rejected_rows),
            Err(e) => run.fail(format!("Store error: {e}")),
        };
        run.log_summary();
        run
    }
}
