//! Runs sync cycles at fixed times of day.

use crate::core::{AssetClass, SyncRun};
use crate::synchronizer::Synchronizer;
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// A daily trigger parsed from an `HH:MM` UTC time.
#[derive(Debug, Clone)]
pub struct DailyTrigger {
    pub time: String,
    schedule: Schedule,
}

impl DailyTrigger {
    pub fn parse(time: &str) -> Result<Self> {
        let (hour, minute) = time
            .trim()
            .split_once(':')
            .with_context(|| format!("Invalid trigger time '{time}', expected HH:MM"))?;
        let hour: u32 = hour
            .parse()
            .with_context(|| format!("Invalid hour in trigger time '{time}'"))?;
        let minute: u32 = minute
            .parse()
            .with_context(|| format!("Invalid minute in trigger time '{time}'"))?;
        if hour > 23 || minute > 59 {
            bail!("Trigger time '{time}' is out of range");
        }

        let expression = format!("0 {minute} {hour} * * *");
        let schedule = Schedule::from_str(&expression)
            .with_context(|| format!("Invalid cron expression: {expression}"))?;
        Ok(Self {
            time: format!("{hour:02}:{minute:02}"),
            schedule,
        })
    }

    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

pub struct FlowScheduler {
    synchronizer: Arc<Synchronizer>,
    asset_classes: Vec<AssetClass>,
    triggers: Vec<DailyTrigger>,
}

impl FlowScheduler {
    pub fn new(
        synchronizer: Arc<Synchronizer>,
        asset_classes: Vec<AssetClass>,
        times: &[String],
    ) -> Result<Self> {
        if asset_classes.is_empty() {
            bail!("No asset classes configured for the scheduler");
        }
        if times.is_empty() {
            bail!("No trigger times configured for the scheduler");
        }
        let triggers = times
            .iter()
            .map(|t| DailyTrigger::parse(t))
            .collect::<Result<Vec<_>>>()?;

        info!(
            times = ?triggers.iter().map(|t| t.time.as_str()).collect::<Vec<_>>(),
            asset_classes = ?asset_classes,
            "Scheduler configured"
        );
        Ok(Self {
            synchronizer,
            asset_classes,
            triggers,
        })
    }

    /// Earliest trigger strictly after `after`.
    pub fn next_trigger(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.triggers.iter().filter_map(|t| t.next_after(after)).min()
    }

    /// Syncs each asset class in turn. A failure is logged and the next asset
    /// class still runs.
    pub async fn run_cycle(&self) -> Vec<SyncRun> {
        info!("Starting sync cycle");
        let mut runs = Vec::with_capacity(self.asset_classes.len());
        for asset_class in &self.asset_classes {
            let run = self.synchronizer.sync(*asset_class).await;
            if !run.is_success() {
                warn!(%asset_class, "Sync failed, continuing with next asset class");
            }
            runs.push(run);
        }
        let failed = runs.iter().filter(|r| !r.is_success()).count();
        info!(total = runs.len(), failed, "Sync cycle finished");
        runs
    }

    /// Runs until Ctrl-C.
    pub async fn run(&self, run_immediately: bool) -> Result<()> {
        self.run_until(run_immediately, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Waits for triggers until `shutdown` resolves. Shutdown is honored
    /// between cycles; a running cycle is allowed to finish.
    pub async fn run_until(
        &self,
        run_immediately: bool,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        tokio::pin!(shutdown);

        if run_immediately {
            self.run_cycle().await;
        }

        loop {
            let now = Utc::now();
            let next = self
                .next_trigger(now)
                .context("No upcoming trigger time")?;
            let wait = (next - now).to_std().unwrap_or_default();
            info!(next = %next.format("%Y-%m-%d %H:%M UTC"), "Waiting for next sync cycle");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.run_cycle().await;
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping scheduler");
                    break;
                }
            }
        }
        Ok(())
    }
}
