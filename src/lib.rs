pub mod api;
pub mod cli;
pub mod core;
pub mod dump;
pub mod extract;
pub mod merge;
pub mod render;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod synchronizer;

pub use crate::core::config;

use crate::core::{AssetClass, RenderOptions};
use crate::dump::FailureDump;
use crate::store::{FlowStore, MemoryFlowStore, SqliteFlowStore};
use crate::synchronizer::Synchronizer;
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub enum AppCommand {
    Scrape {
        etf_type: AssetClass,
        /// Overrides `scraper.headless` for this run.
        headless: Option<bool>,
        /// Report what would change without writing to the store.
        dry_run: bool,
    },
    List {
        etf_type: AssetClass,
        days: usize,
    },
    Date {
        etf_type: AssetClass,
        date: NaiveDate,
    },
    Ticker {
        etf_type: AssetClass,
        ticker: String,
        days: usize,
    },
    Summary {
        etf_type: AssetClass,
    },
    Serve {
        host: Option<String>,
        port: Option<u16>,
    },
    Scheduler {
        etf_types: Vec<AssetClass>,
        now: bool,
    },
}

pub fn load_config(config_path: Option<&str>) -> Result<config::AppConfig> {
    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    Ok(config)
}

fn open_store(config: &config::AppConfig) -> Result<Arc<dyn FlowStore>> {
    let path = config.database_path()?;
    let store = SqliteFlowStore::open(&path)
        .with_context(|| format!("Flow store unavailable at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn build_synchronizer(
    config: &config::AppConfig,
    store: Arc<dyn FlowStore>,
) -> Result<Arc<Synchronizer>> {
    let dump = FailureDump::new(config.debug_dir()?);
    let renderer = render::build_renderer(&config.scraper, Some(dump.clone()))?;
    Ok(Arc::new(
        Synchronizer::new(renderer, store, config.retry).with_failure_dump(dump),
    ))
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;

    match command {
        AppCommand::Scrape {
            etf_type,
            headless,
            dry_run,
        } => {
            let store: Arc<dyn FlowStore> = if dry_run {
                let existing = store.all(etf_type).await?;
                info!(existing = existing.len(), "Dry run, the flow store will not be modified");
                Arc::new(MemoryFlowStore::seeded(etf_type, existing).await)
            } else {
                store
            };
            let synchronizer = build_synchronizer(&config, store)?;
            let spinner = cli::ui::new_spinner(format!(
                "Scraping {} flows from {}",
                etf_type.slug().to_uppercase(),
                etf_type.page_url(&config.scraper.base_url)
            ));
            let run = synchronizer
                .sync_with(etf_type, RenderOptions { headless })
                .await;
            spinner.finish_and_clear();

            println!("{}", run.display_as_report());
            if dry_run {
                println!("Dry run, nothing was written");
            }
            if !run.is_success() {
                bail!(
                    "Scrape of {etf_type} failed: {}",
                    run.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        AppCommand::List { etf_type, days } => {
            let records = store.recent(etf_type, days).await?;
            if records.is_empty() {
                warn!("No {etf_type} flow data stored yet, run `etfflow scrape {etf_type}` first");
            } else {
                println!("{}", cli::flows::flows_table(etf_type, &records));
            }
        }
        AppCommand::Date { etf_type, date } => {
            let record = store
                .by_date(etf_type, date)
                .await?
                .with_context(|| format!("No {etf_type} flow data for {date}"))?;
            println!("{}", cli::flows::record_detail(&record));
        }
        AppCommand::Ticker {
            etf_type,
            ticker,
            days,
        } => {
            let ticker = ticker.to_uppercase();
            let points = store.ticker_history(etf_type, &ticker, days).await?;
            if points.is_empty() {
                bail!("No flow data for ticker {ticker}");
            }
            println!("{}", cli::flows::ticker_table(&ticker, &points));
        }
        AppCommand::Summary { etf_type } => {
            let records = store.all(etf_type).await?;
            let summary = crate::core::FlowSummary::from_records(etf_type, &records);
            if summary.trading_days == 0 {
                bail!("No {etf_type} flow data stored yet, run `etfflow scrape {etf_type}` first");
            }
            println!("{}", summary.display_as_report());
        }
        AppCommand::Serve { host, port } => {
            let synchronizer = build_synchronizer(&config, store)?;
            let host = host.unwrap_or_else(|| config.api.host.clone());
            let port = port.unwrap_or(config.api.port);
            api::serve(api::AppState::new(synchronizer), &host, port).await?;
        }
        AppCommand::Scheduler { etf_types, now } => {
            let synchronizer = build_synchronizer(&config, store)?;
            let asset_classes = if etf_types.is_empty() {
                config.scheduler.asset_classes.clone()
            } else {
                etf_types
            };
            let flow_scheduler = scheduler::FlowScheduler::new(
                synchronizer,
                asset_classes,
                &config.scheduler.times,
            )?;
            flow_scheduler.run(now).await?;
        }
    }
    Ok(())
}
