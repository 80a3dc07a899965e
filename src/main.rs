use anyhow::Result;
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use etfflow::core::AssetClass;
use etfflow::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Scrape the latest flows for one ETF type and merge them into the store
    Scrape {
        #[arg(value_enum, ignore_case = true)]
        etf_type: AssetClass,
        /// Run the browser without a window (overrides the config)
        #[arg(long, overrides_with = "no_headless")]
        headless: bool,
        /// Show the browser window (overrides the config)
        #[arg(long, overrides_with = "headless")]
        no_headless: bool,
        /// Report inserts and updates without writing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the most recent daily flows
    List {
        #[arg(value_enum, ignore_case = true)]
        etf_type: AssetClass,
        /// Number of most recent trading days
        #[arg(short, long, default_value_t = 15, value_parser = clap::value_parser!(u16).range(1..=365))]
        days: u16,
    },
    /// Show per-ticker flows for a single date (YYYY-MM-DD)
    Date {
        #[arg(value_enum, ignore_case = true)]
        etf_type: AssetClass,
        date: NaiveDate,
    },
    /// Show the flow history of one ticker
    Ticker {
        #[arg(value_enum, ignore_case = true)]
        etf_type: AssetClass,
        ticker: String,
        /// Number of most recent trading days
        #[arg(short, long, default_value_t = 30, value_parser = clap::value_parser!(u16).range(1..=365))]
        days: u16,
    },
    /// Show aggregate statistics over the stored history
    Summary {
        #[arg(value_enum, ignore_case = true)]
        etf_type: AssetClass,
    },
    /// Serve the read API over HTTP
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run sync cycles at the configured times until interrupted
    Scheduler {
        /// ETF types to sync each cycle (repeatable); defaults to the configured list
        #[arg(short, long = "etf", value_enum, ignore_case = true)]
        etf: Vec<AssetClass>,
        /// Sync every ETF type (btc, eth, sol)
        #[arg(long, conflicts_with = "etf")]
        all: bool,
        /// Run one cycle immediately before waiting for the first trigger
        #[arg(long)]
        now: bool,
    },
}

impl From<Commands> for etfflow::AppCommand {
    fn from(cmd: Commands) -> etfflow::AppCommand {
        match cmd {
            Commands::Scrape {
                etf_type,
                headless,
                no_headless,
                dry_run,
            } => etfflow::AppCommand::Scrape {
                etf_type,
                dry_run,
                headless: match (headless, no_headless) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
            },
            Commands::List { etf_type, days } => etfflow::AppCommand::List {
                etf_type,
                days: days.into(),
            },
            Commands::Date { etf_type, date } => etfflow::AppCommand::Date { etf_type, date },
            Commands::Ticker {
                etf_type,
                ticker,
                days,
            } => etfflow::AppCommand::Ticker {
                etf_type,
                ticker,
                days: days.into(),
            },
            Commands::Summary { etf_type } => etfflow::AppCommand::Summary { etf_type },
            Commands::Serve { host, port } => etfflow::AppCommand::Serve { host, port },
            Commands::Scheduler { etf, all, now } => etfflow::AppCommand::Scheduler {
                etf_types: if all { AssetClass::ALL.to_vec() } else { etf },
                now,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => etfflow::cli::setup::setup_at_path(path),
            None => etfflow::cli::setup::setup(),
        },
        Some(cmd) => etfflow::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_command(args: &[&str]) -> etfflow::AppCommand {
        let cli = Cli::try_parse_from(args).unwrap();
        cli.command.unwrap().into()
    }

    #[test]
    fn test_scrape_headless_flags() {
        for (args, expected) in [
            (vec!["etfflow", "scrape", "btc"], None),
            (vec!["etfflow", "scrape", "BTC", "--headless"], Some(true)),
            (vec!["etfflow", "scrape", "btc", "--no-headless"], Some(false)),
            (vec!["etfflow", "scrape", "btc", "--headless", "--no-headless"], Some(false)),
        ] {
            match app_command(&args) {
                etfflow::AppCommand::Scrape {
                    etf_type,
                    headless,
                    dry_run,
                } => {
                    assert_eq!(etf_type, AssetClass::Btc);
                    assert!(!dry_run);
                    assert_eq!(headless, expected, "{args:?}");
                }
                _ => panic!("expected scrape for {args:?}"),
            }
        }
    }

    #[test]
    fn test_scheduler_all_selects_every_etf_type() {
        match app_command(&["etfflow", "scheduler", "--all", "--now"]) {
            etfflow::AppCommand::Scheduler { etf_types, now } => {
                assert_eq!(etf_types, AssetClass::ALL.to_vec());
                assert!(now);
            }
            _ => panic!("expected scheduler"),
        }
        match app_command(&["etfflow", "scheduler", "-e", "eth"]) {
            etfflow::AppCommand::Scheduler { etf_types, now } => {
                assert_eq!(etf_types, vec![AssetClass::Eth]);
                assert!(!now);
            }
            _ => panic!("expected scheduler"),
        }
        assert!(Cli::try_parse_from(["etfflow", "scheduler", "--all", "-e", "btc"]).is_err());
    }
}
