use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use poolfolio::app::{history_range, latest_snapshot, RefreshService};
use poolfolio::clock::SystemClock;
use poolfolio::config::ResolvedConfig;
use poolfolio::models::PortfolioName;
use poolfolio::source::RpcPoolDataSource;

#[derive(Parser)]
#[command(name = "poolfolio")]
#[command(about = "Liquidity pool portfolio valuation")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "poolfolio.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch live pool data, value both portfolios and record snapshots
    Refresh,
    /// Show the most recent recorded snapshot for a portfolio
    Latest {
        /// Portfolio name (core or growth)
        #[arg(default_value = "core")]
        portfolio: String,
    },
    /// Show recorded snapshots within a time window
    History {
        /// Portfolio name (core or growth)
        #[arg(default_value = "core")]
        portfolio: String,

        /// Window start (RFC 3339 timestamp or YYYY-MM-DD date), inclusive
        #[arg(long)]
        start: Option<String>,

        /// Window end (RFC 3339 timestamp or YYYY-MM-DD date), inclusive
        #[arg(long)]
        end: Option<String>,
    },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Command::Refresh) => {
            let config = Arc::new(ResolvedConfig::load(&cli.config)?);
            let source = RpcPoolDataSource::new(&config.source, config.registry.clone())?;
            let service =
                RefreshService::new(config, Arc::new(source), Arc::new(SystemClock));
            let output = service.refresh().await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Some(Command::Latest { portfolio }) => {
            let config = ResolvedConfig::load_or_default(&cli.config)?;
            let portfolio = parse_portfolio(&portfolio)?;
            match latest_snapshot(&config, portfolio).await? {
                Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
                None => println!("null"),
            }
        }
        Some(Command::History {
            portfolio,
            start,
            end,
        }) => {
            let config = ResolvedConfig::load_or_default(&cli.config)?;
            let portfolio = parse_portfolio(&portfolio)?;
            let start = start.as_deref().map(|s| parse_bound(s, false)).transpose()?;
            let end = end.as_deref().map(|s| parse_bound(s, true)).transpose()?;
            let output = history_range(&config, portfolio, start, end).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Some(Command::Config) => {
            let config = ResolvedConfig::load_or_default(&cli.config)?;
            println!("Config file: {}", cli.config.display());
            println!("Data directory: {}", config.data_dir.display());
            println!("Accounts: {}", config.accounts.len());
            println!("Pools: {}", config.registry.iter().count());
            for definition in &config.portfolios {
                println!(
                    "Portfolio {}: {} pools",
                    definition.name,
                    definition.pools.len()
                );
            }
        }
        None => {
            println!("Poolfolio - Liquidity Pool Portfolio Valuation");
            println!("==============================================\n");
            println!("Config: {}\n", cli.config.display());
            println!("Commands:");
            println!("  refresh   Value both portfolios and record snapshots");
            println!("  latest    Show the most recent snapshot for a portfolio");
            println!("  history   Show recorded snapshots within a time window");
            println!("  config    Show current configuration\n");
            println!("Run 'poolfolio --help' for more options.");
        }
    }

    Ok(())
}

fn parse_portfolio(value: &str) -> Result<PortfolioName> {
    value.parse().map_err(anyhow::Error::from)
}

/// Accept an RFC 3339 timestamp or a bare date. A bare date expands to the
/// start or end of that day depending on which bound it is.
fn parse_bound(value: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let time = if end_of_day {
            NaiveTime::from_hms_opt(23, 59, 59).context("invalid time")?
        } else {
            NaiveTime::from_hms_opt(0, 0, 0).context("invalid time")?
        };
        return Ok(Utc.from_utc_datetime(&date.and_time(time)));
    }
    bail!("Invalid timestamp {value:?}: expected RFC 3339 or YYYY-MM-DD");
}
