//! One scheduled run: configuration, clients, trade date, collection
//!
//! Configuration is validated and every client is built before the first
//! request goes out, so a bad environment fails without touching the network.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::io::Write;
use std::sync::Arc;
use tracing::{error, info};

use crate::api::YahooClient;
use crate::collector::{CollectorOptions, DailyCollector};
use crate::models::{Config, ConfigError, Destination, RunSummary};
use crate::sheets::{CsvWriter, ServiceAccountTokens, SheetWriter, SheetsClient};
use crate::utils::TradingCalendar;

/// Per-invocation choices, usually from the command line
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Base date; falls back to RUN_DATE, then today
    pub run_date: Option<NaiveDate>,
    pub dry_run: bool,
}

impl RunOptions {
    pub fn destination(&self) -> Destination {
        if self.dry_run {
            Destination::DryRun
        } else {
            Destination::Spreadsheet
        }
    }
}

/// Run the daily collection.
///
/// `load_config` is handed the destination so a dry run does not insist on
/// spreadsheet settings. Dry-run rows go to `dry_run_output` as CSV.
pub async fn run<L, O>(load_config: L, options: &RunOptions, dry_run_output: O) -> Result<RunSummary>
where
    L: FnOnce(Destination) -> Result<Config, ConfigError>,
    O: Write + Send,
{
    let config = load_config(options.destination()).context("failed to load configuration")?;
    info!("📋 {} tickers, layout {:?}", config.tickers.len(), config.layout);

    let provider = YahooClient::new(&config).context("failed to build quote client")?;

    let writer: Box<dyn SheetWriter + '_> = if options.dry_run {
        info!("Dry run: rows go to stdout");
        Box::new(CsvWriter::new(dry_run_output))
    } else {
        let target = config.sheet_target()?;
        let tokens = ServiceAccountTokens::new(&target.credentials)
            .await
            .context("failed to set up service account authentication")?;
        let client = SheetsClient::new(
            &config.sheets_api_base,
            &target.spreadsheet_id,
            Arc::new(tokens),
        )
        .context("failed to build sheets client")?;
        info!("📋 Writing to spreadsheet {}", target.spreadsheet_id);
        Box::new(client)
    };

    let base_date = options
        .run_date
        .or(config.run_date)
        .unwrap_or_else(|| Local::now().date_naive());
    let trade_date = TradingCalendar::new(&provider, config.calendar_symbol.clone())
        .recent_trading_day(base_date)
        .await;
    info!("📅 Base date {}, trade date {}", base_date, trade_date);

    DailyCollector::new(&provider, writer.as_ref(), CollectorOptions::from_config(&config))
        .run(&config.tickers, trade_date)
        .await
}

/// Process exit status for a finished run: 0 only when no ticker failed.
pub fn exit_status(outcome: &Result<RunSummary>) -> u8 {
    match outcome {
        Ok(summary) if summary.is_success() => 0,
        Ok(summary) => {
            for (ticker, reason) in &summary.failed {
                error!("{}: {}", ticker, reason);
            }
            error!(
                "❌ {} tickers failed, {} rows appended",
                summary.failed.len(),
                summary.appended
            );
            1
        }
        Err(e) => {
            error!("❌ {:#}", e);
            1
        }
    }
}
