use chrono::NaiveDate;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use stocks_to_sheet::app::{self, RunOptions};
use stocks_to_sheet::models::Config;

/// Append the latest daily quotes for the configured tickers to a Google Sheet
#[derive(Parser)]
#[command(name = "stocks-to-sheet")]
#[command(version)]
#[command(about = "Append the latest daily stock quotes to a Google Sheets worksheet")]
#[command(long_about = "
Fetches the most recent trading day's OHLCV quote for every ticker in TICKERS
and appends one row per ticker to the spreadsheet SPREADSHEET_ID.

Configuration comes from the environment (or a .env file); see .env.example.

Examples:
  stocks-to-sheet
  stocks-to-sheet --run-date 2025-09-29
  stocks-to-sheet --dry-run
")]
struct Args {
    /// Base date in YYYY-MM-DD format (overrides RUN_DATE; defaults to today)
    #[arg(long)]
    run_date: Option<NaiveDate>,

    /// Print rows as CSV on stdout instead of writing to the spreadsheet
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so --dry-run output stays clean
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stocks_to_sheet=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let options = RunOptions {
        run_date: args.run_date,
        dry_run: args.dry_run,
    };

    let outcome = app::run(Config::from_env, &options, std::io::stdout()).await;
    ExitCode::from(app::exit_status(&outcome))
}
