//! Daily collection run
//!
//! Fetches the trade-date quote for every configured ticker, then appends one
//! row per quote to the spreadsheet. A ticker whose fetch fails is recorded
//! and skipped; a failed write stops the run.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, warn};

use crate::api::{fetch_daily_quote, QuoteProvider};
use crate::models::{header_row, Config, RunSummary, SheetLayout, Ticker};
use crate::sheets::SheetWriter;

#[derive(Debug, Clone)]
pub struct CollectorOptions {
    pub layout: SheetLayout,
    pub skip_duplicates: bool,
    pub concurrency: usize,
}

impl CollectorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            layout: config.layout.clone(),
            skip_duplicates: config.skip_duplicates,
            concurrency: config.fetch_concurrency,
        }
    }
}

/// Data collection system for fetching quotes and appending them to a sheet
pub struct DailyCollector<'a, P: ?Sized, W: ?Sized> {
    provider: &'a P,
    writer: &'a W,
    options: CollectorOptions,
}

impl<'a, P, W> DailyCollector<'a, P, W>
where
    P: QuoteProvider + ?Sized,
    W: SheetWriter + ?Sized,
{
    pub fn new(provider: &'a P, writer: &'a W, options: CollectorOptions) -> Self {
        Self {
            provider,
            writer,
            options,
        }
    }

    pub async fn run(&self, tickers: &[Ticker], trade_date: NaiveDate) -> Result<RunSummary> {
        info!("📊 Fetching {} tickers for {}", tickers.len(), trade_date);

        let fetched = stream::iter(tickers)
            .map(|ticker| async move {
                let result = fetch_daily_quote(self.provider, ticker, trade_date).await;
                (ticker, result)
            })
            .buffered(self.options.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let mut summary = RunSummary::new(trade_date);
        let mut prepared = HashSet::new();
        // (date, code) keys per worksheet, read once and kept current as rows go in
        let mut recorded: HashMap<String, HashSet<(String, String)>> = HashMap::new();

        for (ticker, result) in fetched {
            let quote = match result {
                Ok(Some(quote)) => quote,
                Ok(None) => {
                    info!("⚪ {}: no quote for {}", ticker, trade_date);
                    summary.no_data.push(ticker.to_string());
                    continue;
                }
                Err(e) => {
                    error!("❌ {}: fetch failed - {}", ticker, e);
                    summary.failed.push((ticker.to_string(), e.to_string()));
                    continue;
                }
            };

            let worksheet = self.options.layout.worksheet_for(&quote);
            if prepared.insert(worksheet.clone()) {
                self.writer
                    .ensure_worksheet(&worksheet, &header_row())
                    .await
                    .with_context(|| format!("preparing worksheet {:?}", worksheet))?;
            }

            if self.options.skip_duplicates {
                if !recorded.contains_key(&worksheet) {
                    let keys = self.recorded_keys(&worksheet).await?;
                    recorded.insert(worksheet.clone(), keys);
                }
                if recorded
                    .get(&worksheet)
                    .is_some_and(|keys| keys.contains(&quote.key()))
                {
                    info!("⏭️  Skip duplicate: {} {} @ {}", quote.code, quote.name, quote.date);
                    summary.duplicates.push(ticker.to_string());
                    continue;
                }
            }

            self.writer
                .append_row(&worksheet, &quote.to_row())
                .await
                .with_context(|| format!("appending {} to worksheet {:?}", ticker, worksheet))?;
            if let Some(keys) = recorded.get_mut(&worksheet) {
                keys.insert(quote.key());
            }
            summary.appended += 1;
            debug!("✅ {}: close {} volume {}", ticker, quote.close, quote.volume);
        }

        if summary.appended == 0 {
            info!("No records to write.");
        } else {
            info!("✅ {} rows appended for trade date {}", summary.appended, trade_date);
        }
        if !summary.failed.is_empty() {
            warn!("{} of {} tickers failed", summary.failed.len(), tickers.len());
        }

        Ok(summary)
    }

    async fn recorded_keys(&self, worksheet: &str) -> Result<HashSet<(String, String)>> {
        let rows = self
            .writer
            .key_columns(worksheet)
            .await
            .with_context(|| format!("reading existing rows of {:?}", worksheet))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let mut cells = row.into_iter();
                Some((cells.next()?, cells.next()?))
            })
            .collect())
    }
}
