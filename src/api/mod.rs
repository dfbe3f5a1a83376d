use chrono::{Duration, NaiveDate};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{change_percent, DailyQuote, DailySeries, Ticker};

pub mod yahoo_client;
pub use yahoo_client::YahooClient;

/// Days of history requested around the trade date so the previous close is known.
const QUOTE_LOOKBACK_DAYS: i64 = 14;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid provider url: {0}")]
    Url(#[from] url::ParseError),

    #[error("unknown symbol {0}")]
    UnknownSymbol(String),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider error {code}: {description}")]
    Provider { code: String, description: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Request pacing for provider calls
pub struct ApiRateLimiter {
    limiter: DefaultDirectRateLimiter,
}

impl ApiRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        // Evenly spaced, no bursts
        let quota = Quota::per_minute(per_minute).allow_burst(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

/// Source of daily bars
#[async_trait::async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn daily_bars(
        &self,
        symbol: &str,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Result<DailySeries, FetchError>;
}

/// Reduce the provider's bars around `date` to the quote for that date.
///
/// `Ok(None)` means the symbol exists but has no usable bar on `date`.
pub async fn fetch_daily_quote<P>(
    provider: &P,
    ticker: &Ticker,
    date: NaiveDate,
) -> Result<Option<DailyQuote>, FetchError>
where
    P: QuoteProvider + ?Sized,
{
    let from = date - Duration::days(QUOTE_LOOKBACK_DAYS);
    let to = date + Duration::days(1);
    let series = provider.daily_bars(ticker.as_str(), from, to).await?;
    Ok(quote_from_series(ticker, date, &series))
}

pub fn quote_from_series(ticker: &Ticker, date: NaiveDate, series: &DailySeries) -> Option<DailyQuote> {
    let Some(index) = series.bars.iter().position(|bar| bar.date == date) else {
        debug!("{}: no bar for {}", ticker, date);
        return None;
    };
    let bar = &series.bars[index];

    let (Some(open), Some(high), Some(low), Some(close), Some(volume)) =
        (bar.open, bar.high, bar.low, bar.close, bar.volume)
    else {
        warn!("⚠️ {}: bar for {} is missing fields: {:?}", ticker, date, bar);
        return None;
    };

    // Holiday rows come back with null closes; skip them
    let previous_close = series.bars[..index]
        .iter()
        .rev()
        .find_map(|b| b.close)
        .or(series.previous_close);

    Some(DailyQuote {
        date,
        code: ticker.code().to_string(),
        name: series.name.clone(),
        open,
        high,
        low,
        close,
        volume,
        change_pct: previous_close.and_then(|prev| change_percent(close, prev)),
    })
}
