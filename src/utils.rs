use chrono::{Datelike, Duration, NaiveDate, Weekday};
use tracing::{debug, warn};

use crate::api::QuoteProvider;
use crate::models::Ticker;

/// How far back to look for the latest trading session
const LOOKBACK_DAYS: i64 = 20;

/// Market calendar utilities for handling weekends and holidays
pub struct TradingCalendar<'a, P: QuoteProvider + ?Sized> {
    provider: &'a P,
    reference: Ticker,
}

impl<'a, P: QuoteProvider + ?Sized> TradingCalendar<'a, P> {
    /// `reference` should be a broad index that trades every session, e.g. `^KS11`.
    pub fn new(provider: &'a P, reference: Ticker) -> Self {
        Self { provider, reference }
    }

    /// Get the most recent trading day on or before the given date
    pub async fn recent_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let from = date - Duration::days(LOOKBACK_DAYS);
        match self.provider.daily_bars(self.reference.as_str(), from, date).await {
            Ok(series) => {
                let latest = series
                    .bars
                    .iter()
                    .filter(|bar| bar.date <= date && bar.close.is_some())
                    .map(|bar| bar.date)
                    .max();
                match latest {
                    Some(day) => {
                        debug!("{} last traded on {} (base {})", self.reference, day, date);
                        day
                    }
                    None => {
                        warn!(
                            "No {} sessions within {} days of {}, assuming weekdays trade",
                            self.reference, LOOKBACK_DAYS, date
                        );
                        last_weekday_on_or_before(date)
                    }
                }
            }
            Err(e) => {
                // Fallback to weekend check if API fails
                warn!("Calendar lookup via {} failed ({}), assuming weekdays trade", self.reference, e);
                last_weekday_on_or_before(date)
            }
        }
    }
}

/// Step back over Saturday and Sunday.
pub fn last_weekday_on_or_before(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date - Duration::days(2),
        _ => date,
    }
}
