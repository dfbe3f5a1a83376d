use chrono::{DateTime, Duration, NaiveDate, NaiveTime};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{ApiRateLimiter, FetchError, QuoteProvider};
use crate::models::{Config, DailyBar, DailySeries};

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Yahoo Finance chart response
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    /// Exchange offset from UTC in seconds
    #[serde(default)]
    gmtoffset: i64,
    long_name: Option<String>,
    short_name: Option<String>,
    chart_previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Yahoo Finance daily chart client
pub struct YahooClient {
    client: Client,
    base_url: Url,
    rate_limiter: ApiRateLimiter,
}

impl YahooClient {
    /// Create a new client from the run configuration
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(&config.quotes_api_base)?,
            rate_limiter: ApiRateLimiter::new(config.rate_limit_per_minute),
        })
    }

    fn chart_url(&self, symbol: &str, from_date: NaiveDate, to_date: NaiveDate) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", symbol]);

        // period2 is exclusive; extend to the end of `to_date`
        let period1 = from_date.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = (to_date + Duration::days(1)).and_time(NaiveTime::MIN).and_utc().timestamp();
        url.query_pairs_mut()
            .append_pair("period1", &period1.to_string())
            .append_pair("period2", &period2.to_string())
            .append_pair("interval", "1d")
            .append_pair("events", "history");
        Ok(url)
    }
}

#[async_trait::async_trait]
impl QuoteProvider for YahooClient {
    async fn daily_bars(
        &self,
        symbol: &str,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Result<DailySeries, FetchError> {
        let url = self.chart_url(symbol, from_date, to_date)?;

        self.rate_limiter.wait().await;
        debug!("Making request to: {}", url);

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::UnknownSymbol(symbol.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chart: ChartResponse =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;
        let series = parse_chart(symbol, chart)?;

        debug!(
            "Retrieved {} daily bars for {} from {} to {}",
            series.bars.len(),
            symbol,
            from_date,
            to_date
        );
        Ok(series)
    }
}

fn parse_chart(symbol: &str, chart: ChartResponse) -> Result<DailySeries, FetchError> {
    if let Some(error) = chart.chart.error {
        if error.code.eq_ignore_ascii_case("not found") {
            return Err(FetchError::UnknownSymbol(symbol.to_string()));
        }
        return Err(FetchError::Provider {
            code: error.code,
            description: error.description.unwrap_or_default(),
        });
    }

    let result = chart
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| FetchError::UnknownSymbol(symbol.to_string()))?;

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let offset = result.meta.gmtoffset;

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        let date = DateTime::from_timestamp(ts + offset, 0)
            .ok_or_else(|| FetchError::Decode(format!("timestamp out of range: {}", ts)))?
            .date_naive();
        bars.push(DailyBar {
            date,
            open: quote.open.get(i).copied().flatten(),
            high: quote.high.get(i).copied().flatten(),
            low: quote.low.get(i).copied().flatten(),
            close: quote.close.get(i).copied().flatten(),
            volume: quote
                .volume
                .get(i)
                .copied()
                .flatten()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(|v| v as u64),
        });
    }

    let name = result
        .meta
        .long_name
        .or(result.meta.short_name)
        .unwrap_or_default()
        .trim()
        .to_string();

    Ok(DailySeries {
        name,
        previous_close: result.meta.chart_previous_close,
        bars,
    })
}
