use chrono::NaiveDate;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use yup_oauth2::ServiceAccountKey;

/// Columns written for every quote row, in order.
pub const HEADER: [&str; 9] = [
    "Date", "Code", "Name", "Open", "High", "Low", "Close", "Volume", "Change %",
];

pub const DEFAULT_TICKERS: &str = "082270.KQ,358570.KQ,000250.KQ";
pub const DEFAULT_WORKSHEET: &str = "Daily";
pub const DEFAULT_CALENDAR_SYMBOL: &str = "^KS11";
pub const DEFAULT_QUOTES_API_BASE: &str = "https://query1.finance.yahoo.com";
pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";

pub fn header_row() -> Vec<String> {
    HEADER.iter().map(|h| h.to_string()).collect()
}

/// A market symbol as the quote provider knows it, e.g. `082270.KQ` or `AAPL`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ticker(String);

impl Ticker {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let symbol = raw.trim();
        if symbol.is_empty() {
            return Err(ConfigError::InvalidTicker(raw.to_string()));
        }
        let valid = symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
        if !valid {
            return Err(ConfigError::InvalidTicker(raw.to_string()));
        }
        Ok(Ticker(symbol.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Symbol without its exchange suffix (`082270` for `082270.KQ`).
    pub fn code(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One daily bar from the provider, dated in the exchange's local calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<u64>,
}

/// Daily bars for one symbol plus what the provider reports about it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailySeries {
    pub name: String,
    /// Close of the session preceding the first bar, when reported.
    pub previous_close: Option<f64>,
    pub bars: Vec<DailyBar>,
}

/// The quote record appended to the sheet for one ticker and trade date.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyQuote {
    pub date: NaiveDate,
    pub code: String,
    pub name: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub change_pct: Option<f64>,
}

impl DailyQuote {
    /// Cells in `HEADER` order. A missing change is written as an empty cell.
    pub fn to_row(&self) -> Vec<Value> {
        vec![
            Value::from(self.date.format("%Y-%m-%d").to_string()),
            Value::from(self.code.clone()),
            Value::from(self.name.clone()),
            Value::from(self.open),
            Value::from(self.high),
            Value::from(self.low),
            Value::from(self.close),
            Value::from(self.volume),
            self.change_pct.map(Value::from).unwrap_or_else(|| Value::from("")),
        ]
    }

    /// Key used for duplicate suppression: (date, code).
    pub fn key(&self) -> (String, String) {
        (self.date.format("%Y-%m-%d").to_string(), self.code.clone())
    }
}

/// Percent change from `previous` to `close`, rounded to two decimals.
pub fn change_percent(close: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 || !previous.is_finite() || !close.is_finite() {
        return None;
    }
    let pct = (close - previous) / previous * 100.0;
    Some((pct * 100.0).round() / 100.0)
}

/// Where quote rows go inside the spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetLayout {
    /// Every ticker in one worksheet.
    Single { worksheet: String },
    /// One worksheet per ticker, titled "{code} {name}".
    PerTicker,
}

impl SheetLayout {
    pub fn worksheet_for(&self, quote: &DailyQuote) -> String {
        match self {
            SheetLayout::Single { worksheet } => worksheet.clone(),
            SheetLayout::PerTicker => {
                let name = quote.name.trim();
                if name.is_empty() {
                    quote.code.clone()
                } else {
                    format!("{} {}", quote.code, name)
                }
            }
        }
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub trade_date: Option<NaiveDate>,
    pub appended: usize,
    pub duplicates: Vec<String>,
    pub no_data: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl RunSummary {
    pub fn new(trade_date: NaiveDate) -> Self {
        Self {
            trade_date: Some(trade_date),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable required")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid ticker {0:?}")]
    InvalidTicker(String),

    #[error("TICKERS is set but names no tickers")]
    NoTickers,

    #[error("cannot read service account file {path}: {source}")]
    CredentialsFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid service account credentials: {0}")]
    Credentials(std::io::Error),
}

/// Parsed service-account key. `Debug` never prints the private key.
#[derive(Clone)]
pub struct Credentials(ServiceAccountKey);

impl Credentials {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        yup_oauth2::parse_service_account_key(json)
            .map(Credentials)
            .map_err(ConfigError::Credentials)
    }

    pub fn client_email(&self) -> &str {
        &self.0.client_email
    }

    pub fn service_account_key(&self) -> ServiceAccountKey {
        self.0.clone()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_email", &self.0.client_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Where a run sends its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Spreadsheet,
    /// CSV on stdout; spreadsheet settings are not read.
    DryRun,
}

/// The spreadsheet rows are appended to and the key used to reach it.
#[derive(Debug, Clone)]
pub struct SheetTarget {
    pub credentials: Credentials,
    pub spreadsheet_id: String,
}

impl SheetTarget {
    fn from_lookup<G>(get: G) -> Result<Self, ConfigError>
    where
        G: Fn(&str) -> Option<String>,
    {
        let credentials = match get("GOOGLE_SERVICE_ACCOUNT_JSON") {
            Some(json) => Credentials::from_json(&json)?,
            None => {
                let path = get("GOOGLE_SERVICE_ACCOUNT_FILE")
                    .map(PathBuf::from)
                    .ok_or(ConfigError::Missing("GOOGLE_SERVICE_ACCOUNT_JSON"))?;
                let json = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::CredentialsFile { path, source })?;
                Credentials::from_json(&json)?
            }
        };

        let spreadsheet_id = get("SPREADSHEET_ID")
            .map(|v| v.trim().to_string())
            .ok_or(ConfigError::Missing("SPREADSHEET_ID"))?;

        Ok(Self {
            credentials,
            spreadsheet_id,
        })
    }
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` only when loaded for a dry run
    pub target: Option<SheetTarget>,
    pub layout: SheetLayout,
    pub tickers: Vec<Ticker>,
    pub run_date: Option<NaiveDate>,
    pub skip_duplicates: bool,
    pub calendar_symbol: Ticker,
    pub fetch_concurrency: usize,
    pub rate_limit_per_minute: u32,
    pub quotes_api_base: String,
    pub sheets_api_base: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env(destination: Destination) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if it exists
        Self::from_lookup_for(|key| std::env::var(key).ok(), destination)
    }

    /// Configuration for appending to the spreadsheet.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_lookup_for(lookup, Destination::Spreadsheet)
    }

    /// Build the configuration from an arbitrary variable lookup. Empty values
    /// count as unset.
    pub fn from_lookup_for<F>(lookup: F, destination: Destination) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let target = match destination {
            Destination::Spreadsheet => Some(SheetTarget::from_lookup(&get)?),
            Destination::DryRun => None,
        };

        let worksheet = get("WORKSHEET_NAME")
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| DEFAULT_WORKSHEET.to_string());
        let layout = match get("SHEET_LAYOUT").as_deref().map(str::trim) {
            None | Some("single") => SheetLayout::Single { worksheet },
            Some("per-ticker") => SheetLayout::PerTicker,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "SHEET_LAYOUT",
                    value: other.to_string(),
                    reason: "expected \"single\" or \"per-ticker\"".to_string(),
                })
            }
        };

        let tickers = match get("TICKERS") {
            Some(raw) => parse_tickers(&raw)?,
            None => parse_tickers(DEFAULT_TICKERS)?,
        };

        let run_date = get("RUN_DATE")
            .map(|v| parse_date("RUN_DATE", &v))
            .transpose()?;

        let skip_duplicates = get("SKIP_DUPLICATES")
            .map(|v| parse_bool("SKIP_DUPLICATES", &v))
            .transpose()?
            .unwrap_or(false);

        let calendar_symbol = Ticker::parse(
            &get("CALENDAR_SYMBOL").unwrap_or_else(|| DEFAULT_CALENDAR_SYMBOL.to_string()),
        )?;

        let fetch_concurrency = get("FETCH_CONCURRENCY")
            .map(|v| parse_positive("FETCH_CONCURRENCY", &v))
            .transpose()?
            .unwrap_or(4) as usize;

        let rate_limit_per_minute = get("RATE_LIMIT_PER_MINUTE")
            .map(|v| parse_positive("RATE_LIMIT_PER_MINUTE", &v))
            .transpose()?
            .unwrap_or(120);

        Ok(Config {
            target,
            layout,
            tickers,
            run_date,
            skip_duplicates,
            calendar_symbol,
            fetch_concurrency,
            rate_limit_per_minute,
            quotes_api_base: get("QUOTES_API_BASE")
                .unwrap_or_else(|| DEFAULT_QUOTES_API_BASE.to_string()),
            sheets_api_base: get("SHEETS_API_BASE")
                .unwrap_or_else(|| DEFAULT_SHEETS_API_BASE.to_string()),
        })
    }

    /// The spreadsheet to write to; fails for a dry-run configuration.
    pub fn sheet_target(&self) -> Result<&SheetTarget, ConfigError> {
        self.target
            .as_ref()
            .ok_or(ConfigError::Missing("SPREADSHEET_ID"))
    }
}

/// Comma-separated ticker list; blank entries are ignored.
pub fn parse_tickers(raw: &str) -> Result<Vec<Ticker>, ConfigError> {
    let tickers = raw
        .split(',')
        .filter(|t| !t.trim().is_empty())
        .map(Ticker::parse)
        .collect::<Result<Vec<_>, _>>()?;
    if tickers.is_empty() {
        return Err(ConfigError::NoTickers);
    }
    Ok(tickers)
}

pub fn parse_date(var: &'static str, value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn parse_positive(var: &'static str, value: &str) -> Result<u32, ConfigError> {
    match value.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "expected a positive integer".to_string(),
        }),
    }
}
