//! Spreadsheet side of the pipeline: authentication, the `SheetWriter`
//! abstraction, and its Google Sheets and CSV implementations.

use serde_json::Value;
use thiserror::Error;

pub mod auth;
pub mod client;
pub mod csv_writer;

pub use auth::{ServiceAccountTokens, StaticToken, TokenSource};
pub use client::SheetsClient;
pub use csv_writer::CsvWriter;

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("failed to build service account authenticator: {0}")]
    AuthSetup(std::io::Error),

    #[error("failed to obtain access token: {0}")]
    Auth(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid sheets url: {0}")]
    Url(#[from] url::ParseError),

    #[error("sheets api returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("worksheet {0:?} not found")]
    WorksheetMissing(String),

    #[error("failed to write csv: {0}")]
    Csv(#[from] csv::Error),
}

/// Destination for quote rows. Implementations only ever add data.
#[async_trait::async_trait]
pub trait SheetWriter: Send + Sync {
    /// Create the worksheet if needed and make sure row 1 holds `header`.
    async fn ensure_worksheet(&self, title: &str, header: &[String]) -> Result<(), SheetsError>;

    /// Columns A and B of every row below the header.
    async fn key_columns(&self, title: &str) -> Result<Vec<Vec<String>>, SheetsError>;

    /// Append one row after the last row with data.
    async fn append_row(&self, title: &str, row: &[Value]) -> Result<(), SheetsError>;
}

/// A1 notation for `cells` on worksheet `title`, quoting the title.
pub fn a1_range(title: &str, cells: &str) -> String {
    format!("'{}'!{}", title.replace('\'', "''"), cells)
}

/// Display text of a cell value.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
