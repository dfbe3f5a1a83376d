use serde_json::Value;
use std::io::Write;
use tokio::sync::Mutex;

use super::{cell_text, SheetWriter, SheetsError};

struct CsvState<W: Write> {
    writer: csv::Writer<W>,
    header_written: bool,
}

/// Writes rows as CSV instead of touching a spreadsheet (`--dry-run`).
/// Each record is prefixed with the worksheet it would have gone to.
pub struct CsvWriter<W: Write + Send> {
    state: Mutex<CsvState<W>>,
}

impl CsvWriter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> CsvWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            state: Mutex::new(CsvState {
                writer: csv::Writer::from_writer(inner),
                header_written: false,
            }),
        }
    }

    pub fn into_inner(self) -> Result<W, SheetsError> {
        self.state
            .into_inner()
            .writer
            .into_inner()
            .map_err(|e| SheetsError::Csv(e.into_error().into()))
    }
}

#[async_trait::async_trait]
impl<W: Write + Send> SheetWriter for CsvWriter<W> {
    async fn ensure_worksheet(&self, _title: &str, header: &[String]) -> Result<(), SheetsError> {
        let mut state = self.state.lock().await;
        if !state.header_written {
            let record = std::iter::once("Worksheet").chain(header.iter().map(String::as_str));
            state.writer.write_record(record)?;
            state.writer.flush().map_err(csv::Error::from)?;
            state.header_written = true;
        }
        Ok(())
    }

    async fn key_columns(&self, _title: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        Ok(Vec::new())
    }

    async fn append_row(&self, title: &str, row: &[Value]) -> Result<(), SheetsError> {
        let mut state = self.state.lock().await;
        let record = std::iter::once(title.to_string()).chain(row.iter().map(cell_text));
        state.writer.write_record(record)?;
        state.writer.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}
