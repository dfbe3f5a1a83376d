use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::{a1_range, cell_text, SheetWriter, SheetsError, TokenSource};

/// Rows given to a newly created worksheet
const NEW_SHEET_ROWS: usize = 2000;

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct BatchUpdateResponse {
    #[serde(default)]
    replies: Vec<BatchReply>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchReply {
    add_sheet: Option<AddSheetReply>,
}

#[derive(Debug, Deserialize)]
struct AddSheetReply {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Google Sheets API v4 client bound to one spreadsheet
pub struct SheetsClient {
    client: Client,
    base_url: Url,
    spreadsheet_id: String,
    tokens: Arc<dyn TokenSource>,
    sheet_ids: Mutex<Option<HashMap<String, i64>>>,
}

impl SheetsClient {
    pub fn new(
        api_base: &str,
        spreadsheet_id: &str,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, SheetsError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(concat!("stocks-to-sheet/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = Url::parse(api_base)?;
        if base_url.cannot_be_a_base() {
            return Err(SheetsError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }

        Ok(Self {
            client,
            base_url,
            spreadsheet_id: spreadsheet_id.to_string(),
            tokens,
            sheet_ids: Mutex::new(None),
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new()
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("spreadsheets").extend(segments);
        }
        url
    }

    fn values_url(&self, range: &str) -> Url {
        self.url(&[self.spreadsheet_id.as_str(), "values", range])
    }

    /// Make authenticated request to the Sheets API
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SheetsError> {
        let token = self.tokens.access_token().await?;
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SheetsError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| SheetsError::Decode(e.to_string()))
    }

    async fn fetch_sheet_ids(&self) -> Result<HashMap<String, i64>, SheetsError> {
        let mut url = self.url(&[self.spreadsheet_id.as_str()]);
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties(sheetId,title)");

        let meta: SpreadsheetMeta = self.send(self.client.get(url)).await?;
        debug!("Spreadsheet has {} worksheets", meta.sheets.len());
        Ok(meta
            .sheets
            .into_iter()
            .map(|s| (s.properties.title, s.properties.sheet_id))
            .collect())
    }

    async fn sheet_id(&self, title: &str) -> Result<Option<i64>, SheetsError> {
        let mut guard = self.sheet_ids.lock().await;
        if guard.is_none() {
            *guard = Some(self.fetch_sheet_ids().await?);
        }
        Ok(guard.as_ref().and_then(|ids| ids.get(title).copied()))
    }

    async fn batch_update(&self, requests: Value) -> Result<BatchUpdateResponse, SheetsError> {
        let url = self.url(&[format!("{}:batchUpdate", self.spreadsheet_id).as_str()]);
        self.send(self.client.post(url).json(&json!({ "requests": requests })))
            .await
    }

    async fn add_sheet(&self, title: &str, columns: usize) -> Result<i64, SheetsError> {
        let response = self
            .batch_update(json!([{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": {
                            "rowCount": NEW_SHEET_ROWS,
                            "columnCount": columns.max(1),
                        }
                    }
                }
            }]))
            .await?;

        let properties = response
            .replies
            .into_iter()
            .find_map(|r| r.add_sheet)
            .map(|a| a.properties)
            .ok_or_else(|| SheetsError::WorksheetMissing(title.to_string()))?;

        info!("📄 Created worksheet {:?}", properties.title);
        if let Some(ids) = self.sheet_ids.lock().await.as_mut() {
            ids.insert(properties.title.clone(), properties.sheet_id);
        }
        Ok(properties.sheet_id)
    }

    async fn insert_top_row(&self, sheet_id: i64) -> Result<(), SheetsError> {
        self.batch_update(json!([{
            "insertDimension": {
                "range": {
                    "sheetId": sheet_id,
                    "dimension": "ROWS",
                    "startIndex": 0,
                    "endIndex": 1,
                },
                "inheritFromBefore": false,
            }
        }]))
        .await?;
        Ok(())
    }

    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        let values: ValueRange = self.send(self.client.get(self.values_url(range))).await?;
        Ok(values
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    async fn write_range(&self, range: &str, rows: Value) -> Result<(), SheetsError> {
        let mut url = self.values_url(range);
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let _: Value = self
            .send(self.client.put(url).json(&json!({ "values": rows })))
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SheetWriter for SheetsClient {
    async fn ensure_worksheet(&self, title: &str, header: &[String]) -> Result<(), SheetsError> {
        let sheet_id = match self.sheet_id(title).await? {
            Some(id) => id,
            None => self.add_sheet(title, header.len()).await?,
        };

        let first_row = self
            .read_range(&a1_range(title, "1:1"))
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        if first_row == header {
            return Ok(());
        }

        if !first_row.is_empty() {
            warn!(
                "Worksheet {:?} row 1 is {:?}, inserting header above it",
                title, first_row
            );
            self.insert_top_row(sheet_id).await?;
        }
        self.write_range(&a1_range(title, "A1"), json!([header])).await
    }

    async fn key_columns(&self, title: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        self.read_range(&a1_range(title, "A2:B")).await
    }

    async fn append_row(&self, title: &str, row: &[Value]) -> Result<(), SheetsError> {
        let mut url = self.values_url(&format!("{}:append", a1_range(title, "A1")));
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let response: Value = self
            .send(self.client.post(url).json(&json!({ "values": [row] })))
            .await?;
        let updated = response
            .pointer("/updates/updatedRange")
            .and_then(|range| range.as_str())
            .unwrap_or(title);
        debug!("Appended to {}", updated);
        Ok(())
    }
}
