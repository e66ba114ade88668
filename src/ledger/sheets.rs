use super::{LedgerRow, OrderLedger};
use crate::config::LedgerSettings;
use crate::error::Error;
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;

const ERROR_BODY_CHARS: usize = 300;

/// Google Sheets v4 values API adapter
#[derive(Clone)]
pub struct SheetsLedger {
    client: Client,
    api_base: Url,
    spreadsheet_id: String,
    sheet_name: String,
    access_token: String,
    symbol_header: String,
    log_start_column: usize,
}

/// Response from the values endpoint
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl SheetsLedger {
    pub fn new(settings: &LedgerSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        let api_base = Url::parse(&settings.api_base)
            .map_err(|e| Error::Configuration(format!("ledger.api_base: {}", e)))?;

        Ok(Self {
            client,
            api_base,
            spreadsheet_id: settings.spreadsheet_id.clone(),
            sheet_name: settings.sheet_name.clone(),
            access_token: settings.access_token.clone(),
            symbol_header: settings.headers.symbol.clone(),
            log_start_column: settings.log_start_column,
        })
    }

    fn values_url(&self, range: &str) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Configuration("ledger.api_base cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", range]);
        Ok(url)
    }

    fn a1_range(&self, cells: &str) -> String {
        format!("'{}'!{}", self.sheet_name.replace('\'', "''"), cells)
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<Value>>> {
        let url = self.values_url(range)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| Error::Ledger(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(Error::Ledger(format!("Sheets API error ({}): {}", status, body)));
        }

        let range: ValueRange = response
            .json()
            .await
            .map_err(|e| Error::Ledger(format!("Unexpected Sheets response: {}", e)))?;
        Ok(range.values)
    }
}

/// 1-based column index to A1 letters
pub fn column_letter(mut column: usize) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        column = (column - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Leading part of an error response body; gateways can return whole HTML pages
async fn error_body(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    if body.chars().count() > ERROR_BODY_CHARS {
        let mut cut: String = body.chars().take(ERROR_BODY_CHARS).collect();
        cut.push_str("...");
        cut
    } else {
        body
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Turn a raw value grid into header-keyed rows
///
/// Empty or repeated headers are ignored; data starts at row 2.
fn rows_from_values(values: &[Vec<Value>]) -> Vec<LedgerRow> {
    let Some((header_row, data)) = values.split_first() else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let headers: Vec<Option<String>> = header_row
        .iter()
        .map(|v| {
            let name = cell_text(v).trim().to_string();
            if name.is_empty() || !seen.insert(name.clone()) {
                None
            } else {
                Some(name)
            }
        })
        .collect();

    data.iter()
        .enumerate()
        .map(|(i, cells)| {
            let mut row = LedgerRow::new(i + 2);
            for (header, value) in headers.iter().zip(cells) {
                if let Some(header) = header {
                    row.cells.insert(header.clone(), cell_text(value));
                }
            }
            row
        })
        .collect()
}

#[async_trait]
impl OrderLedger for SheetsLedger {
    async fn read_all_rows(&self) -> Result<Vec<LedgerRow>> {
        let values = self.get_values(&self.sheet_name).await?;
        Ok(rows_from_values(&values))
    }

    async fn find_row_by_symbol(&self, symbol: &str) -> Result<Option<usize>> {
        let rows = self.read_all_rows().await?;
        Ok(rows
            .iter()
            .find(|r| r.get(&self.symbol_header).trim().eq_ignore_ascii_case(symbol))
            .map(|r| r.index))
    }

    async fn first_unused_column(&self, row: usize) -> Result<usize> {
        let range = self.a1_range(&format!("A{row}:ZZZ{row}"));
        let values = self.get_values(&range).await?;
        let used = values.first().map(|r| r.len()).unwrap_or(0);
        Ok((used + 1).max(self.log_start_column))
    }

    async fn write_cell(&self, row: usize, column: usize, value: &str) -> Result<()> {
        let range = self.a1_range(&format!("{}{}", column_letter(column), row));
        let mut url = self.values_url(&range)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let response = self
            .client
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&json!({
                "range": range,
                "majorDimension": "ROWS",
                "values": [[value]],
            }))
            .send()
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(Error::Persistence(format!(
                "Sheets API error ({}): {}",
                status, body
            )));
        }
        Ok(())
    }
}
