//! Google Sheets API v4 client.
//!
//! # API Documentation
//! https://developers.google.com/sheets/api/reference/rest
//!
//! Only the three calls the job needs are wrapped: list tabs, read a range,
//! and a batched values update.

use std::sync::Arc;
use std::time::Duration;

use reprice_common::config::SheetsConfig;
use reprice_common::{Error, Result};
use reqwest::{Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::auth::TokenSource;

/// One range of a batched values update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    /// A1 notation, e.g. `'Products'!J2`
    pub range: String,
    pub values: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateRequest<'a> {
    value_input_option: &'a str,
    data: &'a [ValueRange],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateResponse {
    #[serde(default)]
    total_updated_cells: usize,
}

#[derive(Debug, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetResponse {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
    #[serde(default)]
    index: usize,
}

/// Sheets API client bound to one spreadsheet.
pub struct SheetsClient {
    http: reqwest::Client,
    base_url: Url,
    spreadsheet_id: String,
    tokens: Arc<dyn TokenSource>,
}

impl SheetsClient {
    /// Create a client for the configured spreadsheet.
    pub fn new(config: &SheetsConfig, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        let base_url = Url::parse(&config.api_base_url).map_err(|e| {
            Error::Config(format!("invalid sheets.api_base_url '{}': {}", config.api_base_url, e))
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            spreadsheet_id: config.spreadsheet_id.clone(),
            tokens,
        })
    }

    fn url(&self, tail: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("base URL '{}' cannot hold a path", self.base_url)))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str()])
            .extend(tail);
        Ok(url)
    }

    /// Titles of all tabs, in tab order.
    pub async fn read_sheets(&self) -> Result<Vec<String>> {
        let mut url = self.url(&[])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties(title,index)");

        let response: SpreadsheetResponse = self.get_json(url).await?;
        let mut sheets: Vec<SheetProperties> =
            response.sheets.into_iter().map(|s| s.properties).collect();
        sheets.sort_by_key(|p| p.index);

        Ok(sheets.into_iter().map(|p| p.title).collect())
    }

    /// Title of the tab at a zero-based position.
    pub async fn sheet_title(&self, index: usize) -> Result<String> {
        let titles = self.read_sheets().await?;
        let count = titles.len();
        titles.into_iter().nth(index).ok_or_else(|| {
            Error::NotFound(format!(
                "sheet #{} in spreadsheet {} ({} tabs)",
                index, self.spreadsheet_id, count
            ))
        })
    }

    /// All cell values of a range, as formatted strings.
    pub async fn read_values(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let url = self.url(&["values", range])?;
        let response: ValuesResponse = self.get_json(url).await?;
        debug!(range, rows = response.values.len(), "Read values");
        Ok(response.values)
    }

    /// Write several ranges in one request; returns the updated cell count.
    pub async fn batch_update(&self, data: &[ValueRange]) -> Result<usize> {
        let url = self.url(&["values:batchUpdate"])?;
        let body = BatchUpdateRequest {
            value_input_option: "USER_ENTERED",
            data,
        };

        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::External(format!("Sheets batchUpdate request failed: {}", e)))?;

        let result: BatchUpdateResponse = decode(response).await?;

        debug!(ranges = data.len(), cells = result.total_updated_cells, "Batch update applied");
        Ok(result.total_updated_cells)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<T> {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::External(format!("Sheets request failed: {}", e)))?;

        decode(response).await
    }
}

/// Check the status, then parse the body as JSON.
async fn decode<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T> {
    let body = check_response(response)
        .await?
        .bytes()
        .await
        .map_err(|e| Error::External(format!("failed to read Sheets response: {}", e)))?;
    Ok(serde_json::from_slice(&body)?)
}

/// Map non-success statuses to error values.
async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Auth(format!("Sheets API {}: {}", status, body))
        }
        StatusCode::NOT_FOUND => Error::NotFound(format!("Sheets API {}: {}", status, body)),
        StatusCode::TOO_MANY_REQUESTS => {
            Error::RateLimited(format!("Sheets API {}: {}", status, body))
        }
        _ => Error::External(format!("Sheets API {}: {}", status, body)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::auth::StaticTokenSource;

    fn client(base: &str) -> SheetsClient {
        let config = SheetsConfig {
            spreadsheet_id: "sheet-1".into(),
            api_base_url: base.into(),
            ..SheetsConfig::default()
        };
        SheetsClient::new(&config, Arc::new(StaticTokenSource::new("t"))).unwrap()
    }

    #[test]
    fn test_url_layout() {
        let c = client("https://sheets.googleapis.com");
        let url = c.url(&["values", "'Товары'"]).unwrap();
        assert!(url
            .as_str()
            .starts_with("https://sheets.googleapis.com/v4/spreadsheets/sheet-1/values/"));
        assert!(!url.as_str().contains("Товары"));
    }

    #[test]
    fn test_url_with_base_path() {
        let c = client("http://127.0.0.1:9000/proxy/");
        let url = c.url(&["values:batchUpdate"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9000/proxy/v4/spreadsheets/sheet-1/values:batchUpdate"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let config = SheetsConfig {
            api_base_url: "not a url".into(),
            ..SheetsConfig::default()
        };
        let result = SheetsClient::new(&config, Arc::new(StaticTokenSource::new("t")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_batch_request_shape() {
        let data = vec![ValueRange {
            range: "'P'!J2".into(),
            values: vec![vec!["1".into()]],
        }];
        let body = BatchUpdateRequest {
            value_input_option: "USER_ENTERED",
            data: &data,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["valueInputOption"], "USER_ENTERED");
        assert_eq!(json["data"][0]["range"], "'P'!J2");
        assert_eq!(json["data"][0]["values"][0][0], "1");
    }
}
