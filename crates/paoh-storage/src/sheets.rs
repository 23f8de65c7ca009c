//! Spreadsheet contract plus a Google Sheets v4 REST implementation.

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info_span, Instrument};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("opening worksheet '{worksheet}' in spreadsheet '{spreadsheet}': {message}")]
    Open {
        spreadsheet: String,
        worksheet: String,
        message: String,
    },
    #[error("sheets request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("sheets api returned {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("invalid sheets url: {0}")]
    Url(String),
    #[error("row {row} is outside the worksheet ({rows} rows)")]
    RowOutOfRange { row: usize, rows: usize },
    #[error("{0}")]
    Message(String),
}

/// Opens worksheets by spreadsheet identifier and worksheet title.
#[async_trait]
pub trait SpreadsheetService: Send + Sync {
    async fn open_worksheet(
        &self,
        spreadsheet: &str,
        worksheet: &str,
    ) -> Result<Box<dyn Worksheet>, StoreError>;
}

/// The narrow row-store contract reconciliation needs. Rows and columns are 1-based, as in the sheet UI.
#[async_trait]
pub trait Worksheet: Send + Sync {
    fn title(&self) -> &str;

    async fn get_all_values(&self) -> Result<Vec<Vec<String>>, StoreError>;

    async fn append_rows(&self, rows: &[Vec<String>]) -> Result<(), StoreError>;

    async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<(), StoreError>;
}

/// 1-based column number to its A1 letters (1 → A, 27 → AA).
pub fn column_letter(col: usize) -> String {
    let mut n = col;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn quoted_sheet(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com";

#[derive(Debug, Clone)]
pub struct GoogleSheetsService {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl GoogleSheetsService {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            access_token,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct ValuesBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<&'a str>,
    #[serde(rename = "majorDimension")]
    major_dimension: &'static str,
    values: &'a [Vec<String>],
}

fn sheets_url(base: &str, segments: &[&str]) -> Result<Url, StoreError> {
    let mut url = Url::parse(base).map_err(|e| StoreError::Url(format!("{base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| StoreError::Url(format!("{base} cannot be a base")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(StoreError::HttpStatus {
            status: status.as_u16(),
            url: resp.url().to_string(),
        })
    }
}

#[async_trait]
impl SpreadsheetService for GoogleSheetsService {
    async fn open_worksheet(
        &self,
        spreadsheet: &str,
        worksheet: &str,
    ) -> Result<Box<dyn Worksheet>, StoreError> {
        let open_err = |message: String| StoreError::Open {
            spreadsheet: spreadsheet.to_string(),
            worksheet: worksheet.to_string(),
            message,
        };

        let Some(token) = self.access_token.clone() else {
            return Err(open_err("no access token configured".to_string()));
        };
        if spreadsheet.trim().is_empty() {
            return Err(open_err("no spreadsheet id configured".to_string()));
        }

        let mut url = sheets_url(&self.base_url, &["v4", "spreadsheets", spreadsheet])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties.title");

        let resp = self
            .http
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| open_err(e.to_string()))?;
        let resp = check_status(resp).await.map_err(|e| open_err(e.to_string()))?;
        let meta: SpreadsheetMeta = resp.json().await.map_err(|e| open_err(e.to_string()))?;

        if !meta.sheets.iter().any(|s| s.properties.title == worksheet) {
            return Err(open_err("worksheet not found".to_string()));
        }

        Ok(Box::new(GoogleWorksheet {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            access_token: token,
            spreadsheet_id: spreadsheet.to_string(),
            title: worksheet.to_string(),
        }))
    }
}

#[derive(Debug, Clone)]
pub struct GoogleWorksheet {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    spreadsheet_id: String,
    title: String,
}

impl GoogleWorksheet {
    fn values_url(&self, range: &str) -> Result<Url, StoreError> {
        sheets_url(
            &self.base_url,
            &["v4", "spreadsheets", &self.spreadsheet_id, "values", range],
        )
    }
}

#[async_trait]
impl Worksheet for GoogleWorksheet {
    fn title(&self) -> &str {
        &self.title
    }

    async fn get_all_values(&self) -> Result<Vec<Vec<String>>, StoreError> {
        let mut url = self.values_url(&quoted_sheet(&self.title))?;
        url.query_pairs_mut().append_pair("majorDimension", "ROWS");

        let span = info_span!("sheets_read", worksheet = %self.title);
        async {
            let resp = self.http.get(url).bearer_auth(&self.access_token).send().await?;
            let range: ValueRange = check_status(resp).await?.json().await?;
            debug!(rows = range.values.len(), "read worksheet values");
            Ok::<_, StoreError>(range.values)
        }
        .instrument(span)
        .await
    }

    async fn append_rows(&self, rows: &[Vec<String>]) -> Result<(), StoreError> {
        let range = quoted_sheet(&self.title);
        let mut url = self.values_url(&format!("{range}:append"))?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let body = ValuesBody {
            range: None,
            major_dimension: "ROWS",
            values: rows,
        };
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<(), StoreError> {
        let a1 = format!("{}!{}{}", quoted_sheet(&self.title), column_letter(col), row);
        let mut url = self.values_url(&a1)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let values = vec![vec![value.to_string()]];
        let body = ValuesBody {
            range: Some(&a1),
            major_dimension: "ROWS",
            values: &values,
        };
        let resp = self
            .http
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_metadata(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-123"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sheets": [
                    {"properties": {"title": "Opportunities"}},
                    {"properties": {"title": "Archive"}}
                ]
            })))
            .mount(server)
            .await;
    }

    fn service(server: &MockServer, token: Option<&str>) -> GoogleSheetsService {
        GoogleSheetsService::new(reqwest::Client::new(), server.uri(), token.map(ToString::to_string))
    }

    #[test]
    fn column_letters_follow_a1_notation() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(4), "D");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(52), "AZ");
    }

    #[tokio::test]
    async fn open_fails_without_token() {
        let server = MockServer::start().await;
        let err = service(&server, None)
            .open_worksheet("sheet-123", "Opportunities")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::Open { .. }));
    }

    #[tokio::test]
    async fn open_fails_for_missing_worksheet() {
        let server = MockServer::start().await;
        mount_metadata(&server).await;
        let err = service(&server, Some("tok"))
            .open_worksheet("sheet-123", "Nope")
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("worksheet not found"));
    }

    #[tokio::test]
    async fn reads_all_values() {
        let server = MockServer::start().await;
        mount_metadata(&server).await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-123/values/'Opportunities'"))
            .and(query_param("majorDimension", "ROWS"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "range": "Opportunities!A1:Q2",
                "values": [["Deadline", "Discovered"], ["March 1", "2026-01-01"]]
            })))
            .mount(&server)
            .await;

        let ws = service(&server, Some("tok"))
            .open_worksheet("sheet-123", "Opportunities")
            .await
            .unwrap();
        let values = ws.get_all_values().await.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[1][0], "March 1");
    }

    #[tokio::test]
    async fn empty_worksheet_reads_as_no_rows() {
        let server = MockServer::start().await;
        mount_metadata(&server).await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-123/values/'Opportunities'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "range": "Opportunities!A1:Z1000"
            })))
            .mount(&server)
            .await;

        let ws = service(&server, Some("tok"))
            .open_worksheet("sheet-123", "Opportunities")
            .await
            .unwrap();
        assert!(ws.get_all_values().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn appends_rows_in_one_request() {
        let server = MockServer::start().await;
        mount_metadata(&server).await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-123/values/'Opportunities':append"))
            .and(query_param("valueInputOption", "RAW"))
            .and(query_param("insertDataOption", "INSERT_ROWS"))
            .and(body_json(serde_json::json!({
                "majorDimension": "ROWS",
                "values": [["a", "b"], ["c", "d"]]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let ws = service(&server, Some("tok"))
            .open_worksheet("sheet-123", "Opportunities")
            .await
            .unwrap();
        ws.append_rows(&[vec!["a".into(), "b".into()], vec!["c".into(), "d".into()]])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn updates_single_cell_by_a1_range() {
        let server = MockServer::start().await;
        mount_metadata(&server).await;
        Mock::given(method("PUT"))
            .and(path("/v4/spreadsheets/sheet-123/values/'Opportunities'!D5"))
            .and(query_param("valueInputOption", "RAW"))
            .and(body_json(serde_json::json!({
                "range": "'Opportunities'!D5",
                "majorDimension": "ROWS",
                "values": [["Salt Lake City Arts Council"]]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let ws = service(&server, Some("tok"))
            .open_worksheet("sheet-123", "Opportunities")
            .await
            .unwrap();
        ws.update_cell(5, 4, "Salt Lake City Arts Council").await.unwrap();
    }

    #[tokio::test]
    async fn error_status_surfaces_as_http_status() {
        let server = MockServer::start().await;
        mount_metadata(&server).await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-123/values/'Opportunities'"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let ws = service(&server, Some("tok"))
            .open_worksheet("sheet-123", "Opportunities")
            .await
            .unwrap();
        let err = ws.get_all_values().await.unwrap_err();
        assert!(matches!(err, StoreError::HttpStatus { status: 403, .. }));
    }
}
