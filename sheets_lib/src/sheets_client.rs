use log::debug;
use reqwest::{header::HeaderMap, Client};
use serde::{Deserialize, Serialize};
use stack_string::{format_sstr, StackString};
use std::path::Path;
use url::Url;
use yup_oauth2::{read_service_account_key, ServiceAccountAuthenticator};

use sync_lib::{
    errors::SyncError as Error,
    sync_config::{SheetTarget, SyncConfig},
    sync_util::{column_letters, exponential_retry},
};
use sync_models::{
    sync_capabilities::{SheetReader, SheetWriter},
    write_plan::{CellValue, CellWrite},
};

const SHEETS_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Sheet name as it appears in an A1 range: always single-quoted, with
/// embedded quotes doubled.
#[must_use]
pub fn quote_sheet_name(sheet_name: &str) -> StackString {
    format_sstr!("'{}'", sheet_name.replace('\'', "''"))
}

/// `'Sheet1'!A2:A`, the rest of one column starting at `first_row`.
#[must_use]
pub fn column_range(sheet_name: &str, column: usize, first_row: u32) -> StackString {
    let letters = column_letters(column);
    format_sstr!(
        "{}!{letters}{first_row}:{letters}",
        quote_sheet_name(sheet_name)
    )
}

#[must_use]
pub fn cell_range(sheet_name: &str, cell: &CellWrite) -> StackString {
    format_sstr!("{}!{}", quote_sheet_name(sheet_name), cell.reference())
}

#[derive(Deserialize, Debug, Default)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Serialize, Debug)]
struct CellUpdate<'a> {
    range: StackString,
    values: [[&'a CellValue; 1]; 1],
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateRequest<'a> {
    value_input_option: &'static str,
    data: Vec<CellUpdate<'a>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateResponse {
    #[serde(default)]
    total_updated_cells: usize,
}

impl<'a> BatchUpdateRequest<'a> {
    fn new(sheet_name: &str, cells: &'a [CellWrite]) -> Self {
        let data = cells
            .iter()
            .map(|cell| CellUpdate {
                range: cell_range(sheet_name, cell),
                values: [[&cell.value]],
            })
            .collect();
        Self {
            value_input_option: "USER_ENTERED",
            data,
        }
    }
}

/// Cells come back as JSON strings, but be lenient about numbers and bools.
fn cell_text(value: &serde_json::Value) -> StackString {
    match value {
        serde_json::Value::String(s) => s.as_str().into(),
        serde_json::Value::Null => StackString::new(),
        v => StackString::from_display(v),
    }
}

#[derive(Clone, Debug)]
pub struct SheetsClient {
    pub client: Client,
    access_token: StackString,
}

impl SheetsClient {
    /// Authenticate with the service account key named in the config.
    ///
    /// # Errors
    /// Return error if the key file is missing or unreadable, or the token
    /// request fails
    pub async fn from_config(config: &SyncConfig) -> Result<Self, Error> {
        Self::from_service_account(&config.google_service_account_json).await
    }

    /// # Errors
    /// Return error if the key file is missing or unreadable, or the token
    /// request fails
    pub async fn from_service_account(path: &Path) -> Result<Self, Error> {
        if path.as_os_str().is_empty() || !path.exists() {
            return Err(Error::ConfigError(format_sstr!(
                "Google service account file not found at: {}",
                path.display()
            )));
        }
        let key = read_service_account_key(path).await?;
        let auth = ServiceAccountAuthenticator::builder(key).build().await?;
        let token = auth.token(&[SHEETS_SCOPE]).await?;
        let access_token = token
            .token()
            .ok_or_else(|| Error::AuthError("No access token from service account".into()))?
            .into();
        debug!("obtained sheets access token");
        Ok(Self {
            client: Client::new(),
            access_token,
        })
    }

    fn get_auth_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            format_sstr!("Bearer {}", self.access_token).parse()?,
        );
        Ok(headers)
    }

    fn values_url(spreadsheet_id: &str, range: &str) -> Result<Url, Error> {
        let mut url = Url::parse(SHEETS_URL)?;
        url.path_segments_mut()
            .map_err(|()| Error::StaticCustomError("Bad sheets url"))?
            .push(spreadsheet_id)
            .push("values")
            .push(range);
        url.query_pairs_mut().append_pair("majorDimension", "COLUMNS");
        Ok(url)
    }

    fn batch_update_url(spreadsheet_id: &str) -> Result<Url, Error> {
        let url = format_sstr!("{SHEETS_URL}/{spreadsheet_id}/values:batchUpdate");
        Ok(Url::parse(&url)?)
    }

    async fn get_value_range(&self, url: &Url, headers: &HeaderMap) -> Result<ValueRange, Error> {
        let resp = self
            .client
            .get(url.clone())
            .headers(headers.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp)
    }

    async fn post_batch_update(
        &self,
        url: &Url,
        headers: &HeaderMap,
        body: &BatchUpdateRequest<'_>,
    ) -> Result<BatchUpdateResponse, Error> {
        let resp = self
            .client
            .post(url.clone())
            .headers(headers.clone())
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp)
    }

    /// # Errors
    /// Return error if the request fails
    pub async fn get_column(
        &self,
        sheet: &SheetTarget,
        column: usize,
        first_row: u32,
    ) -> Result<Vec<StackString>, Error> {
        let range = column_range(&sheet.sheet_name, column, first_row);
        let url = Self::values_url(&sheet.spreadsheet_id, &range)?;
        let headers = self.get_auth_headers()?;
        let resp = exponential_retry(|| self.get_value_range(&url, &headers)).await?;
        let values: Vec<StackString> = resp
            .values
            .into_iter()
            .next()
            .unwrap_or_default()
            .iter()
            .map(cell_text)
            .collect();
        debug!("read {} cells from {range}", values.len());
        Ok(values)
    }

    /// # Errors
    /// Return error if the request fails
    pub async fn update_cells(
        &self,
        sheet: &SheetTarget,
        cells: &[CellWrite],
    ) -> Result<usize, Error> {
        if cells.is_empty() {
            return Ok(0);
        }
        let url = Self::batch_update_url(&sheet.spreadsheet_id)?;
        let headers = self.get_auth_headers()?;
        let body = BatchUpdateRequest::new(&sheet.sheet_name, cells);
        let resp = exponential_retry(|| self.post_batch_update(&url, &headers, &body)).await?;
        Ok(resp.total_updated_cells)
    }
}

impl SheetReader for SheetsClient {
    async fn read_column(
        &self,
        sheet: &SheetTarget,
        column: usize,
        first_row: u32,
    ) -> Result<Vec<StackString>, Error> {
        self.get_column(sheet, column, first_row).await
    }
}

impl SheetWriter for SheetsClient {
    async fn batch_write(&self, sheet: &SheetTarget, cells: &[CellWrite]) -> Result<usize, Error> {
        self.update_cells(sheet, cells).await
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use sync_lib::{
        errors::SyncError as Error,
        sync_config::{SheetTarget, SyncConfig},
    };
    use sync_models::{
        sync_capabilities::SheetReader,
        write_plan::{CellValue, CellWrite},
    };

    use crate::sheets_client::{
        cell_range, cell_text, column_range, quote_sheet_name, BatchUpdateRequest, SheetsClient,
        ValueRange,
    };

    #[test]
    fn test_quote_sheet_name() {
        assert_eq!(quote_sheet_name("Sheet1").as_str(), "'Sheet1'");
        assert_eq!(quote_sheet_name("Runs 2024").as_str(), "'Runs 2024'");
        assert_eq!(quote_sheet_name("Dan's Log").as_str(), "'Dan''s Log'");
    }

    #[test]
    fn test_ranges() {
        assert_eq!(column_range("Sheet1", 1, 2).as_str(), "'Sheet1'!A2:A");
        assert_eq!(column_range("Log", 28, 1).as_str(), "'Log'!AB1:AB");
        let cell = CellWrite {
            row: 12,
            column: 5,
            value: CellValue::Number(3.1),
        };
        assert_eq!(cell_range("Sheet1", &cell).as_str(), "'Sheet1'!E12");
    }

    #[test]
    fn test_values_url_encodes_range() -> Result<(), Error> {
        let url = SheetsClient::values_url("abc123", "'My Sheet'!A1:A")?;
        assert!(url
            .as_str()
            .starts_with("https://sheets.googleapis.com/v4/spreadsheets/abc123/values/"));
        assert!(!url.path().contains(' '));
        assert_eq!(url.query(), Some("majorDimension=COLUMNS"));
        let url = SheetsClient::batch_update_url("abc123")?;
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values:batchUpdate"
        );
        Ok(())
    }

    #[test]
    fn test_batch_update_body() -> Result<(), Error> {
        let cells = [
            CellWrite {
                row: 3,
                column: 5,
                value: CellValue::Number(5.0),
            },
            CellWrite {
                row: 3,
                column: 6,
                value: CellValue::Text("8:03".into()),
            },
        ];
        let body = BatchUpdateRequest::new("Sheet1", &cells);
        let body = serde_json::to_value(&body)?;
        let expected = serde_json::json!({
            "valueInputOption": "USER_ENTERED",
            "data": [
                {"range": "'Sheet1'!E3", "values": [[5.0]]},
                {"range": "'Sheet1'!F3", "values": [["8:03"]]},
            ]
        });
        assert_eq!(body, expected);
        Ok(())
    }

    #[test]
    fn test_value_range_parsing() -> Result<(), Error> {
        let resp: ValueRange = serde_json::from_str(
            r#"{"range": "Sheet1!A1:A4", "majorDimension": "COLUMNS",
                "values": [["Date", "2024-03-01", "", "03/02/2024"]]}"#,
        )?;
        let column: Vec<String> = resp.values[0]
            .iter()
            .map(|v| cell_text(v).to_string())
            .collect();
        assert_eq!(column, vec!["Date", "2024-03-01", "", "03/02/2024"]);

        let resp: ValueRange = serde_json::from_str(r#"{"range": "Sheet1!A1:A"}"#)?;
        assert!(resp.values.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_service_account_is_config_error() {
        let err = SheetsClient::from_service_account(Path::new("/nonexistent/key.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[tokio::test]
    #[ignore]
    async fn test_read_column_live() -> Result<(), Error> {
        let config = SyncConfig::get_config(None)?;
        let sheet: SheetTarget = config.sheet_target()?;
        let client = SheetsClient::from_config(&config).await?;
        let column = client
            .read_column(&sheet, config.date_column, config.header_rows + 1)
            .await?;
        assert!(!column.is_empty());
        Ok(())
    }
}
