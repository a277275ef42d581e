//! HTTP fetch of 2-D cell ranges from the read-only tabular source.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::error::SheetsError;
use crate::status::credential::CredentialCache;

const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Where one dataset lives: sheet id + tab name + cell range, and how many
/// non-data header rows to skip.
#[derive(Debug, Clone, Copy)]
pub struct DatasetSource {
    pub sheet_id: &'static str,
    pub sheet_name: &'static str,
    pub range: &'static str,
    pub header_rows: usize,
}

/// Fetches raw cell values for a dataset.
#[async_trait]
pub trait ValuesFetcher: Send + Sync {
    async fn fetch_values(&self, source: &DatasetSource) -> Result<Vec<Vec<String>>, SheetsError>;
}

#[derive(Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Bearer-token HTTP client for the sheets API.
pub struct SheetsClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<CredentialCache>,
}

impl SheetsClient {
    pub fn new(http: reqwest::Client, credentials: Arc<CredentialCache>) -> Self {
        Self {
            http,
            base_url: SHEETS_API_URL.to_string(),
            credentials,
        }
    }

    /// Override the API base (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ValuesFetcher for SheetsClient {
    async fn fetch_values(&self, source: &DatasetSource) -> Result<Vec<Vec<String>>, SheetsError> {
        let token = self.credentials.token().await?;

        let url = format!(
            "{}/{}/values/{}!{}",
            self.base_url, source.sheet_id, source.sheet_name, source.range
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| SheetsError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SheetsError::Api {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let parsed: ValuesResponse = response
            .json()
            .await
            .map_err(|e| SheetsError::MalformedResponse(e.to_string()))?;
        Ok(parsed.values)
    }
}
