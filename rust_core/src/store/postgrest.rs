//! Supabase / PostgREST backend.

use super::{validate_identifier, Result, StoreError, TableStore};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Clone)]
pub struct PostgrestStore {
    client: Client,
    base_url: String,
    page_size: usize,
}

impl std::fmt::Debug for PostgrestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestStore")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl PostgrestStore {
    /// `base_url` is the project URL (`https://<ref>.supabase.co`); the
    /// REST prefix is appended unless already present.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key)
            .map_err(|e| StoreError::Config(format!("api key: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| StoreError::Config(format!("api key: {e}")))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()?;

        let trimmed = base_url.trim_end_matches('/');
        let base_url = if trimmed.ends_with("/rest/v1") {
            trimmed.to_string()
        } else {
            format!("{trimmed}/rest/v1")
        };

        Ok(Self {
            client,
            base_url,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn table_url(&self, table: &str) -> Result<String> {
        Ok(format!("{}/{}", self.base_url, validate_identifier(table)?))
    }

    async fn check(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(StoreError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl TableStore for PostgrestStore {
    async fn select_all(&self, table: &str) -> Result<Vec<Value>> {
        let url = self.table_url(table)?;
        let mut rows = Vec::new();
        let mut start = 0usize;

        loop {
            let end = start + self.page_size - 1;
            let resp = self
                .client
                .get(&url)
                .query(&[("select", "*")])
                .header("Range-Unit", "items")
                .header("Range", format!("{start}-{end}"))
                .send()
                .await?;
            let page: Vec<Value> = Self::check(resp).await?.json().await?;
            let fetched = page.len();
            rows.extend(page);
            debug!(table, start, fetched, "Fetched page");

            if fetched < self.page_size {
                break;
            }
            start += self.page_size;
        }
        Ok(rows)
    }

    async fn delete_all(&self, table: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.table_url(table)?)
            .query(&[("id", "neq.-1")])
            .header("Prefer", "return=minimal")
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn insert_batch(&self, table: &str, rows: &[Value]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let resp = self
            .client
            .post(self.table_url(table)?)
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(rows.len())
    }

    fn name(&self) -> &str {
        "postgrest"
    }
}
