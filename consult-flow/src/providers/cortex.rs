use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::error::{ConsultError, Result};
use crate::services::{CATEGORY_FIELD, Retriever, SearchRequest, SearchResponse};

/// Columns every search service in the corpus returns
pub const COLUMNS: [&str; 3] = ["chunk", "relative_path", CATEGORY_FIELD];

/// A Snowflake Cortex Search service queried over its REST API
pub struct CortexSearch {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl CortexSearch {
    pub fn new(
        account_url: &str,
        database: &str,
        schema: &str,
        service: &str,
        token: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(ConsultError::external)?;

        Ok(Self {
            client,
            url: query_url(account_url, database, schema, service),
            token: token.into(),
        })
    }
}

fn query_url(account_url: &str, database: &str, schema: &str, service: &str) -> String {
    format!(
        "{}/api/v2/databases/{database}/schemas/{schema}/cortex-search-services/{service}:query",
        account_url.trim_end_matches('/')
    )
}

fn request_body(request: &SearchRequest) -> Value {
    let mut body = json!({
        "query": request.query,
        "columns": COLUMNS,
        "limit": request.limit,
    });
    if let Some(filter) = &request.filter {
        body["filter"] = json!({ "@eq": filter });
    }
    body
}

#[async_trait]
impl Retriever for CortexSearch {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        debug!(url = %self.url, query = %request.query, limit = request.limit, "cortex search");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .json(&request_body(request))
            .send()
            .await
            .map_err(ConsultError::external)?;

        let status = response.status();
        let text = response.text().await.map_err(ConsultError::external)?;
        if !status.is_success() {
            return Err(ConsultError::External(format!(
                "search service returned {status}: {text}"
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| ConsultError::External(format!("unreadable search response: {e}")))
    }
}
