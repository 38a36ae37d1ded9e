/// REST API client used by the MCP tools.
///
/// The tools never touch the database directly; they go through the
/// `/ofacParty` API so the MCP server can front a remote deployment.

use std::time::Duration;

use serde_json::Value;

use crate::core::config::ServerConfig;
use crate::core::error::ApiClientError;

/// Longest error message taken from a non-JSON error body.
const MAX_ERROR_MESSAGE_CHARS: usize = 300;

pub struct OfacApiClient {
    http: reqwest::Client,
    api_endpoint: String,
    search_endpoint: String,
}

impl OfacApiClient {
    pub fn new(
        api_endpoint: impl Into<String>,
        search_endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_endpoint: api_endpoint.into(),
            search_endpoint: search_endpoint.into(),
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, reqwest::Error> {
        Self::new(config.api_endpoint(), config.search_endpoint(), config.api_timeout)
    }

    pub fn api_endpoint(&self) -> &str {
        &self.api_endpoint
    }

    pub fn search_endpoint(&self) -> &str {
        &self.search_endpoint
    }

    /// GET /ofacParty?partyId=N and unwrap the `data` object.
    pub async fn get_party(&self, party_id: i64) -> Result<Value, ApiClientError> {
        let query = [("partyId", party_id.to_string())];
        self.fetch(&self.api_endpoint, &query, serde_json::json!({})).await
    }

    /// GET /ofacParty/search with the given query and unwrap the `data` list.
    pub async fn search(&self, query: &[(&str, String)]) -> Result<Value, ApiClientError> {
        tracing::debug!("search request => {} params={:?}", self.search_endpoint, query);
        self.fetch(&self.search_endpoint, query, serde_json::json!([])).await
    }

    async fn fetch(
        &self,
        url: &str,
        query: &[(&str, String)],
        empty: Value,
    ) -> Result<Value, ApiClientError> {
        let response = self.http.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiClientError::Status {
                status: status.as_u16(),
                message: extract_error_message(status.as_u16(), &body),
            });
        }

        let body: Value = response.json().await?;
        if body.get("resultCd").and_then(Value::as_bool) == Some(true) {
            Ok(body.get("data").cloned().unwrap_or(empty))
        } else {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("API returned error");
            Err(ApiClientError::Business(message.to_string()))
        }
    }
}

/// Message for a non-2xx response: the envelope's `message` when the body
/// is JSON, otherwise status and body text, capped in length.
pub fn extract_error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(json) if json.is_object() => json
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("API Error: {}", status)),
        _ => format!("API Error: {} - {}", status, body)
            .chars()
            .take(MAX_ERROR_MESSAGE_CHARS)
            .collect(),
    }
}
