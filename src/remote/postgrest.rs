use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::debug;

use super::{Filter, Query, RemoteStore};
use crate::error::{RebanhoError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// REST client for the hosted database (PostgREST dialect).
pub struct PostgrestClient {
    base_url: String,
    api_key: String,
    access_token: RwLock<Option<String>>,
    client: Client,
}

impl PostgrestClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RebanhoError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            access_token: RwLock::new(None),
            client,
        })
    }

    /// Use a signed-in user's token instead of the anonymous key for
    /// row-level security. `None` reverts to the anonymous key.
    pub fn set_access_token(&self, token: Option<String>) {
        if let Ok(mut slot) = self.access_token.write() {
            *slot = token;
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .access_token
            .read()
            .ok()
            .and_then(|t| t.clone())
            .unwrap_or_else(|| self.api_key.clone());
        request
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| RebanhoError::Unreachable(e.to_string()))?;
        check_status(response).await
    }
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| (f.column.clone(), format!("eq.{}", f.value)))
        .collect()
}

/// Map a non-success response onto the error taxonomy: gateway failures
/// mean the service is unreachable, anything else is a rejection.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);

    match status {
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            Err(RebanhoError::Unreachable(format!("{}: {}", status, message)))
        }
        _ => Err(RebanhoError::Rejected {
            status: status.as_u16(),
            message,
        }),
    }
}

#[async_trait]
impl RemoteStore for PostgrestClient {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        let mut params = vec![("select".to_string(), query.select_clause())];
        params.extend(filter_params(&query.filters));
        if let Some(order) = query.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }

        debug!(table, "select");
        let response = self
            .send(self.client.get(self.table_url(table)).query(&params))
            .await?;
        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| RebanhoError::Unreachable(format!("malformed response: {}", e)))?;
        Ok(rows)
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<()> {
        debug!(table, count = rows.len(), "insert");
        self.send(
            self.client
                .post(self.table_url(table))
                .header("Prefer", "return=minimal")
                .json(&rows),
        )
        .await?;
        Ok(())
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<usize> {
        debug!(table, filters = filters.len(), "update");
        let mut params = vec![("select".to_string(), "id".to_string())];
        params.extend(filter_params(filters));

        // Ask for the matched ids back so conditional updates can tell a
        // miss from a hit.
        let response = self
            .send(
                self.client
                    .patch(self.table_url(table))
                    .query(&params)
                    .header("Prefer", "return=representation")
                    .json(&patch),
            )
            .await?;
        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| RebanhoError::Unreachable(format!("malformed response: {}", e)))?;
        Ok(rows.len())
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<()> {
        debug!(table, column = %filter.column, "delete");
        self.send(
            self.client
                .delete(self.table_url(table))
                .query(&filter_params(std::slice::from_ref(filter))),
        )
        .await?;
        Ok(())
    }
}
