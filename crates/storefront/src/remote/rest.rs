//! PostgREST client for the remote address table.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use super::{Filter, OrderBy, RemoteError, RemoteStore};
use crate::config::RemoteStoreConfig;

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// Shared HTTP client for the remote store.
///
/// Cheap to clone. Use [`RestClient::as_user`] to obtain a handle that sends
/// a customer's access token so row-level security applies.
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<RestClientInner>,
}

struct RestClientInner {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl RestClient {
    /// Create a client from configuration.
    #[must_use]
    pub fn new(config: &RemoteStoreConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Create a client sharing an existing `reqwest` connection pool.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: &RemoteStoreConfig) -> Self {
        Self {
            inner: Arc::new(RestClientInner {
                client,
                base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
                api_key: config.api_key.clone(),
            }),
        }
    }

    /// The project base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// The project API key.
    #[must_use]
    pub fn api_key(&self) -> &SecretString {
        &self.inner.api_key
    }

    /// The shared `reqwest` client.
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.client
    }

    /// A store handle acting as the holder of `access_token`.
    ///
    /// Without a token, requests authenticate with the project key alone.
    #[must_use]
    pub fn as_user(&self, access_token: Option<SecretString>) -> RestStore {
        RestStore {
            client: self.clone(),
            access_token,
        }
    }
}

/// A [`RemoteStore`] bound to one caller's credentials.
#[derive(Clone)]
pub struct RestStore {
    client: RestClient,
    access_token: Option<SecretString>,
}

impl RestStore {
    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.client.base_url())
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        let api_key = self.client.api_key().expose_secret();
        let bearer = self
            .access_token
            .as_ref()
            .map_or(api_key, |token| token.expose_secret());

        self.client
            .http()
            .request(method, self.table_url(table))
            .header("apikey", api_key)
            .header("Authorization", format!("Bearer {bearer}"))
            .header("Accept", "application/json")
    }

    /// Send a request and decode the JSON array of rows it returns.
    async fn rows(&self, request: reqwest::RequestBuilder) -> Result<Vec<Value>, RemoteError> {
        let response = request.send().await?;
        let response = check_status(response).await?;

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Turn a non-success response into [`RemoteError::Status`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<PostgrestError>(&text)
        .ok()
        .and_then(|body| match (body.message, body.hint) {
            (Some(message), Some(hint)) => Some(format!("{message} ({hint})")),
            (message, _) => message,
        })
        .unwrap_or(text);

    Err(RemoteError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Render filter conditions as PostgREST query parameters.
fn filter_params(filter: &Filter) -> Vec<(String, String)> {
    filter
        .conditions()
        .iter()
        .map(|c| {
            (
                c.column.to_string(),
                format!("{}.{}", c.operator.as_str(), c.value),
            )
        })
        .collect()
}

/// Render ordering keys as a PostgREST `order` parameter.
fn order_param(order: &[OrderBy]) -> Option<(String, String)> {
    if order.is_empty() {
        return None;
    }
    let keys: Vec<String> = order
        .iter()
        .map(|o| {
            let direction = if o.descending { "desc" } else { "asc" };
            format!("{}.{direction}", o.column)
        })
        .collect();
    Some(("order".to_string(), keys.join(",")))
}

#[async_trait]
impl RemoteStore for RestStore {
    #[instrument(skip(self, filter, order), fields(table = %table))]
    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        order: &[OrderBy],
    ) -> Result<Vec<Value>, RemoteError> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(filter_params(filter));
        params.extend(order_param(order));

        self.rows(self.request(reqwest::Method::GET, table).query(&params))
            .await
    }

    #[instrument(skip(self, row), fields(table = %table))]
    async fn insert(&self, table: &str, row: Value) -> Result<Value, RemoteError> {
        let request = self
            .request(reqwest::Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&row);

        self.rows(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Unexpected("insert returned no row".to_string()))
    }

    #[instrument(skip(self, patch, filter), fields(table = %table))]
    async fn update(
        &self,
        table: &str,
        patch: Value,
        filter: &Filter,
    ) -> Result<Vec<Value>, RemoteError> {
        let request = self
            .request(reqwest::Method::PATCH, table)
            .header("Prefer", "return=representation")
            .query(&filter_params(filter))
            .json(&patch);

        self.rows(request).await
    }

    #[instrument(skip(self, filter), fields(table = %table))]
    async fn delete(&self, table: &str, filter: &Filter) -> Result<(), RemoteError> {
        let request = self
            .request(reqwest::Method::DELETE, table)
            .header("Prefer", "return=minimal")
            .query(&filter_params(filter));

        let response = request.send().await?;
        check_status(response).await?;
        Ok(())
    }
}
