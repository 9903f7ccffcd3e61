//! Access-token to identity resolution.
//!
//! The address store never talks to the auth provider; handlers resolve the
//! bearer token here first and pass the resulting [`UserId`] (or `None`)
//! down. Successful lookups are cached so repeated requests with the same
//! token don't hit the auth endpoint.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};
use waypoint_core::UserId;

use crate::models::Identity;
use crate::remote::RestClient;

/// Errors from the identity provider.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Auth endpoint returned an unexpected status.
    #[error("Auth endpoint returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Auth endpoint returned a user without a usable id.
    #[error("Invalid user payload: {0}")]
    InvalidUser(String),
}

/// Resolves the current user from an access token.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The identity behind `access_token`, or `None` if the token is not
    /// (or no longer) valid.
    ///
    /// # Errors
    ///
    /// Returns an error only if the provider could not be asked.
    async fn current_user(
        &self,
        access_token: &SecretString,
    ) -> Result<Option<Identity>, IdentityError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth endpoint
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Identity provider backed by the remote project's `/auth/v1/user` endpoint.
#[derive(Clone)]
pub struct RestIdentityProvider {
    client: RestClient,
    cache: Cache<String, Identity>,
}

impl RestIdentityProvider {
    /// Create a provider caching positive lookups for `ttl`.
    #[must_use]
    pub fn new(client: RestClient, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(ttl)
            .build();

        Self { client, cache }
    }

    async fn fetch(&self, access_token: &SecretString) -> Result<Option<Identity>, IdentityError> {
        let url = format!("{}/auth/v1/user", self.client.base_url());

        let response = self
            .client
            .http()
            .get(&url)
            .header("apikey", self.client.api_key().expose_secret())
            .header(
                "Authorization",
                format!("Bearer {}", access_token.expose_secret()),
            )
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            debug!(%status, "Access token rejected");
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(IdentityError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let user: AuthUser = response.json().await?;
        let user_id = user
            .id
            .parse::<UserId>()
            .map_err(|e| IdentityError::InvalidUser(e.to_string()))?;

        Ok(Some(Identity {
            user_id,
            email: user.email,
        }))
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    #[instrument(skip_all)]
    async fn current_user(
        &self,
        access_token: &SecretString,
    ) -> Result<Option<Identity>, IdentityError> {
        let key = access_token.expose_secret().to_string();

        if let Some(identity) = self.cache.get(&key).await {
            debug!("Cache hit for identity");
            return Ok(Some(identity));
        }

        let identity = self.fetch(access_token).await?;
        if let Some(identity) = &identity {
            self.cache.insert(key, identity.clone()).await;
        }
        Ok(identity)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Local
// ─────────────────────────────────────────────────────────────────────────────

/// Identity provider with a fixed token table.
///
/// Used with the in-memory backend. When `accept_uuid_tokens` is set, a
/// bearer token that parses as a UUID is taken as that user's id, which is
/// convenient for local development.
#[derive(Debug, Clone, Default)]
pub struct LocalIdentityProvider {
    tokens: HashMap<String, Identity>,
    accept_uuid_tokens: bool,
}

impl LocalIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept any UUID-shaped token as the id of the caller.
    #[must_use]
    pub const fn accepting_uuid_tokens(mut self) -> Self {
        self.accept_uuid_tokens = true;
        self
    }

    /// Register `token` as belonging to `identity`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn current_user(
        &self,
        access_token: &SecretString,
    ) -> Result<Option<Identity>, IdentityError> {
        let token = access_token.expose_secret();

        if let Some(identity) = self.tokens.get(token) {
            return Ok(Some(identity.clone()));
        }
        if self.accept_uuid_tokens {
            return Ok(token.parse::<UserId>().ok().map(Identity::new));
        }
        Ok(None)
    }
}
