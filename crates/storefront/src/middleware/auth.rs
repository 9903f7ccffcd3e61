//! Caller identity extractor.
//!
//! Resolves `Authorization: Bearer <token>` through the identity provider.
//! A missing or rejected token yields an anonymous caller rather than an
//! error: listing then returns nothing and mutations fail with 401 inside
//! the address store.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use secrecy::SecretString;
use waypoint_core::UserId;

use crate::error::{AppError, set_sentry_user};
use crate::models::Identity;
use crate::state::AppState;

/// The caller of the current request.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(State(state): State<AppState>, caller: Caller) -> Result<Json<Vec<Address>>> {
///     let store = state.address_store(&caller).await;
///     Ok(Json(store.list(caller.user_id()).await?))
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Caller {
    identity: Option<Identity>,
    access_token: Option<SecretString>,
}

impl Caller {
    /// An anonymous caller.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A signed-in caller holding `access_token`.
    #[must_use]
    pub fn signed_in(identity: Identity, access_token: SecretString) -> Self {
        Self {
            identity: Some(identity),
            access_token: Some(access_token),
        }
    }

    /// The signed-in user's id, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.identity.as_ref().map(|i| i.user_id)
    }

    /// The verified access token, forwarded to the remote store.
    #[must_use]
    pub const fn access_token(&self) -> Option<&SecretString> {
        self.access_token.as_ref()
    }
}

/// Extract a bearer token from the `Authorization` header.
fn bearer_token(headers: &HeaderMap) -> Option<SecretString> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty())
        .then(|| SecretString::from(token.to_string()))
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(Self::anonymous());
        };

        let Some(identity) = state.identity().current_user(&token).await? else {
            tracing::debug!("Bearer token did not resolve to a user");
            return Ok(Self::anonymous());
        };

        set_sentry_user(&identity.user_id, identity.email.as_deref());
        Ok(Self::signed_in(identity, token))
    }
}
