//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-side errors to
//! Sentry before responding. All route handlers return `Result<T, AppError>`.
//! Error bodies are JSON: `{ "error": "..." }`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::{AddressStoreError, CheckoutError, IdentityError};

/// Application-level error type for the checkout API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Address store operation failed.
    #[error("Address error: {0}")]
    Address(#[from] AddressStoreError),

    /// The identity provider could not be asked.
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Session read or write failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request body could not be decoded.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Address(err) => Self::Address(err),
            CheckoutError::Session(err) => Self::Session(err),
            CheckoutError::UnknownAddress(id) => Self::NotFound(format!("address {id}")),
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl AppError {
    /// Whether this error is our (or an upstream's) fault rather than the client's.
    const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Address(AddressStoreError::Persistence { .. })
                | Self::Identity(_)
                | Self::Session(_)
        )
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Address(err) => match err {
                AddressStoreError::Validation(_) => StatusCode::BAD_REQUEST,
                AddressStoreError::NotFound(_) => StatusCode::NOT_FOUND,
                AddressStoreError::Unauthenticated => StatusCode::UNAUTHORIZED,
                AddressStoreError::Persistence { .. } => StatusCode::BAD_GATEWAY,
            },
            Self::Identity(_) => StatusCode::BAD_GATEWAY,
            Self::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Client-facing message. Server-side detail is never exposed.
    fn public_message(&self) -> String {
        match self {
            Self::Address(err) => match err {
                AddressStoreError::Validation(inner) => inner.to_string(),
                AddressStoreError::NotFound(_) => "Address not found".to_string(),
                AddressStoreError::Unauthenticated => "Sign in to manage addresses".to_string(),
                AddressStoreError::Persistence { .. } => {
                    "Could not reach the address service".to_string()
                }
            },
            Self::Identity(_) => "Could not verify sign-in".to_string(),
            Self::Session(_) => "Internal server error".to_string(),
            Self::BadRequest(message) => message.clone(),
            Self::NotFound(_) => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = ErrorBody {
            error: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Called once the bearer token resolves so errors are associated with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("address", "Set default address", Some(&[("address_id", "…")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
