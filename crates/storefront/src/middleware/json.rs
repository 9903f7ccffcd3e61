//! JSON request bodies with JSON error responses.
//!
//! axum's own [`Json`] extractor answers a bad body with a plain-text
//! rejection. [`JsonBody`] routes the same failures through [`AppError`] so
//! every error the API returns has the `{ "error": "..." }` shape.

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};

use crate::error::AppError;

/// A JSON request body. Any decode failure is a 400.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| {
                tracing::debug!(status = %rejection.status(), "Rejected request body");
                AppError::BadRequest(rejection.body_text())
            })?;
        Ok(Self(value))
    }
}
