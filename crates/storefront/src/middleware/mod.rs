//! HTTP middleware stack for the checkout API.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (hub per request, capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Session layer (tower-sessions with in-memory store)
//!
//! The [`Caller`] extractor then resolves the bearer token per handler, and
//! [`JsonBody`] decodes request bodies with JSON error responses.

pub mod auth;
pub mod json;
pub mod request_id;
pub mod session;

pub use auth::Caller;
pub use json::JsonBody;
pub use request_id::{RequestId, request_id_middleware};
pub use session::create_session_layer;
