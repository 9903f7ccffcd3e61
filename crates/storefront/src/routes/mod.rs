//! HTTP route handlers for the checkout API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                          - Health check
//!
//! # Saved addresses (identity from the bearer token)
//! GET    /account/addresses               - List (empty for anonymous callers)
//! POST   /account/addresses               - Create
//! GET    /account/addresses/activity      - In-flight flags
//! PATCH  /account/addresses/{id}          - Update
//! DELETE /account/addresses/{id}          - Delete
//! POST   /account/addresses/{id}/default  - Make default
//!
//! # Checkout
//! GET    /checkout/address                - Current selection
//! PUT    /checkout/address                - Choose saved or manual address
//! ```

pub mod addresses;
pub mod checkout;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::state::AppState;

/// Create the account address routes router.
pub fn address_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(addresses::index).post(addresses::create))
        .route("/activity", get(addresses::activity))
        .route(
            "/{id}",
            patch(addresses::update).delete(addresses::delete),
        )
        .route("/{id}/default", post(addresses::set_default))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/address", get(checkout::show).put(checkout::choose))
}

/// Create all routes for the checkout API.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/account/addresses", address_routes())
        .nest("/checkout", checkout_routes())
}
