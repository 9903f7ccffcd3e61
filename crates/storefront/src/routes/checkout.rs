//! Checkout address selection routes.

use axum::{Json, extract::State};
use tower_sessions::Session;

use crate::error::Result;
use crate::middleware::{Caller, JsonBody};
use crate::services::{AddressBook, ChooseAddress, checkout};
use crate::state::AppState;

/// Current selection, defaulting to the caller's default address.
///
/// GET /checkout/address
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    caller: Caller,
) -> Result<Json<AddressBook>> {
    let store = state.address_store(&caller).await;
    let book = checkout::load(&store, &session, caller.user_id()).await?;
    Ok(Json(book))
}

/// Choose a saved address or enter one manually.
///
/// PUT /checkout/address
///
/// ```json
/// { "kind": "saved", "address_id": "…" }
/// { "kind": "manual", "text": "12 Palm Rd", "save": true }
/// ```
pub async fn choose(
    State(state): State<AppState>,
    session: Session,
    caller: Caller,
    JsonBody(choice): JsonBody<ChooseAddress>,
) -> Result<Json<AddressBook>> {
    let store = state.address_store(&caller).await;
    let book = checkout::choose(&store, &session, caller.user_id(), choice).await?;
    Ok(Json(book))
}
