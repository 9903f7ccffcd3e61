//! Saved-address routes.
//!
//! Every mutation answers with a freshly re-fetched list so the client
//! replaces its copy instead of patching it. Once the write went through,
//! a failed re-fetch leaves `addresses` as `null` and the status stays 2xx.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use waypoint_core::{Address, AddressId, AddressPatch, NewAddress};

use crate::error::{Result, add_breadcrumb};
use crate::middleware::{Caller, JsonBody};
use crate::services::ActivitySnapshot;
use crate::state::AppState;

/// Response to a mutation: the reloaded list, plus the touched address.
#[derive(Debug, Serialize)]
pub struct AddressesResponse {
    /// `None` when the re-fetch failed; the client must reload.
    pub addresses: Option<Vec<Address>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

/// List the caller's addresses.
///
/// GET /account/addresses
///
/// Anonymous callers get `[]`.
pub async fn index(State(state): State<AppState>, caller: Caller) -> Result<Json<Vec<Address>>> {
    let store = state.address_store(&caller).await;
    Ok(Json(store.list(caller.user_id()).await?))
}

/// Create an address.
///
/// POST /account/addresses
pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    JsonBody(input): JsonBody<NewAddress>,
) -> Result<(StatusCode, Json<AddressesResponse>)> {
    let store = state.address_store(&caller).await;
    let created = store.create(caller.user_id(), &input).await?;
    add_breadcrumb("address", "Created address", None);

    let addresses = store.reload(caller.user_id()).await;
    Ok((
        StatusCode::CREATED,
        Json(AddressesResponse {
            addresses,
            address: Some(created),
        }),
    ))
}

/// Update an address.
///
/// PATCH /account/addresses/{id}
pub async fn update(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<AddressId>,
    JsonBody(patch): JsonBody<AddressPatch>,
) -> Result<Json<AddressesResponse>> {
    let store = state.address_store(&caller).await;
    let updated = store.update(caller.user_id(), id, &patch).await?;

    let addresses = store.reload(caller.user_id()).await;
    Ok(Json(AddressesResponse {
        addresses,
        address: Some(updated),
    }))
}

/// Delete an address. Deleting a missing address succeeds.
///
/// DELETE /account/addresses/{id}
pub async fn delete(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<AddressId>,
) -> Result<Json<AddressesResponse>> {
    let store = state.address_store(&caller).await;
    store.delete(caller.user_id(), id).await?;

    let addresses = store.reload(caller.user_id()).await;
    Ok(Json(AddressesResponse {
        addresses,
        address: None,
    }))
}

/// Make an address the caller's default.
///
/// POST /account/addresses/{id}/default
pub async fn set_default(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<AddressId>,
) -> Result<Json<AddressesResponse>> {
    let store = state.address_store(&caller).await;
    store.set_default(caller.user_id(), id).await?;
    let id_text = id.to_string();
    add_breadcrumb(
        "address",
        "Set default address",
        Some(&[("address_id", id_text.as_str())]),
    );

    let addresses = store.reload(caller.user_id()).await;
    Ok(Json(AddressesResponse {
        addresses,
        address: None,
    }))
}

/// The caller's in-flight address operations.
///
/// GET /account/addresses/activity
pub async fn activity(State(state): State<AppState>, caller: Caller) -> Json<ActivitySnapshot> {
    Json(state.activity(&caller).await)
}
