//! Integration test support for Waypoint.
//!
//! Everything runs in-process against the in-memory remote store: no
//! network, no database.
//!
//! # Test Categories
//!
//! - `address_store` - single-default invariant and failure scenarios
//! - `checkout_routes` - HTTP surface through the full router

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::Value;
use tower::ServiceExt;
use waypoint_core::UserId;
use waypoint_storefront::{
    app,
    config::StorefrontConfig,
    models::Identity,
    remote::{MemoryStore, StoreBackend},
    services::{ActivityFlags, AddressStore, LocalIdentityProvider},
    state::AppState,
};

/// Address table used by every test.
pub const TABLE: &str = "customer_addresses";

/// A signed-in test user.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: UserId,
    pub token: String,
}

impl TestUser {
    fn new(name: &str) -> Self {
        Self {
            id: UserId::random(),
            token: format!("{name}-token"),
        }
    }

    #[must_use]
    pub const fn owner(&self) -> Option<UserId> {
        Some(self.id)
    }
}

/// Address store wired straight to a fresh in-memory table.
#[must_use]
pub fn memory_address_store() -> (AddressStore, MemoryStore) {
    let memory = MemoryStore::new();
    let store = AddressStore::new(
        Arc::new(memory.clone()),
        TABLE,
        Arc::new(ActivityFlags::new()),
    );
    (store, memory)
}

/// A full router over the in-memory backend, with two known users.
pub struct TestApp {
    pub router: Router,
    pub memory: MemoryStore,
    pub alice: TestUser,
    pub bob: TestUser,
    cookie: Mutex<Option<String>>,
}

/// Decoded response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestApp {
    #[must_use]
    pub fn new() -> Self {
        let alice = TestUser::new("alice");
        let bob = TestUser::new("bob");
        let memory = MemoryStore::new();

        let identity = LocalIdentityProvider::new()
            .with_token(alice.token.clone(), Identity::new(alice.id))
            .with_token(bob.token.clone(), Identity::new(bob.id));

        let state = AppState::with_backends(
            StorefrontConfig::in_memory(),
            StoreBackend::Memory(memory.clone()),
            Arc::new(identity),
        );

        Self {
            router: app(state),
            memory,
            alice,
            bob,
            cookie: Mutex::new(None),
        }
    }

    /// Send a request, keeping the session cookie between calls.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        user: Option<&TestUser>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", user.token));
        }
        if let Some(cookie) = self.cookie.lock().unwrap().clone() {
            builder = builder.header(header::COOKIE, cookie);
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();

        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie
                .to_str()
                .unwrap()
                .split(';')
                .next()
                .unwrap_or_default()
                .to_string();
            *self.cookie.lock().unwrap() = Some(pair);
        }

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse { status, body }
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Ids of the default-flagged addresses in a JSON address list.
#[must_use]
pub fn default_ids(addresses: &Value) -> Vec<String> {
    addresses
        .as_array()
        .map(|list| {
            list.iter()
                .filter(|a| a["is_default"] == Value::Bool(true))
                .filter_map(|a| a["id"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}
