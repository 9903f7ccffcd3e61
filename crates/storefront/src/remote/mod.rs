//! Remote relational store clients.
//!
//! # Architecture
//!
//! - The address table lives in a remote, network-accessible store with
//!   row-level authorization enforced server-side
//! - Access is request/response only: `select`, `insert`, `update`, `delete`
//! - No multi-row transactions are available through this interface
//! - Rows travel as JSON objects keyed by column name
//!
//! # Backends
//!
//! - [`RestClient`] / [`RestStore`] - PostgREST dialect over `reqwest`,
//!   scoped to one customer's access token per request
//! - [`MemoryStore`] - in-process table used for local development and tests
//!
//! # Example
//!
//! ```rust,ignore
//! use waypoint_storefront::remote::{Filter, OrderBy, RemoteStore};
//!
//! let rows = store
//!     .select(
//!         "customer_addresses",
//!         &Filter::new().eq("user_id", owner),
//!         &[OrderBy::desc("is_default"), OrderBy::desc("created_at")],
//!     )
//!     .await?;
//! ```

mod memory;
mod rest;

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;
use thiserror::Error;

pub use memory::{CallKind, MemoryStore, RemoteCall};
pub use rest::{RestClient, RestStore};

/// Errors that can occur when talking to the remote store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status (authorization denials
    /// and constraint violations included).
    #[error("Remote store rejected request ({status}): {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message reported by the store.
        message: String,
    },

    /// A row could not be encoded or decoded.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The store answered successfully but without the expected payload.
    #[error("Unexpected response: {0}")]
    Unexpected(String),

    /// The store is unreachable (used by the in-memory store's failure injection).
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
}

/// Comparison applied to one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Neq,
}

impl Operator {
    /// PostgREST operator prefix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
        }
    }
}

/// One `column <op> value` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub column: &'static str,
    pub operator: Operator,
    pub value: String,
}

/// Conjunction of column conditions. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Create an empty filter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    /// Require `column = value`.
    #[must_use]
    pub fn eq(self, column: &'static str, value: impl ToString) -> Self {
        self.with(column, Operator::Eq, value)
    }

    /// Require `column <> value`.
    #[must_use]
    pub fn neq(self, column: &'static str, value: impl ToString) -> Self {
        self.with(column, Operator::Neq, value)
    }

    fn with(mut self, column: &'static str, operator: Operator, value: impl ToString) -> Self {
        self.conditions.push(Condition {
            column,
            operator,
            value: value.to_string(),
        });
        self
    }

    /// The conditions, in the order they were added.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Whether the filter constrains `column` with `operator`.
    #[must_use]
    pub fn constrains(&self, column: &str, operator: Operator) -> bool {
        self.conditions
            .iter()
            .any(|c| c.column == column && c.operator == operator)
    }

    /// Evaluate the filter against a JSON row.
    ///
    /// Missing columns compare as SQL `NULL`: they never match `eq` and
    /// never match `neq` either.
    #[must_use]
    pub fn matches(&self, row: &Value) -> bool {
        self.conditions.iter().all(|c| {
            let Some(actual) = row.get(c.column).and_then(column_text) else {
                return false;
            };
            match c.operator {
                Operator::Eq => actual == c.value,
                Operator::Neq => actual != c.value,
            }
        })
    }
}

/// Render a scalar column value the way it appears in a filter.
pub(crate) fn column_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
    }
}

/// One ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: &'static str,
    pub descending: bool,
}

impl OrderBy {
    #[must_use]
    pub const fn asc(column: &'static str) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    #[must_use]
    pub const fn desc(column: &'static str) -> Self {
        Self {
            column,
            descending: true,
        }
    }
}

/// Request/response access to a remote relational table.
///
/// Implementations must not retry; every failure is reported to the caller
/// as a [`RemoteError`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read rows matching `filter`, ordered by `order`.
    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        order: &[OrderBy],
    ) -> Result<Vec<Value>, RemoteError>;

    /// Insert one row; returns it with server-populated fields.
    async fn insert(&self, table: &str, row: Value) -> Result<Value, RemoteError>;

    /// Apply `patch` to every row matching `filter`; returns the updated rows.
    async fn update(
        &self,
        table: &str,
        patch: Value,
        filter: &Filter,
    ) -> Result<Vec<Value>, RemoteError>;

    /// Delete every row matching `filter`. Deleting nothing is not an error.
    async fn delete(&self, table: &str, filter: &Filter) -> Result<(), RemoteError>;
}

/// The configured remote store, able to hand out per-caller handles.
#[derive(Clone)]
pub enum StoreBackend {
    Rest(RestClient),
    Memory(MemoryStore),
}

impl StoreBackend {
    /// A store handle acting with the caller's credentials.
    ///
    /// Anonymous callers get a handle with only the project key; row-level
    /// security then hides every address row from them.
    #[must_use]
    pub fn store_for(&self, access_token: Option<&SecretString>) -> Arc<dyn RemoteStore> {
        match self {
            Self::Rest(client) => Arc::new(client.as_user(access_token.cloned())),
            Self::Memory(store) => Arc::new(store.clone()),
        }
    }
}
