//! In-process remote store.
//!
//! Behaves like the REST backend from the caller's point of view: rows are
//! JSON objects, the store assigns `id`, `created_at` and `updated_at`, and
//! every mutation is a separate request with no transaction around it.
//!
//! It also records recent calls and can be told to fail the next call of a
//! given kind, which is how partial-failure behaviour is exercised. The call
//! log keeps the last [`CALL_LOG_CAPACITY`] entries so a long-running
//! `memory` backend does not grow without bound.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{Filter, OrderBy, RemoteError, RemoteStore, column_text};

/// Kind of request issued against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// Calls kept in the log; older ones are dropped first.
pub const CALL_LOG_CAPACITY: usize = 1024;

/// A request the store received, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub kind: CallKind,
    pub table: String,
    pub filter: Filter,
}

/// Shared in-memory table store. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

/// A queued injected failure.
struct Failure {
    kind: CallKind,
    /// Matching calls to let through before failing.
    skip: usize,
    message: String,
}

#[derive(Default)]
struct MemoryInner {
    tables: HashMap<String, Vec<Value>>,
    calls: VecDeque<RemoteCall>,
    failures: VecDeque<Failure>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl MemoryInner {
    /// Record the call, then consume a queued failure for its kind if any.
    fn begin(&mut self, kind: CallKind, table: &str, filter: &Filter) -> Result<(), RemoteError> {
        if self.calls.len() == CALL_LOG_CAPACITY {
            self.calls.pop_front();
        }
        self.calls.push_back(RemoteCall {
            kind,
            table: table.to_string(),
            filter: filter.clone(),
        });

        let Some(pos) = self.failures.iter().position(|f| f.kind == kind) else {
            return Ok(());
        };
        if let Some(failure) = self.failures.get_mut(pos)
            && failure.skip > 0
        {
            failure.skip -= 1;
            return Ok(());
        }
        let message = self
            .failures
            .remove(pos)
            .map(|f| f.message)
            .unwrap_or_default();
        Err(RemoteError::Unavailable(message))
    }

    /// A timestamp strictly later than every one handed out before.
    fn next_timestamp(&mut self) -> String {
        let now = Utc::now();
        let next = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(next);
        next.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn table_mut(&mut self, table: &str) -> &mut Vec<Value> {
        self.tables.entry(table.to_string()).or_default()
    }
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert rows directly, bypassing call recording and failure injection.
    ///
    /// Server-populated columns missing from a row are filled in.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        let mut inner = self.inner.lock();
        for row in rows {
            let row = populate(&mut inner, row);
            inner.table_mut(table).push(row);
        }
    }

    /// Snapshot of every row currently in `table`.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.inner
            .lock()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Recorded calls, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.inner.lock().calls.iter().cloned().collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    /// Make the next call of `kind` fail with [`RemoteError::Unavailable`].
    ///
    /// Queued failures are consumed in order, one per matching call.
    pub fn fail_next(&self, kind: CallKind, message: impl Into<String>) {
        self.fail_after(kind, 0, message);
    }

    /// Let `successes` calls of `kind` through, then fail the next one.
    pub fn fail_after(&self, kind: CallKind, successes: usize, message: impl Into<String>) {
        self.inner.lock().failures.push_back(Failure {
            kind,
            skip: successes,
            message: message.into(),
        });
    }
}

/// Fill `id`, `created_at` and `updated_at` when absent.
fn populate(inner: &mut MemoryInner, row: Value) -> Value {
    let mut object = match row {
        Value::Object(object) => object,
        other => return other,
    };

    if !object.contains_key("id") {
        object.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
    }
    if !object.contains_key("created_at") {
        let now = inner.next_timestamp();
        object.insert("created_at".to_string(), Value::String(now));
    }
    if !object.contains_key("updated_at") {
        let created = object.get("created_at").cloned().unwrap_or(Value::Null);
        object.insert("updated_at".to_string(), created);
    }
    Value::Object(object)
}

/// Compare two column values the way the database would order them.
///
/// Timestamps compare chronologically; `NULL` sorts after everything.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Some(x), Some(y)) => column_text(x).cmp(&column_text(y)),
    }
}

fn sort_rows(rows: &mut [Value], order: &[OrderBy]) {
    rows.sort_by(|a, b| {
        order.iter().fold(Ordering::Equal, |acc, key| {
            acc.then_with(|| {
                let ordering = compare_values(a.get(key.column), b.get(key.column));
                if key.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            })
        })
    });
}

fn merge(row: &mut Value, patch: &Map<String, Value>) {
    if let Value::Object(object) = row {
        for (column, value) in patch {
            object.insert(column.clone(), value.clone());
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        order: &[OrderBy],
    ) -> Result<Vec<Value>, RemoteError> {
        let mut inner = self.inner.lock();
        inner.begin(CallKind::Select, table, filter)?;

        let mut rows: Vec<Value> = inner
            .tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        sort_rows(&mut rows, order);
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, RemoteError> {
        let mut inner = self.inner.lock();
        inner.begin(CallKind::Insert, table, &Filter::new())?;

        if !row.is_object() {
            return Err(RemoteError::Status {
                status: 400,
                message: "row must be a JSON object".to_string(),
            });
        }

        let row = populate(&mut inner, row);
        inner.table_mut(table).push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        table: &str,
        patch: Value,
        filter: &Filter,
    ) -> Result<Vec<Value>, RemoteError> {
        let mut inner = self.inner.lock();
        inner.begin(CallKind::Update, table, filter)?;

        let Value::Object(patch) = patch else {
            return Err(RemoteError::Status {
                status: 400,
                message: "patch must be a JSON object".to_string(),
            });
        };

        let mut updated = Vec::new();
        for row in inner.table_mut(table).iter_mut() {
            if filter.matches(row) {
                merge(row, &patch);
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock();
        inner.begin(CallKind::Delete, table, filter)?;

        inner.table_mut(table).retain(|row| !filter.matches(row));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;

    use super::*;

    const TABLE: &str = "customer_addresses";

    #[tokio::test]
    async fn test_insert_populates_server_columns() {
        let store = MemoryStore::new();
        let row = store
            .insert(TABLE, json!({ "user_id": "u1", "full_address": "1 Palm Rd" }))
            .await
            .unwrap();

        assert!(row["id"].as_str().is_some());
        assert_eq!(row["created_at"], row["updated_at"]);
        assert_eq!(store.rows(TABLE).len(), 1);
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let store = MemoryStore::new();
        let a = store.insert(TABLE, json!({ "n": 1 })).await.unwrap();
        let b = store.insert(TABLE, json!({ "n": 2 })).await.unwrap();

        let a = DateTime::parse_from_rfc3339(a["created_at"].as_str().unwrap()).unwrap();
        let b = DateTime::parse_from_rfc3339(b["created_at"].as_str().unwrap()).unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_select_filters_and_orders() {
        let store = MemoryStore::new();
        store.seed(
            TABLE,
            [
                json!({ "id": "a", "user_id": "u1", "is_default": false, "created_at": "2026-01-01T00:00:00Z" }),
                json!({ "id": "b", "user_id": "u1", "is_default": true, "created_at": "2026-01-02T00:00:00Z" }),
                json!({ "id": "c", "user_id": "u1", "is_default": false, "created_at": "2026-01-03T00:00:00Z" }),
                json!({ "id": "d", "user_id": "u2", "is_default": true, "created_at": "2026-01-04T00:00:00Z" }),
            ],
        );

        let rows = store
            .select(
                TABLE,
                &Filter::new().eq("user_id", "u1"),
                &[OrderBy::desc("is_default"), OrderBy::desc("created_at")],
            )
            .await
            .unwrap();

        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_update_returns_matched_rows_only() {
        let store = MemoryStore::new();
        store.seed(
            TABLE,
            [
                json!({ "id": "a", "is_default": true }),
                json!({ "id": "b", "is_default": true }),
            ],
        );

        let updated = store
            .update(
                TABLE,
                json!({ "is_default": false }),
                &Filter::new().eq("is_default", true).neq("id", "b"),
            )
            .await
            .unwrap();

        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0]["id"], "a");
        let rows = store.rows(TABLE);
        assert_eq!(rows[0]["is_default"], false);
        assert_eq!(rows[1]["is_default"], true);
    }

    #[tokio::test]
    async fn test_delete_missing_row_is_ok() {
        let store = MemoryStore::new();
        store
            .delete(TABLE, &Filter::new().eq("id", "nope"))
            .await
            .unwrap();
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_next_consumes_one_failure() {
        let store = MemoryStore::new();
        store.fail_next(CallKind::Insert, "connection reset");

        let first = store.insert(TABLE, json!({})).await;
        assert!(matches!(first, Err(RemoteError::Unavailable(m)) if m == "connection reset"));

        // Selects are unaffected; the next insert succeeds.
        store.select(TABLE, &Filter::new(), &[]).await.unwrap();
        store.insert(TABLE, json!({})).await.unwrap();

        let kinds: Vec<_> = store.calls().iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![CallKind::Insert, CallKind::Select, CallKind::Insert]
        );
    }

    #[tokio::test]
    async fn test_fail_after_skips_successes() {
        let store = MemoryStore::new();
        store.fail_after(CallKind::Delete, 1, "boom");

        store.delete(TABLE, &Filter::new()).await.unwrap();
        assert!(store.delete(TABLE, &Filter::new()).await.is_err());
        store.delete(TABLE, &Filter::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_call_log_keeps_most_recent_calls() {
        let store = MemoryStore::new();
        for _ in 0..CALL_LOG_CAPACITY {
            store.select(TABLE, &Filter::new(), &[]).await.unwrap();
        }
        store.delete(TABLE, &Filter::new()).await.unwrap();

        let calls = store.calls();
        assert_eq!(calls.len(), CALL_LOG_CAPACITY);
        assert_eq!(calls.last().map(|c| c.kind), Some(CallKind::Delete));
    }

    #[test]
    fn test_nulls_sort_last() {
        assert_eq!(
            compare_values(Some(&Value::Null), Some(&json!(1))),
            Ordering::Greater
        );
        assert_eq!(compare_values(None, None), Ordering::Equal);
    }
}
