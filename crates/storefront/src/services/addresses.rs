//! Saved-address lifecycle for one customer.
//!
//! # Single default per owner
//!
//! The remote store offers no multi-row transactions, so promoting an
//! address to default is two sequential requests:
//!
//! 1. [`PromotionPhase::ClearDefaults`] - unset `is_default` on the owner's rows
//! 2. [`PromotionPhase::ApplyDefault`] - set it on the target (or insert it)
//!
//! The clear is awaited before the apply is issued. If the apply fails after
//! the clear succeeded, the owner is left without any default; this is
//! logged and reported, and not compensated.
//!
//! Concurrent writers for the same owner can still interleave and leave two
//! defaults behind. Last write wins.
//!
//! # Ownership
//!
//! Every mutating filter carries both `id` and `user_id`. Before a promotion
//! touches other rows, the target is read back under the owner's filter so
//! an unknown or foreign id fails with [`AddressStoreError::NotFound`]
//! without side effects.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use waypoint_core::{
    Address, AddressError, AddressId, AddressPatch, NewAddress, UserId, sort_for_display,
};

use super::activity::{Activity, ActivityFlags, ActivitySnapshot};
use crate::remote::{Filter, OrderBy, RemoteError, RemoteStore};

/// The two remote calls that make up a default promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionPhase {
    /// Unsetting `is_default` on the owner's other rows.
    ClearDefaults,
    /// Setting `is_default` on the target row (update or insert).
    ApplyDefault,
}

impl fmt::Display for PromotionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClearDefaults => f.write_str("clear-defaults"),
            Self::ApplyDefault => f.write_str("apply-default"),
        }
    }
}

/// Errors returned by [`AddressStore`] operations.
#[derive(Debug, Error)]
pub enum AddressStoreError {
    /// Input rejected locally; no remote call was made.
    #[error("Invalid address: {0}")]
    Validation(#[from] AddressError),

    /// The address does not exist or belongs to another user.
    #[error("Address not found: {0}")]
    NotFound(AddressId),

    /// A remote call failed. The remote message is preserved.
    #[error("Persistence error{}: {source}", phase_suffix(.phase))]
    Persistence {
        #[source]
        source: RemoteError,
        /// Set when the failure happened inside a default promotion.
        phase: Option<PromotionPhase>,
    },

    /// No signed-in user; mutations require one.
    #[error("Not signed in")]
    Unauthenticated,
}

impl From<RemoteError> for AddressStoreError {
    fn from(source: RemoteError) -> Self {
        Self::Persistence {
            source,
            phase: None,
        }
    }
}

#[allow(clippy::ref_option)]
fn phase_suffix(phase: &Option<PromotionPhase>) -> String {
    phase.map(|p| format!(" during {p}")).unwrap_or_default()
}

/// Result type alias for `AddressStoreError`.
pub type Result<T> = std::result::Result<T, AddressStoreError>;

const LIST_ORDER: [OrderBy; 2] = [OrderBy::desc("is_default"), OrderBy::desc("created_at")];

/// Address CRUD and default promotion over a remote table.
///
/// Holds no copy of the address list; every read goes to the remote store.
#[derive(Clone)]
pub struct AddressStore {
    remote: Arc<dyn RemoteStore>,
    table: String,
    activity: Arc<ActivityFlags>,
}

impl AddressStore {
    /// Create a store over `table`, reporting activity into `activity`.
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        table: impl Into<String>,
        activity: Arc<ActivityFlags>,
    ) -> Self {
        Self {
            remote,
            table: table.into(),
            activity,
        }
    }

    /// Current in-flight flags.
    #[must_use]
    pub fn activity(&self) -> ActivitySnapshot {
        self.activity.snapshot()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// List the owner's addresses, default first, then newest first.
    ///
    /// An anonymous caller gets an empty list without a remote call.
    ///
    /// # Errors
    ///
    /// Returns [`AddressStoreError::Persistence`] if the remote read fails.
    #[instrument(skip(self))]
    pub async fn list(&self, owner: Option<UserId>) -> Result<Vec<Address>> {
        let Some(owner) = owner else {
            debug!("No signed-in user, returning empty address list");
            return Ok(Vec::new());
        };
        let _guard = self.activity.begin(Activity::Loading);

        let rows = self
            .remote
            .select(&self.table, &owner_filter(owner), &LIST_ORDER)
            .await?;

        let mut addresses = decode_rows(rows)?;
        sort_for_display(&mut addresses);
        debug!(count = addresses.len(), "Loaded addresses");
        Ok(addresses)
    }

    /// Re-fetch the list after a mutation that already went through.
    ///
    /// A failed read must not turn a committed write into an error response,
    /// so it is logged and reported as `None`: the caller should re-fetch.
    pub async fn reload(&self, owner: Option<UserId>) -> Option<Vec<Address>> {
        match self.list(owner).await {
            Ok(addresses) => Some(addresses),
            Err(e) => {
                warn!(error = %e, "Reload after mutation failed; list is stale");
                None
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an address for the owner.
    ///
    /// When `input.is_default` is set, the owner's existing defaults are
    /// cleared before the insert.
    ///
    /// # Errors
    ///
    /// - [`AddressStoreError::Unauthenticated`] without an owner
    /// - [`AddressStoreError::Validation`] for bad input (no remote call made)
    /// - [`AddressStoreError::Persistence`] if a remote call fails
    #[instrument(skip(self, input), fields(is_default = input.is_default))]
    pub async fn create(&self, owner: Option<UserId>, input: &NewAddress) -> Result<Address> {
        let owner = owner.ok_or(AddressStoreError::Unauthenticated)?;
        let valid = input.validate()?;
        let _guard = self.activity.begin(Activity::Creating);

        let cleared = if valid.is_default {
            Some(self.clear_defaults(owner, None).await?)
        } else {
            None
        };

        let row = json!({
            "user_id": owner,
            "label": valid.label,
            "full_address": valid.full_address,
            "landmark": valid.landmark,
            "locality_id": valid.locality_id,
            "ward_number": valid.ward_number,
            "is_default": valid.is_default,
        });

        let inserted = self
            .remote
            .insert(&self.table, row)
            .await
            .map_err(|source| match cleared {
                Some(cleared) => apply_failed(owner, cleared, source),
                None => source.into(),
            })?;

        let address = decode_row(inserted)?;
        info!(address_id = %address.id, "Created address");
        Ok(address)
    }

    /// Apply a partial update to one of the owner's addresses.
    ///
    /// Setting `is_default` to true clears the owner's other defaults first
    /// (never touching the target row). `updated_at` is always refreshed.
    ///
    /// # Errors
    ///
    /// - [`AddressStoreError::Unauthenticated`] without an owner
    /// - [`AddressStoreError::Validation`] for bad input (no remote call made)
    /// - [`AddressStoreError::NotFound`] if `id` is not the owner's; nothing
    ///   is modified in that case
    /// - [`AddressStoreError::Persistence`] if a remote call fails
    #[instrument(skip(self, patch), fields(promotes = patch.promotes()))]
    pub async fn update(
        &self,
        owner: Option<UserId>,
        id: AddressId,
        patch: &AddressPatch,
    ) -> Result<Address> {
        let owner = owner.ok_or(AddressStoreError::Unauthenticated)?;
        let mut columns = patch.validate()?;
        let _guard = self.activity.begin(Activity::Updating);

        let cleared = if patch.promotes() {
            self.ensure_owned(owner, id).await?;
            Some(self.clear_defaults(owner, Some(id)).await?)
        } else {
            None
        };

        columns.insert("updated_at".to_string(), json!(Utc::now()));

        let rows = self
            .remote
            .update(&self.table, Value::Object(columns), &row_filter(owner, id))
            .await
            .map_err(|source| match cleared {
                Some(cleared) => apply_failed(owner, cleared, source),
                None => source.into(),
            })?;

        let row = rows
            .into_iter()
            .next()
            .ok_or(AddressStoreError::NotFound(id))?;
        let address = decode_row(row)?;
        info!("Updated address");
        Ok(address)
    }

    /// Delete one of the owner's addresses. Deleting a missing id succeeds.
    ///
    /// # Errors
    ///
    /// - [`AddressStoreError::Unauthenticated`] without an owner
    /// - [`AddressStoreError::Persistence`] if the remote call fails
    #[instrument(skip(self))]
    pub async fn delete(&self, owner: Option<UserId>, id: AddressId) -> Result<()> {
        let owner = owner.ok_or(AddressStoreError::Unauthenticated)?;
        let _guard = self.activity.begin(Activity::Deleting);

        self.remote
            .delete(&self.table, &row_filter(owner, id))
            .await?;
        info!("Deleted address");
        Ok(())
    }

    /// Make `id` the owner's only default address.
    ///
    /// # Errors
    ///
    /// - [`AddressStoreError::Unauthenticated`] without an owner
    /// - [`AddressStoreError::NotFound`] if `id` is not the owner's; no
    ///   default is cleared in that case
    /// - [`AddressStoreError::Persistence`] if a remote call fails
    #[instrument(skip(self))]
    pub async fn set_default(&self, owner: Option<UserId>, id: AddressId) -> Result<()> {
        let owner = owner.ok_or(AddressStoreError::Unauthenticated)?;
        let _guard = self.activity.begin(Activity::Updating);

        self.ensure_owned(owner, id).await?;
        let cleared = self.clear_defaults(owner, None).await?;

        let patch = json!({ "is_default": true, "updated_at": Utc::now() });
        let rows = self
            .remote
            .update(&self.table, patch, &row_filter(owner, id))
            .await
            .map_err(|source| apply_failed(owner, cleared, source))?;

        if rows.is_empty() {
            // Deleted between the ownership read and the apply.
            if cleared > 0 {
                warn!(%owner, cleared, "Owner left without a default address");
            }
            return Err(AddressStoreError::NotFound(id));
        }
        info!("Set default address");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Promotion helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Unset `is_default` on the owner's rows, optionally sparing one.
    ///
    /// Returns how many rows lost their default flag.
    async fn clear_defaults(&self, owner: UserId, except: Option<AddressId>) -> Result<usize> {
        let mut filter = owner_filter(owner).eq("is_default", true);
        if let Some(except) = except {
            filter = filter.neq("id", except);
        }

        let patch = json!({ "is_default": false, "updated_at": Utc::now() });
        let cleared = self
            .remote
            .update(&self.table, patch, &filter)
            .await
            .map_err(|source| AddressStoreError::Persistence {
                source,
                phase: Some(PromotionPhase::ClearDefaults),
            })?;

        debug!(
            phase = %PromotionPhase::ClearDefaults,
            cleared = cleared.len(),
            "Cleared previous defaults"
        );
        Ok(cleared.len())
    }

    /// Fail with `NotFound` unless `id` exists under `owner`.
    async fn ensure_owned(&self, owner: UserId, id: AddressId) -> Result<()> {
        let rows = self
            .remote
            .select(&self.table, &row_filter(owner, id), &[])
            .await?;
        if rows.is_empty() {
            debug!("Address not owned by caller");
            return Err(AddressStoreError::NotFound(id));
        }
        Ok(())
    }
}

/// The apply step failed after `cleared` rows lost their default flag.
fn apply_failed(owner: UserId, cleared: usize, source: RemoteError) -> AddressStoreError {
    if cleared > 0 {
        warn!(
            %owner,
            cleared,
            error = %source,
            "Owner left without a default address"
        );
    } else {
        warn!(%owner, error = %source, "Default promotion failed; nothing was cleared");
    }
    AddressStoreError::Persistence {
        source,
        phase: Some(PromotionPhase::ApplyDefault),
    }
}

fn owner_filter(owner: UserId) -> Filter {
    Filter::new().eq("user_id", owner)
}

fn row_filter(owner: UserId, id: AddressId) -> Filter {
    Filter::new().eq("id", id).eq("user_id", owner)
}

fn decode_row(row: Value) -> Result<Address> {
    serde_json::from_value(row)
        .map_err(RemoteError::from)
        .map_err(AddressStoreError::from)
}

fn decode_rows(rows: Vec<Value>) -> Result<Vec<Address>> {
    rows.into_iter().map(decode_row).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::io;

    use tracing::subscriber::DefaultGuard;
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;
    use crate::remote::{CallKind, MemoryStore, Operator};

    /// Captured log output of the current thread.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogBuffer {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture_warnings() -> (LogBuffer, DefaultGuard) {
        let buffer = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buffer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        (buffer, tracing::subscriber::set_default(subscriber))
    }

    const TABLE: &str = "customer_addresses";

    fn store() -> (AddressStore, MemoryStore) {
        let memory = MemoryStore::new();
        let store = AddressStore::new(
            Arc::new(memory.clone()),
            TABLE,
            Arc::new(ActivityFlags::new()),
        );
        (store, memory)
    }

    fn defaults(addresses: &[Address]) -> Vec<AddressId> {
        addresses
            .iter()
            .filter(|a| a.is_default)
            .map(|a| a.id)
            .collect()
    }

    #[tokio::test]
    async fn test_anonymous_list_is_empty_without_remote_call() {
        let (store, memory) = store();
        assert!(store.list(None).await.unwrap().is_empty());
        assert!(memory.calls().is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_mutations_are_rejected() {
        let (store, memory) = store();
        let id = AddressId::random();

        assert!(matches!(
            store.create(None, &NewAddress::new("1 Palm Rd")).await,
            Err(AddressStoreError::Unauthenticated)
        ));
        assert!(matches!(
            store.update(None, id, &AddressPatch::promote()).await,
            Err(AddressStoreError::Unauthenticated)
        ));
        assert!(matches!(
            store.delete(None, id).await,
            Err(AddressStoreError::Unauthenticated)
        ));
        assert!(matches!(
            store.set_default(None, id).await,
            Err(AddressStoreError::Unauthenticated)
        ));
        assert!(memory.calls().is_empty());
    }

    #[tokio::test]
    async fn test_blank_address_makes_no_remote_call() {
        let (store, memory) = store();
        let result = store
            .create(Some(UserId::random()), &NewAddress::new("   ").as_default())
            .await;

        assert!(matches!(
            result,
            Err(AddressStoreError::Validation(AddressError::EmptyAddress))
        ));
        assert!(memory.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_default_clears_then_inserts() {
        let (store, memory) = store();
        let owner = UserId::random();

        let first = store
            .create(Some(owner), &NewAddress::new("1 Palm Rd").as_default())
            .await
            .unwrap();
        let second = store
            .create(Some(owner), &NewAddress::new("2 Palm Rd").as_default())
            .await
            .unwrap();

        let list = store.list(Some(owner)).await.unwrap();
        assert_eq!(defaults(&list), vec![second.id]);
        assert_eq!(list[1].id, first.id);

        let kinds: Vec<_> = memory.calls().iter().map(|c| c.kind).collect();
        assert_eq!(
            &kinds[..4],
            &[
                CallKind::Update,
                CallKind::Insert,
                CallKind::Update,
                CallKind::Insert
            ]
        );
    }

    #[tokio::test]
    async fn test_update_promotion_never_clears_target() {
        let (store, memory) = store();
        let owner = Some(UserId::random());
        let a = store
            .create(owner, &NewAddress::new("A").as_default())
            .await
            .unwrap();
        let b = store.create(owner, &NewAddress::new("B")).await.unwrap();
        memory.clear_calls();

        let updated = store
            .update(owner, b.id, &AddressPatch::promote())
            .await
            .unwrap();
        assert!(updated.is_default);

        let clear = memory
            .calls()
            .into_iter()
            .find(|c| c.kind == CallKind::Update)
            .unwrap();
        assert!(clear.filter.constrains("id", Operator::Neq));

        let list = store.list(owner).await.unwrap();
        assert_eq!(defaults(&list), vec![b.id]);
        assert!(list.iter().any(|x| x.id == a.id && !x.is_default));
    }

    #[tokio::test]
    async fn test_foreign_update_is_not_found_and_modifies_nothing() {
        let (store, memory) = store();
        let alice = Some(UserId::random());
        let bob = Some(UserId::random());
        let theirs = store
            .create(alice, &NewAddress::new("A").as_default())
            .await
            .unwrap();
        let before = memory.rows(TABLE);

        let result = store
            .update(bob, theirs.id, &AddressPatch::promote())
            .await;

        assert!(matches!(result, Err(AddressStoreError::NotFound(id)) if id == theirs.id));
        assert_eq!(memory.rows(TABLE), before);
    }

    #[tokio::test]
    async fn test_apply_failure_after_clear_leaves_no_default() {
        let (store, memory) = store();
        let owner = Some(UserId::random());
        let a = store
            .create(owner, &NewAddress::new("A").as_default())
            .await
            .unwrap();
        let b = store.create(owner, &NewAddress::new("B")).await.unwrap();

        // The clear goes through; the apply that follows it fails.
        memory.fail_after(CallKind::Update, 1, "connection reset");

        let result = store.set_default(owner, b.id).await;
        assert!(matches!(
            result,
            Err(AddressStoreError::Persistence {
                phase: Some(PromotionPhase::ApplyDefault),
                ..
            })
        ));

        let list = store.list(owner).await.unwrap();
        assert!(defaults(&list).is_empty());
        assert_eq!(list.len(), 2);
        assert!(list.iter().any(|x| x.id == a.id));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _) = store();
        let owner = Some(UserId::random());
        let a = store.create(owner, &NewAddress::new("A")).await.unwrap();

        store.delete(owner, a.id).await.unwrap();
        store.delete(owner, a.id).await.unwrap();
        assert!(store.list(owner).await.unwrap().is_empty());
    }

    #[test]
    fn test_persistence_error_names_phase() {
        let err = AddressStoreError::Persistence {
            source: RemoteError::Unavailable("timeout".to_string()),
            phase: Some(PromotionPhase::ApplyDefault),
        };
        assert_eq!(
            err.to_string(),
            "Persistence error during apply-default: Remote store unavailable: timeout"
        );

        let err: AddressStoreError = RemoteError::Unavailable("timeout".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Persistence error: Remote store unavailable: timeout"
        );
    }

    #[tokio::test]
    async fn test_reload_failure_is_reported_as_stale() {
        let (store, memory) = store();
        let owner = Some(UserId::random());
        store.create(owner, &NewAddress::new("A")).await.unwrap();

        memory.fail_next(CallKind::Select, "timeout");
        assert!(store.reload(owner).await.is_none());
        assert_eq!(store.reload(owner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_default_insert_into_empty_book_keeps_quiet_about_lost_default() {
        let (store, memory) = store();
        let (logs, _guard) = capture_warnings();

        memory.fail_next(CallKind::Insert, "insert failed");
        let result = store
            .create(Some(UserId::random()), &NewAddress::new("A").as_default())
            .await;

        assert!(matches!(
            result,
            Err(AddressStoreError::Persistence {
                phase: Some(PromotionPhase::ApplyDefault),
                ..
            })
        ));
        let logs = logs.contents();
        assert!(logs.contains("nothing was cleared"));
        assert!(!logs.contains("Owner left without a default address"));
    }

    #[tokio::test]
    async fn test_failed_default_insert_after_clear_warns_about_lost_default() {
        let (store, memory) = store();
        let owner = Some(UserId::random());
        store
            .create(owner, &NewAddress::new("A").as_default())
            .await
            .unwrap();
        let (logs, _guard) = capture_warnings();

        memory.fail_next(CallKind::Insert, "insert failed");
        let result = store
            .create(owner, &NewAddress::new("B").as_default())
            .await;

        assert!(result.is_err());
        assert!(logs.contents().contains("Owner left without a default address"));
        assert!(defaults(&store.list(owner).await.unwrap()).is_empty());
    }
}
