//! Advisory in-flight flags for address operations.
//!
//! The UI polls these to disable buttons while a request is running. They
//! are counters rather than booleans so overlapping requests of the same
//! kind don't clear each other's flag.
//!
//! Flags are kept per customer in [`ActivityRegistry`]; one customer's
//! requests never show up in another's snapshot.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use waypoint_core::UserId;

/// Which kind of operation is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Loading,
    Creating,
    Updating,
    Deleting,
}

/// Shared in-flight counters.
#[derive(Debug, Default)]
pub struct ActivityFlags {
    loading: AtomicUsize,
    creating: AtomicUsize,
    updating: AtomicUsize,
    deleting: AtomicUsize,
}

/// Point-in-time view of [`ActivityFlags`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ActivitySnapshot {
    pub is_loading: bool,
    pub is_creating: bool,
    pub is_updating: bool,
    pub is_deleting: bool,
}

impl ActivityFlags {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    const fn counter(&self, activity: Activity) -> &AtomicUsize {
        match activity {
            Activity::Loading => &self.loading,
            Activity::Creating => &self.creating,
            Activity::Updating => &self.updating,
            Activity::Deleting => &self.deleting,
        }
    }

    /// Raise the flag for `activity` until the returned guard is dropped.
    #[must_use = "the flag is lowered as soon as the guard is dropped"]
    pub fn begin(&self, activity: Activity) -> ActivityGuard<'_> {
        self.counter(activity).fetch_add(1, Ordering::SeqCst);
        ActivityGuard {
            flags: self,
            activity,
        }
    }

    /// Whether any operation of `activity` is in flight.
    #[must_use]
    pub fn is_active(&self, activity: Activity) -> bool {
        self.counter(activity).load(Ordering::SeqCst) > 0
    }

    #[must_use]
    pub fn snapshot(&self) -> ActivitySnapshot {
        ActivitySnapshot {
            is_loading: self.is_active(Activity::Loading),
            is_creating: self.is_active(Activity::Creating),
            is_updating: self.is_active(Activity::Updating),
            is_deleting: self.is_active(Activity::Deleting),
        }
    }
}

/// Lowers its flag on drop, including on early return and error paths.
pub struct ActivityGuard<'a> {
    flags: &'a ActivityFlags,
    activity: Activity,
}

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        self.flags
            .counter(self.activity)
            .fetch_sub(1, Ordering::SeqCst);
    }
}

/// Per-customer [`ActivityFlags`].
///
/// Entries idle for longer than the configured period are evicted. A guard
/// outliving its entry keeps counting on its own `Arc`, so eviction never
/// corrupts a running request's flags.
#[derive(Clone)]
pub struct ActivityRegistry {
    flags: Cache<UserId, Arc<ActivityFlags>>,
}

impl ActivityRegistry {
    #[must_use]
    pub fn new(idle: Duration) -> Self {
        let flags = Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(idle)
            .build();
        Self { flags }
    }

    /// Flags for `owner`. Anonymous callers get a private, unshared set.
    pub async fn flags_for(&self, owner: Option<UserId>) -> Arc<ActivityFlags> {
        match owner {
            Some(owner) => {
                self.flags
                    .get_with(owner, async { Arc::new(ActivityFlags::new()) })
                    .await
            }
            None => Arc::new(ActivityFlags::new()),
        }
    }

    /// Snapshot for `owner`; all flags down when nothing was ever tracked.
    pub async fn snapshot(&self, owner: Option<UserId>) -> ActivitySnapshot {
        let Some(owner) = owner else {
            return ActivitySnapshot::default();
        };
        self.flags
            .get(&owner)
            .await
            .map(|flags| flags.snapshot())
            .unwrap_or_default()
    }
}

impl Default for ActivityRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_raises_and_lowers() {
        let flags = ActivityFlags::new();
        assert_eq!(flags.snapshot(), ActivitySnapshot::default());

        {
            let _guard = flags.begin(Activity::Creating);
            let snapshot = flags.snapshot();
            assert!(snapshot.is_creating);
            assert!(!snapshot.is_loading);
        }

        assert!(!flags.is_active(Activity::Creating));
    }

    #[test]
    fn test_overlapping_guards() {
        let flags = ActivityFlags::new();
        let first = flags.begin(Activity::Updating);
        let second = flags.begin(Activity::Updating);

        drop(first);
        assert!(flags.is_active(Activity::Updating));
        drop(second);
        assert!(!flags.is_active(Activity::Updating));
    }

    #[test]
    fn test_snapshot_serializes_flag_names() {
        let json = serde_json::to_value(ActivitySnapshot {
            is_deleting: true,
            ..ActivitySnapshot::default()
        })
        .unwrap_or_default();
        assert_eq!(json["is_deleting"], true);
        assert_eq!(json["is_loading"], false);
    }

    #[tokio::test]
    async fn test_registry_keeps_customers_apart() {
        let registry = ActivityRegistry::default();
        let alice = Some(UserId::random());
        let bob = Some(UserId::random());

        let flags = registry.flags_for(alice).await;
        let _guard = flags.begin(Activity::Creating);

        assert!(registry.snapshot(alice).await.is_creating);
        assert_eq!(registry.snapshot(bob).await, ActivitySnapshot::default());
        assert_eq!(registry.snapshot(None).await, ActivitySnapshot::default());
    }

    #[tokio::test]
    async fn test_registry_returns_same_flags_for_same_customer() {
        let registry = ActivityRegistry::default();
        let alice = Some(UserId::random());

        let first = registry.flags_for(alice).await;
        let second = registry.flags_for(alice).await;
        assert!(Arc::ptr_eq(&first, &second));

        let anonymous = registry.flags_for(None).await;
        assert!(!Arc::ptr_eq(&anonymous, &registry.flags_for(None).await));
    }
}
