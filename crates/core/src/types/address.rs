//! Saved delivery address.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{AddressId, LocalityId, UserId};

/// Label applied when the customer does not pick one.
pub const DEFAULT_LABEL: &str = "Home";

/// One saved delivery location, owned by exactly one user.
///
/// Mirrors a row of the remote address table; field names match the column
/// names so rows deserialize directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    /// Server-assigned, immutable.
    pub id: AddressId,
    /// Owning user, immutable after creation.
    pub user_id: UserId,
    #[serde(default = "default_label")]
    pub label: String,
    pub full_address: String,
    #[serde(default)]
    pub landmark: Option<String>,
    #[serde(default)]
    pub locality_id: Option<LocalityId>,
    #[serde(default)]
    pub ward_number: Option<i32>,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_label() -> String {
    DEFAULT_LABEL.to_owned()
}

/// Order addresses for display: default-flagged first, then newest first.
///
/// The sort is stable, so rows with equal keys keep the order the remote
/// store returned them in.
pub fn sort_for_display(addresses: &mut [Address]) {
    addresses.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}
