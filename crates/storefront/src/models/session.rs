//! Session-related types.

use serde::{Deserialize, Serialize};

use waypoint_core::UserId;

/// The signed-in customer, as resolved from an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Owner id used for every address row.
    pub user_id: UserId,
    /// Email reported by the auth endpoint, if any.
    #[serde(default)]
    pub email: Option<String>,
}

impl Identity {
    #[must_use]
    pub const fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            email: None,
        }
    }
}

/// Session keys.
pub mod keys {
    /// Key for the active checkout's address selection.
    pub const CHECKOUT_SELECTION: &str = "checkout_selection";
}
