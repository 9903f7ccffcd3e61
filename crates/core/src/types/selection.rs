//! Checkout address selection.

use serde::{Deserialize, Serialize};

use super::address::Address;
use super::id::AddressId;

/// Which address the active checkout flow will deliver to.
///
/// Ephemeral: lives in the customer's session, never in the address table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckoutSelection {
    /// One of the customer's saved addresses.
    Saved { address_id: AddressId },
    /// Free-text entry typed at checkout (empty until the customer types).
    Manual { text: String },
}

impl CheckoutSelection {
    /// Initial selection for a freshly loaded address list.
    #[must_use]
    pub fn initial(addresses: &[Address]) -> Self {
        derive_initial_selection(addresses).map_or_else(
            || Self::Manual {
                text: String::new(),
            },
            |address| Self::Saved {
                address_id: address.id,
            },
        )
    }

    /// Re-validate a stored selection against a freshly loaded list.
    ///
    /// A saved selection whose address no longer exists falls back to
    /// [`Self::initial`]; manual entries are kept as typed.
    #[must_use]
    pub fn reconcile(self, addresses: &[Address]) -> Self {
        match self {
            Self::Saved { address_id } if addresses.iter().any(|a| a.id == address_id) => {
                Self::Saved { address_id }
            }
            Self::Saved { .. } => Self::initial(addresses),
            manual @ Self::Manual { .. } => manual,
        }
    }
}

/// Pick the address checkout should start with.
///
/// Returns the first default-flagged address, else the first element (the
/// most recently created when the list is in display order), else `None`,
/// which tells the caller to fall back to manual entry.
#[must_use]
pub fn derive_initial_selection(addresses: &[Address]) -> Option<&Address> {
    addresses
        .iter()
        .find(|a| a.is_default)
        .or_else(|| addresses.first())
}
