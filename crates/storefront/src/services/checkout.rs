//! Checkout address selection.
//!
//! The selection is ephemeral: it lives in the customer's session and is
//! re-validated against a freshly loaded address list every time it is read.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_sessions::Session;
use tracing::{debug, instrument};
use waypoint_core::{Address, AddressId, CheckoutSelection, NewAddress, UserId};

use super::addresses::{AddressStore, AddressStoreError};
use crate::models::session_keys;

/// Errors from checkout selection.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Address(#[from] AddressStoreError),

    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// The chosen saved address is not in the customer's list.
    #[error("Address not found: {0}")]
    UnknownAddress(AddressId),
}

/// The customer's addresses together with the active selection.
#[derive(Debug, Clone, Serialize)]
pub struct AddressBook {
    /// `None` when the list could not be re-fetched after a committed choice.
    pub addresses: Option<Vec<Address>>,
    pub selection: CheckoutSelection,
}

impl AddressBook {
    /// The saved address currently selected, if any.
    #[must_use]
    pub fn selected(&self) -> Option<&Address> {
        match &self.selection {
            CheckoutSelection::Saved { address_id } => self
                .addresses
                .as_deref()?
                .iter()
                .find(|a| a.id == *address_id),
            CheckoutSelection::Manual { .. } => None,
        }
    }
}

/// A selection made by the customer at checkout.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChooseAddress {
    /// Deliver to a saved address.
    Saved { address_id: AddressId },
    /// Deliver to typed text; with `save`, also store it as a new address.
    Manual {
        text: String,
        #[serde(default)]
        save: bool,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        make_default: bool,
    },
}

/// Load the address list and the session's selection, reconciled.
///
/// # Errors
///
/// Returns an error if the list cannot be loaded or the session fails.
#[instrument(skip(store, session))]
pub async fn load(
    store: &AddressStore,
    session: &Session,
    owner: Option<UserId>,
) -> Result<AddressBook, CheckoutError> {
    let addresses = store.list(owner).await?;

    let stored: Option<CheckoutSelection> = session.get(session_keys::CHECKOUT_SELECTION).await?;
    let selection = match stored {
        Some(selection) => selection.reconcile(&addresses),
        None => CheckoutSelection::initial(&addresses),
    };
    session
        .insert(session_keys::CHECKOUT_SELECTION, &selection)
        .await?;

    Ok(AddressBook {
        addresses: Some(addresses),
        selection,
    })
}

/// Apply the customer's choice and return the reloaded book.
///
/// Once the choice is stored (and a manual address saved), a failed
/// re-fetch yields a book without addresses instead of an error.
///
/// # Errors
///
/// - [`CheckoutError::UnknownAddress`] if a saved id is not the customer's
/// - [`CheckoutError::Address`] if saving manual text fails (including
///   validation and anonymous callers)
#[instrument(skip(store, session, choice))]
pub async fn choose(
    store: &AddressStore,
    session: &Session,
    owner: Option<UserId>,
    choice: ChooseAddress,
) -> Result<AddressBook, CheckoutError> {
    let selection = match choice {
        ChooseAddress::Saved { address_id } => {
            let addresses = store.list(owner).await?;
            if !addresses.iter().any(|a| a.id == address_id) {
                return Err(CheckoutError::UnknownAddress(address_id));
            }
            CheckoutSelection::Saved { address_id }
        }
        ChooseAddress::Manual {
            text,
            save: true,
            label,
            make_default,
        } => {
            let input = NewAddress {
                full_address: text,
                label,
                is_default: make_default,
                ..NewAddress::default()
            };
            let created = store.create(owner, &input).await?;
            debug!(address_id = %created.id, "Saved manual address");
            CheckoutSelection::Saved {
                address_id: created.id,
            }
        }
        ChooseAddress::Manual { text, .. } => CheckoutSelection::Manual { text },
    };

    session
        .insert(session_keys::CHECKOUT_SELECTION, &selection)
        .await?;

    // Reload so the response reflects the remote state, not a local patch.
    let addresses = store.reload(owner).await;
    let selection = match &addresses {
        Some(addresses) => selection.reconcile(addresses),
        None => selection,
    };
    Ok(AddressBook {
        addresses,
        selection,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore as SessionStore;

    use super::*;
    use crate::remote::{CallKind, MemoryStore};
    use crate::services::activity::ActivityFlags;

    fn fixtures() -> (AddressStore, Session) {
        let (store, session, _) = fixtures_with_memory();
        (store, session)
    }

    fn fixtures_with_memory() -> (AddressStore, Session, MemoryStore) {
        let memory = MemoryStore::new();
        let store = AddressStore::new(
            Arc::new(memory.clone()),
            "customer_addresses",
            Arc::new(ActivityFlags::new()),
        );
        let session = Session::new(None, Arc::new(SessionStore::default()), None);
        (store, session, memory)
    }

    #[tokio::test]
    async fn test_load_defaults_to_default_address() {
        let (store, session) = fixtures();
        let owner = Some(UserId::random());
        let home = store
            .create(owner, &NewAddress::new("Home").as_default())
            .await
            .unwrap();
        store.create(owner, &NewAddress::new("Work")).await.unwrap();

        let book = load(&store, &session, owner).await.unwrap();
        assert_eq!(
            book.selection,
            CheckoutSelection::Saved {
                address_id: home.id
            }
        );
        assert_eq!(book.selected().map(|a| a.id), Some(home.id));
    }

    #[tokio::test]
    async fn test_empty_book_selects_manual_entry() {
        let (store, session) = fixtures();
        let book = load(&store, &session, None).await.unwrap();
        assert!(book.addresses.unwrap().is_empty());
        assert!(matches!(book.selection, CheckoutSelection::Manual { .. }));
    }

    #[tokio::test]
    async fn test_choose_unknown_saved_address() {
        let (store, session) = fixtures();
        let owner = Some(UserId::random());
        let id = AddressId::random();

        let result = choose(
            &store,
            &session,
            owner,
            ChooseAddress::Saved { address_id: id },
        )
        .await;
        assert!(matches!(result, Err(CheckoutError::UnknownAddress(x)) if x == id));
    }

    #[tokio::test]
    async fn test_choose_manual_with_save_creates_and_selects() {
        let (store, session) = fixtures();
        let owner = Some(UserId::random());

        let book = choose(
            &store,
            &session,
            owner,
            ChooseAddress::Manual {
                text: "7 Lake Side".to_string(),
                save: true,
                label: Some("Cabin".to_string()),
                make_default: false,
            },
        )
        .await
        .unwrap();

        assert_eq!(book.addresses.as_ref().unwrap().len(), 1);
        let selected = book.selected().unwrap();
        assert_eq!(selected.full_address, "7 Lake Side");
        assert_eq!(selected.label, "Cabin");

        // The choice survives a reload.
        let again = load(&store, &session, owner).await.unwrap();
        assert_eq!(again.selection, book.selection);
    }

    #[tokio::test]
    async fn test_choose_manual_without_save_keeps_text() {
        let (store, session) = fixtures();
        let book = choose(
            &store,
            &session,
            None,
            ChooseAddress::Manual {
                text: "gate 3".to_string(),
                save: false,
                label: None,
                make_default: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(
            book.selection,
            CheckoutSelection::Manual {
                text: "gate 3".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_saved_manual_address_survives_failed_reload() {
        let (store, session, memory) = fixtures_with_memory();
        let owner = Some(UserId::random());

        memory.fail_next(CallKind::Select, "timeout");
        let book = choose(
            &store,
            &session,
            owner,
            ChooseAddress::Manual {
                text: "4 Dock Rd".to_string(),
                save: true,
                label: None,
                make_default: false,
            },
        )
        .await
        .unwrap();

        assert!(book.addresses.is_none());
        assert!(matches!(book.selection, CheckoutSelection::Saved { .. }));
        assert_eq!(memory.rows("customer_addresses").len(), 1);

        let again = load(&store, &session, owner).await.unwrap();
        assert_eq!(again.selection, book.selection);
    }
}
