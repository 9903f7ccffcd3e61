//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::{Backend, StorefrontConfig};
use crate::middleware::Caller;
use crate::remote::{MemoryStore, RestClient, StoreBackend};
use crate::services::{
    ActivityRegistry, ActivitySnapshot, AddressStore, IdentityProvider, LocalIdentityProvider,
    RestIdentityProvider,
};

/// Error creating application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("rest backend selected but remote store is not configured")]
    MissingRemoteConfig,
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the remote store, identity provider and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    backend: StoreBackend,
    identity: Arc<dyn IdentityProvider>,
    activity: ActivityRegistry,
}

impl AppState {
    /// Create application state for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the `rest` backend is selected without remote
    /// store configuration.
    pub fn new(config: StorefrontConfig) -> Result<Self, StateError> {
        let (backend, identity) = match config.backend {
            Backend::Rest => {
                let remote = config
                    .remote
                    .as_ref()
                    .ok_or(StateError::MissingRemoteConfig)?;
                let client = RestClient::new(remote);
                let identity = RestIdentityProvider::new(client.clone(), config.identity_cache_ttl);
                let identity: Arc<dyn IdentityProvider> = Arc::new(identity);
                (StoreBackend::Rest(client), identity)
            }
            Backend::Memory => {
                let identity: Arc<dyn IdentityProvider> =
                    Arc::new(LocalIdentityProvider::new().accepting_uuid_tokens());
                (StoreBackend::Memory(MemoryStore::new()), identity)
            }
        };

        Ok(Self::with_backends(config, backend, identity))
    }

    /// Create application state from explicit collaborators.
    #[must_use]
    pub fn with_backends(
        config: StorefrontConfig,
        backend: StoreBackend,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                identity,
                activity: ActivityRegistry::default(),
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the identity provider.
    #[must_use]
    pub fn identity(&self) -> &dyn IdentityProvider {
        self.inner.identity.as_ref()
    }

    /// An address store acting with the caller's credentials and reporting
    /// into the caller's own activity flags.
    pub async fn address_store(&self, caller: &Caller) -> AddressStore {
        AddressStore::new(
            self.inner.backend.store_for(caller.access_token()),
            self.inner.config.address_table.clone(),
            self.inner.activity.flags_for(caller.user_id()).await,
        )
    }

    /// The caller's in-flight address operations.
    pub async fn activity(&self, caller: &Caller) -> ActivitySnapshot {
        self.inner.activity.snapshot(caller.user_id()).await
    }
}
