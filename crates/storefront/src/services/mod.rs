//! Business logic services for the checkout API.
//!
//! # Services
//!
//! - `addresses` - Saved-address CRUD and single-default promotion
//! - `activity` - Advisory in-flight flags for address operations
//! - `identity` - Access token to identity resolution (cached)
//! - `checkout` - Ephemeral checkout address selection

pub mod activity;
pub mod addresses;
pub mod checkout;
pub mod identity;

pub use activity::{Activity, ActivityFlags, ActivityRegistry, ActivitySnapshot};
pub use addresses::{AddressStore, AddressStoreError, PromotionPhase};
pub use checkout::{AddressBook, CheckoutError, ChooseAddress};
pub use identity::{IdentityError, IdentityProvider, LocalIdentityProvider, RestIdentityProvider};
