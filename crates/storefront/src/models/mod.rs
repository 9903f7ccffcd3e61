//! Session and identity models.

pub mod session;

pub use session::{Identity, keys as session_keys};
