//! Waypoint Core - Shared address types.
//!
//! This crate provides the domain types used by every Waypoint component:
//! - `storefront` - Customer-facing checkout API (address book + selection)
//! - `integration-tests` - End-to-end checks against the in-memory backend
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no remote
//! store access, no HTTP clients. This keeps it lightweight and allows it to
//! be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, saved addresses, address input validation and
//!   checkout selection

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
