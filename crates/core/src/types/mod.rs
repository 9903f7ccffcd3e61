//! Core types for Waypoint.
//!
//! This module provides type-safe wrappers for the address book domain.

pub mod address;
pub mod id;
pub mod input;
pub mod selection;

pub use address::{Address, DEFAULT_LABEL, sort_for_display};
pub use id::*;
pub use input::{
    AddressError, AddressPatch, FullAddress, Label, NewAddress, ValidatedNewAddress, WardNumber,
};
pub use selection::{CheckoutSelection, derive_initial_selection};
