//! Utility module for the wallet sync crate.
//!
//! Re-exports formatting helpers used for logging and for the client-facing JSON contracts.
/// Utility functions for formatting and display
pub mod index;

pub use index::{format_atoms, reverse_hash_hex};
