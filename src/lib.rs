//! Wallet synchronization and transaction reporting for mobile clients.
//!
//! The crate sits between a mobile client and a wallet engine. It keeps the wallet in step with
//! the chain through exactly one network backend at a time (a trusted RPC node or a trustless SPV
//! syncer), classifies the wallet's transactions for display, streams rescan progress and
//! guards the private passphrase.

pub mod backend;
pub mod config;
pub mod lifecycle;
pub mod logging;
pub mod utils;
pub mod wallet;

pub use config::{NetworkParams, SyncConfig, WalletConfig};
pub use lifecycle::{LifecycleController, ShutdownListener};
pub use wallet::{WalletError, WalletService};
