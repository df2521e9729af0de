//! Wallet Synchronization Module
//!
//! This module provides the logic that keeps a wallet in step with the chain through a network
//! backend and reports what happens to the client. It is composed of several submodules:
//!
//! - `manager`: Owns the backend slot and the run loop of the installed backend.
//! - `events`: Sync event types, client listener traits and the event dispatcher.
//! - `strategies`: How a backend's run loop is driven (restart with backoff, or run once).
//! - `notifications`: Forwards engine transaction notifications to a client listener.
//! - `transaction_processor`: Classifies transactions and builds client-facing records.
//! - `rescan`: Cancellable rescans with streamed progress.
//! - `progress_tracker`: Running totals and statistics for rescans.

/// Event system for decoupled communication during sync
pub mod events;
/// Backend slot and sync session ownership
pub mod manager;
/// Transaction notification forwarding
pub mod notifications;
/// Tracks rescan progress and statistics
pub mod progress_tracker;
/// Cancellable rescans
pub mod rescan;
/// Run loop strategies
pub mod strategies;
/// Transaction classification and record building
pub mod transaction_processor;

pub use events::{RescanListener, SyncErrorCode, SyncEvent, SyncListener, TransactionListener};
pub use manager::SyncManager;
pub use notifications::NotificationBridge;
pub use rescan::{RescanCoordinator, RescanOutcome};
