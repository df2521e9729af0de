//! Event system for wallet synchronization.
//!
//! Backends never call client listeners directly. They emit typed `SyncEvent`s onto an unbounded
//! queue, which keeps the sync loop from ever blocking on a slow listener. A single pump task per
//! session drains the queue into an `EventDispatcher`, so handlers never race the producer and
//! events reach every handler in the order they were emitted.
//!
//! This module also defines the listener traits through which clients observe sync progress,
//! transaction notifications and rescans.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::BackendError;
use crate::wallet::WalletError;
use std::sync::Arc;

/// Error codes reported through `SyncListener::on_sync_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorCode {
    Canceled = 1,
    DeadlineExceeded = 2,
    InvalidPeerAddress = 3,
    Other = -1,
}

impl SyncErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<&BackendError> for SyncErrorCode {
    fn from(err: &BackendError) -> Self {
        match err {
            BackendError::Canceled => SyncErrorCode::Canceled,
            BackendError::DeadlineExceeded => SyncErrorCode::DeadlineExceeded,
            BackendError::InvalidPeerAddress(_) => SyncErrorCode::InvalidPeerAddress,
            _ => SyncErrorCode::Other,
        }
    }
}

/// Events emitted by a backend while it syncs
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The backend reached (or lost) sync with the network
    Synced(bool),
    /// A batch of headers was fetched
    FetchedHeaders {
        peer_initial_height: i32,
        fetched_count: i32,
        last_header_time: i64,
    },
    /// Missing compact filters were fetched
    FetchMissingFilters(i32),
    /// Address discovery started (`false`) or finished (`true`)
    DiscoveredAddresses(bool),
    /// Rescan progressed through the given height
    RescanProgress(i32),
    PeerConnected(i32),
    PeerDisconnected(i32),
    /// The run loop failed or ended
    SyncError { code: SyncErrorCode, error: String },
}

impl SyncEvent {
    pub fn from_backend_error(err: &BackendError) -> Self {
        SyncEvent::SyncError {
            code: SyncErrorCode::from(err),
            error: err.to_string(),
        }
    }
}

/// Client listener for sync progress. Callbacks are invoked from a background task.
pub trait SyncListener: Send + Sync {
    fn on_synced(&self, synced: bool);
    fn on_fetched_headers(&self, peer_initial_height: i32, fetched_count: i32, last_header_time: i64);
    fn on_fetch_missing_filters(&self, count: i32);
    fn on_discovered_addresses(&self, finished: bool);
    fn on_rescan_progress(&self, through_height: i32);
    fn on_peer_connected(&self, count: i32);
    fn on_peer_disconnected(&self, count: i32);
    fn on_sync_error(&self, code: SyncErrorCode, error: String);
}

/// Client listener for wallet transaction activity.
pub trait TransactionListener: Send + Sync {
    /// A new unconfirmed transaction, serialized as JSON.
    fn on_transaction(&self, transaction: String);
    fn on_block_attached(&self, height: i32);
    /// `hash` is in display (byte-reversed) order.
    fn on_transaction_confirmed(&self, hash: String, height: i32);
}

/// Client listener for a rescan.
pub trait RescanListener: Send + Sync {
    /// Returns whether the consumer wants further progress.
    fn on_scan(&self, scanned_through: i32) -> bool;
    fn on_error(&self, code: i32, message: String);
    fn on_end(&self, total_scanned: i32, canceled: bool);
}

/// Producer half of a session's event queue. Sending never blocks.
#[derive(Debug, Clone)]
pub struct SyncEventSender {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl SyncEventSender {
    pub fn emit(&self, event: SyncEvent) {
        if self.tx.send(event).is_err() {
            debug!("Sync event dropped, no consumer");
        }
    }
}

/// Consumer half of a session's event queue.
pub type SyncEventReceiver = mpsc::UnboundedReceiver<SyncEvent>;

pub fn sync_event_channel() -> (SyncEventSender, SyncEventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SyncEventSender { tx }, rx)
}

/// Trait for handling sync events.
///
/// Implementors receive all sync events and can perform side effects or state updates.
#[async_trait::async_trait]
pub trait SyncEventHandler: Send + Sync {
    /// Handle a sync event.
    async fn handle(&mut self, event: &SyncEvent) -> Result<(), WalletError>;

    /// Get the name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple event handlers.
///
/// The dispatcher allows multiple handlers to be registered and ensures all are called for each
/// event.
pub struct EventDispatcher {
    handlers: Vec<Box<dyn SyncEventHandler>>,
}

impl EventDispatcher {
    /// Create a new, empty event dispatcher.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Register a new event handler.
    ///
    /// Handlers are called in the order they are registered.
    pub fn register_handler(&mut self, handler: Box<dyn SyncEventHandler>) {
        self.handlers.push(handler);
    }

    /// Dispatch an event to all registered handlers.
    ///
    /// Errors from handlers are logged, but do not stop other handlers from running.
    pub async fn dispatch(&mut self, event: &SyncEvent) {
        for handler in &mut self.handlers {
            if let Err(e) = handler.handle(event).await {
                warn!("Handler {} failed to process event: {}", handler.name(), e);
            }
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain `events` into `dispatcher` until every sender is gone.
pub fn spawn_event_pump(
    mut events: SyncEventReceiver,
    mut dispatcher: EventDispatcher,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            dispatcher.dispatch(&event).await;
        }
        debug!("Sync event queue closed");
    })
}

/// Forwards every event to a client `SyncListener`.
pub struct ListenerHandler {
    listener: Arc<dyn SyncListener>,
}

impl ListenerHandler {
    pub fn new(listener: Arc<dyn SyncListener>) -> Self {
        Self { listener }
    }
}

#[async_trait::async_trait]
impl SyncEventHandler for ListenerHandler {
    async fn handle(&mut self, event: &SyncEvent) -> Result<(), WalletError> {
        match event {
            SyncEvent::Synced(synced) => {
                info!("Synced: {}", synced);
                self.listener.on_synced(*synced);
            }
            SyncEvent::FetchedHeaders {
                peer_initial_height,
                fetched_count,
                last_header_time,
            } => {
                let header_time = chrono::DateTime::from_timestamp(*last_header_time, 0)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| last_header_time.to_string());
                debug!(
                    "Fetched {} headers (peer initial height {}, last header at {})",
                    fetched_count, peer_initial_height, header_time
                );
                self.listener.on_fetched_headers(
                    *peer_initial_height,
                    *fetched_count,
                    *last_header_time,
                );
            }
            SyncEvent::FetchMissingFilters(count) => {
                self.listener.on_fetch_missing_filters(*count);
            }
            SyncEvent::DiscoveredAddresses(finished) => {
                self.listener.on_discovered_addresses(*finished);
            }
            SyncEvent::RescanProgress(height) => {
                self.listener.on_rescan_progress(*height);
            }
            SyncEvent::PeerConnected(count) => {
                self.listener.on_peer_connected(*count);
            }
            SyncEvent::PeerDisconnected(count) => {
                self.listener.on_peer_disconnected(*count);
            }
            SyncEvent::SyncError { code, error } => {
                self.listener.on_sync_error(*code, error.clone());
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ListenerHandler"
    }
}
