//! Chain backend capability.
//!
//! The wallet consumes consensus data through exactly one network backend at a time: either a
//! trusted RPC connection to a single node or a peer-to-peer SPV syncer. Both are opaque to this
//! crate and satisfy the same `NetworkBackend` capability; a `BackendConnector` knows how to create
//! them. The wire protocols, header and filter validation live behind these traits.

/// Host/port normalization and peer list parsing
pub mod address;
/// Shared backend types and errors
mod types;

pub use address::{normalize_address, parse_peer_list};
pub use types::*;

use std::sync::Arc;

use crate::lifecycle::ShutdownListener;
use crate::wallet::sync::events::SyncEventSender;

/// A live connection capability to consensus data.
#[async_trait::async_trait]
pub trait NetworkBackend: Send + Sync {
	fn kind(&self) -> BackendKind;

	/// Run the backend's sync loop until it fails or `shutdown` fires.
	///
	/// Progress is reported by emitting events on `events`; implementations must never block on
	/// it. A loop ended by `shutdown` returns `BackendError::Canceled` or
	/// `BackendError::DeadlineExceeded` depending on the cause.
	async fn run(
		&self,
		shutdown: ShutdownListener,
		events: SyncEventSender,
	) -> Result<(), BackendError>;

	/// Release connections held by the backend. Called once the backend is detached.
	async fn stop(&self);
}

/// Factory for network backends.
#[async_trait::async_trait]
pub trait BackendConnector: Send + Sync {
	/// Connect and authenticate against a trusted node.
	async fn connect_rpc(
		&self,
		options: RpcConnectOptions,
		shutdown: ShutdownListener,
	) -> Result<Arc<dyn NetworkBackend>, BackendError>;

	/// Build a peer-to-peer syncer. The syncer connects when its run loop starts.
	fn new_spv_syncer(&self, options: SpvOptions) -> Result<Arc<dyn NetworkBackend>, BackendError>;
}
