//! Types shared by chain backend implementations

use std::fmt;
use std::net::{Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use zeroize::Zeroizing;

use super::NetworkBackend;

/// Which kind of chain backend is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Trusted single-node JSON-RPC connection
    Rpc,
    /// Trust-minimized peer-to-peer syncer
    Spv,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Rpc => f.write_str("rpc"),
            BackendKind::Spv => f.write_str("spv"),
        }
    }
}

/// The backend currently installed on the wallet.
///
/// At most one non-`None` value is active at a time.
#[derive(Clone, Default)]
pub enum ActiveBackend {
    #[default]
    None,
    Rpc(Arc<dyn NetworkBackend>),
    Spv(Arc<dyn NetworkBackend>),
}

impl ActiveBackend {
    pub fn from_backend(backend: Arc<dyn NetworkBackend>) -> Self {
        match backend.kind() {
            BackendKind::Rpc => ActiveBackend::Rpc(backend),
            BackendKind::Spv => ActiveBackend::Spv(backend),
        }
    }

    pub fn kind(&self) -> Option<BackendKind> {
        match self {
            ActiveBackend::None => None,
            ActiveBackend::Rpc(_) => Some(BackendKind::Rpc),
            ActiveBackend::Spv(_) => Some(BackendKind::Spv),
        }
    }

    pub fn backend(&self) -> Option<Arc<dyn NetworkBackend>> {
        match self {
            ActiveBackend::None => None,
            ActiveBackend::Rpc(backend) | ActiveBackend::Spv(backend) => Some(backend.clone()),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ActiveBackend::None)
    }
}

impl fmt::Debug for ActiveBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "ActiveBackend({})", kind),
            None => f.write_str("ActiveBackend(none)"),
        }
    }
}

/// Parameters for connecting a trusted RPC backend.
pub struct RpcConnectOptions {
    /// Normalized `host:port` of the node.
    pub address: String,
    pub user: String,
    /// Scrubbed when the options are dropped.
    pub password: Zeroizing<String>,
    /// PEM certificate of the node's TLS endpoint.
    pub certificate: Vec<u8>,
}

impl fmt::Debug for RpcConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcConnectOptions")
            .field("address", &self.address)
            .field("user", &self.user)
            .field("certificate_len", &self.certificate.len())
            .finish_non_exhaustive()
    }
}

/// Parameters for building a peer-to-peer syncer.
#[derive(Debug, Clone)]
pub struct SpvOptions {
    /// Local peer identity address.
    pub local_address: SocketAddr,
    /// Directory the peer address manager persists into.
    pub address_manager_dir: PathBuf,
    /// Normalized peers to stay connected to. Empty means peer discovery.
    pub persistent_peers: Vec<String>,
}

impl SpvOptions {
    pub fn new(address_manager_dir: PathBuf, persistent_peers: Vec<String>) -> Self {
        Self {
            local_address: SocketAddr::from((Ipv6Addr::LOCALHOST, 0)),
            address_manager_dir,
            persistent_peers,
        }
    }
}

/// Error types for chain backend operations
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid peer address: {0}")]
    InvalidPeerAddress(String),

    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Cancellation outcomes end a run loop permanently and are never retried.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, BackendError::Canceled | BackendError::DeadlineExceeded)
    }
}
