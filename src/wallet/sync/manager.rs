//! Backend selection and sync session ownership.
//!
//! This module defines the `SyncManager`, the single owner of the wallet's network backend slot.
//! At most one backend is installed at a time. Switching backends, detaching them and subscribing
//! to block notifications are serialized through one transition lock, and a switch always tears
//! down the previous backend's run loop before the new backend is installed.
//!
//! Reads of the installed backend never wait on a transition: they go through a separate
//! read-mostly slot that is cleared as soon as a teardown starts, so callers fail fast with
//! `NoBackend` instead of blocking on a backend that is going away.
//!
//! Each installed backend gets a session:
//! - a cancellation lifetime derived from the process shutdown signal
//! - once its run loop starts, a task driving a `SyncStrategy` and an event pump forwarding the
//!   backend's events to the client's `SyncListener`

use crate::backend::{
    ActiveBackend, BackendConnector, BackendKind, NetworkBackend, RpcConnectOptions, SpvOptions,
    normalize_address, parse_peer_list,
};
use crate::config::{NetworkParams, SyncConfig};
use crate::lifecycle::{CancelHandle, ShutdownListener};
use crate::wallet::WalletError;
use crate::wallet::engine::WalletEngine;
use crate::wallet::passphrase::{Scrub, UnlockScope, unlock_scoped};
use crate::wallet::sync::{
    events::{
        EventDispatcher, ListenerHandler, SyncErrorCode, SyncEvent, SyncEventHandler, SyncListener,
        spawn_event_pump, sync_event_channel,
    },
    strategies::{RestartingSync, SessionOutcome, SingleRunSync, SyncStrategy},
};

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

/// Compare two backends by identity.
fn same_backend(a: &Arc<dyn NetworkBackend>, b: &Arc<dyn NetworkBackend>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Everything owned on behalf of one installed backend.
struct SyncSession {
    backend: Arc<dyn NetworkBackend>,
    shutdown: ShutdownListener,
    cancel: CancelHandle,
    /// Run loop task, once started.
    task: Option<JoinHandle<SessionOutcome>>,
}

impl SyncSession {
    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

/// Relocks the wallet once the first full sync after account discovery completes.
struct RelockOnSynced {
    unlock: Option<UnlockScope>,
}

#[async_trait::async_trait]
impl SyncEventHandler for RelockOnSynced {
    async fn handle(&mut self, event: &SyncEvent) -> Result<(), WalletError> {
        if let SyncEvent::Synced(true) = event {
            if let Some(scope) = self.unlock.take() {
                info!("Initial sync complete, relocking wallet after account discovery");
                scope.relock();
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "RelockOnSynced"
    }
}

struct ManagerShared {
    engine: Arc<dyn WalletEngine>,
    current: RwLock<ActiveBackend>,
    transition: Mutex<Option<SyncSession>>,
}

impl ManagerShared {
    fn set_current(&self, backend: ActiveBackend) {
        self.engine.set_network_backend(backend.backend());
        match self.current.write() {
            Ok(mut current) => *current = backend,
            Err(poisoned) => *poisoned.into_inner() = backend,
        }
    }

    fn current(&self) -> ActiveBackend {
        match self.current.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Stop a session and wait for its run loop to end. Callers hold the transition lock.
    async fn teardown(&self, session: SyncSession) {
        let kind = session.backend.kind();
        debug!("Tearing down {} backend", kind);

        self.set_current(ActiveBackend::None);
        // Cancel before waiting so a run loop blocked on the transition lock can give up.
        session.cancel.cancel();
        session.backend.stop().await;

        if let Some(task) = session.task {
            match task.await {
                Ok(outcome) => debug!("{} run loop ended: {:?}", kind, outcome),
                Err(e) => error!("{} run loop ended abnormally: {}", kind, e),
            }
        }
        info!("Detached {} backend", kind);
    }

    /// Detach `backend` after its run loop failed, unless it was already replaced.
    async fn detach_failed(&self, backend: &Arc<dyn NetworkBackend>, shutdown: &ShutdownListener) {
        let mut slot = tokio::select! {
            slot = self.transition.lock() => slot,
            // A teardown is already waiting on this session.
            _ = shutdown.canceled() => return,
        };

        let owned = slot
            .as_ref()
            .is_some_and(|session| same_backend(&session.backend, backend));
        if !owned {
            return;
        }

        // The session's own task is the one running this, so it is not awaited.
        if let Some(session) = slot.take() {
            self.set_current(ActiveBackend::None);
            session.cancel.cancel();
            session.backend.stop().await;
            warn!("Detached {} backend after run loop failure", session.backend.kind());
        }
    }
}

/// Owns the wallet's network backend and its sync sessions.
pub struct SyncManager {
    shared: Arc<ManagerShared>,
    connector: Arc<dyn BackendConnector>,
    shutdown: ShutdownListener,
    network: NetworkParams,
    data_dir: PathBuf,
    config: SyncConfig,
}

impl SyncManager {
    /// Create a manager with no backend installed.
    ///
    /// `data_dir` is the per-network directory; the peer address manager persists into it.
    pub fn new(
        engine: Arc<dyn WalletEngine>,
        connector: Arc<dyn BackendConnector>,
        shutdown: ShutdownListener,
        network: NetworkParams,
        data_dir: PathBuf,
        config: SyncConfig,
    ) -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                engine,
                current: RwLock::new(ActiveBackend::None),
                transition: Mutex::new(None),
            }),
            connector,
            shutdown,
            network,
            data_dir,
            config,
        }
    }

    /// The installed backend. Never waits on an in-flight transition.
    pub fn current_backend(&self) -> ActiveBackend {
        self.shared.current()
    }

    pub fn is_backend_installed(&self) -> bool {
        !self.current_backend().is_none()
    }

    /// Connect a trusted RPC backend and install it, replacing any installed backend.
    ///
    /// The run loop does not start until `subscribe_to_block_notifications` is called.
    ///
    /// # Errors
    /// `InvalidArgument` for a malformed address, `ConnectionError` for transport or
    /// authentication failures. On error the previously installed backend is left untouched.
    pub async fn start_trusted_backend(
        &self,
        address: &str,
        user: &str,
        password: &str,
        certificate: &[u8],
    ) -> Result<(), WalletError> {
        let address = normalize_address(address, self.network.rpc_default_port).map_err(|e| {
            error!("Invalid RPC address {:?}: {}", address, e);
            WalletError::InvalidArgument(e.to_string())
        })?;

        info!("Connecting to consensus RPC server at {}", address);
        let (session_shutdown, cancel) = self.shutdown.child();
        let options = RpcConnectOptions {
            address: address.clone(),
            user: user.to_string(),
            password: Zeroizing::new(password.to_string()),
            certificate: certificate.to_vec(),
        };

        let backend = match self
            .connector
            .connect_rpc(options, session_shutdown.clone())
            .await
        {
            Ok(backend) => backend,
            Err(e) => {
                cancel.cancel();
                error!("Failed to connect to RPC server {}: {}", address, e);
                return Err(if e.is_cancellation() {
                    WalletError::from(e)
                } else {
                    WalletError::ConnectionError(e.to_string())
                });
            }
        };

        let mut slot = self.shared.transition.lock().await;
        if let Some(previous) = slot.take() {
            self.shared.teardown(previous).await;
        }
        self.shared.set_current(ActiveBackend::from_backend(backend.clone()));
        *slot = Some(SyncSession {
            backend,
            shutdown: session_shutdown,
            cancel,
            task: None,
        });

        info!("Connected to consensus RPC server at {}", address);
        Ok(())
    }

    /// Start the trusted backend's run loop, forwarding its events to `listener`.
    ///
    /// If the run loop later fails for any reason other than cancellation, the backend is
    /// detached and the failure is reported through `listener`; the client re-arms by starting
    /// a trusted backend again.
    ///
    /// # Errors
    /// `NotLoaded` when no trusted backend is installed, `InvalidArgument` when its run loop is
    /// already running.
    pub async fn subscribe_to_block_notifications(
        &self,
        listener: Arc<dyn SyncListener>,
    ) -> Result<(), WalletError> {
        let mut slot = self.shared.transition.lock().await;
        let session = slot
            .as_mut()
            .filter(|session| session.backend.kind() == BackendKind::Rpc)
            .ok_or_else(|| WalletError::NotLoaded("Consensus server RPC client".to_string()))?;

        if session.is_running() {
            return Err(WalletError::InvalidArgument(
                "block notifications are already subscribed".to_string(),
            ));
        }

        info!("Subscribing to block notifications");
        let handlers: Vec<Box<dyn SyncEventHandler>> = vec![Box::new(ListenerHandler::new(listener))];
        session.task = Some(spawn_session(
            self.shared.clone(),
            session.backend.clone(),
            session.shutdown.clone(),
            Box::new(SingleRunSync),
            handlers,
            true,
        ));
        Ok(())
    }

    /// Start a trustless SPV backend, replacing any installed backend.
    ///
    /// `peers` is a `;`-separated list of persistent peers; empty means peer discovery. With
    /// `discover_accounts` the wallet is unlocked with `passphrase` for account discovery and
    /// relocked once the first sync completes.
    ///
    /// `passphrase` is zeroed before this returns, whatever the outcome.
    ///
    /// # Errors
    /// `InvalidArgument` when discovery is requested without a passphrase or a peer entry is
    /// malformed (the latter is also reported to `listener` as an invalid peer address). Engine
    /// unlock failures are propagated unchanged, after any previous backend was detached. On error
    /// nothing is installed and the wallet is left locked.
    pub async fn start_trustless_backend(
        &self,
        peers: &str,
        discover_accounts: bool,
        passphrase: &mut [u8],
        listener: Arc<dyn SyncListener>,
    ) -> Result<(), WalletError> {
        let mut secret = Scrub(passphrase);

        if discover_accounts && secret.0.is_empty() {
            return Err(WalletError::InvalidArgument(
                "private passphrase is required for discovering accounts".to_string(),
            ));
        }

        let persistent_peers = match parse_peer_list(peers, self.network.peer_default_port) {
            Ok(peers) => peers,
            Err(e) => {
                error!("SPV connect address invalid: {}", e);
                listener.on_sync_error(
                    SyncErrorCode::InvalidPeerAddress,
                    format!("SPV connect address invalid: {}", e),
                );
                return Err(WalletError::InvalidArgument(e.to_string()));
            }
        };

        tokio::fs::create_dir_all(&self.data_dir).await?;
        let options = SpvOptions::new(self.data_dir.clone(), persistent_peers);
        if options.persistent_peers.is_empty() {
            info!("Starting SPV sync with peer discovery");
        } else {
            info!(
                "Starting SPV sync with persistent peers {:?}",
                options.persistent_peers
            );
        }
        let backend = self.connector.new_spv_syncer(options)?;

        // The previous session may hold a discovery unlock; it must be released before ours.
        let mut slot = self.shared.transition.lock().await;
        if let Some(previous) = slot.take() {
            self.shared.teardown(previous).await;
        }

        let unlock = if discover_accounts {
            Some(unlock_scoped(self.shared.engine.as_ref(), &mut *secret.0).await?)
        } else {
            drop(secret);
            None
        };

        let (session_shutdown, cancel) = self.shutdown.child();
        let handlers: Vec<Box<dyn SyncEventHandler>> = vec![
            Box::new(ListenerHandler::new(listener)),
            Box::new(RelockOnSynced { unlock }),
        ];

        self.shared.set_current(ActiveBackend::from_backend(backend.clone()));
        let task = spawn_session(
            self.shared.clone(),
            backend.clone(),
            session_shutdown.clone(),
            Box::new(RestartingSync::new(self.config.clone())),
            handlers,
            false,
        );
        *slot = Some(SyncSession {
            backend,
            shutdown: session_shutdown,
            cancel,
            task: Some(task),
        });
        Ok(())
    }

    /// Stop the installed backend's run loop and detach it. A no-op when nothing is installed.
    pub async fn stop_and_detach(&self) {
        let mut slot = self.shared.transition.lock().await;
        match slot.take() {
            Some(session) => self.shared.teardown(session).await,
            None => debug!("No backend to detach"),
        }
    }
}

/// Spawn the task driving `backend`'s run loop under `strategy`.
///
/// Events are pumped into `handlers` in emission order. The task returns once the run loop has
/// ended and every event it emitted has been handled.
fn spawn_session(
    shared: Arc<ManagerShared>,
    backend: Arc<dyn NetworkBackend>,
    shutdown: ShutdownListener,
    mut strategy: Box<dyn SyncStrategy>,
    handlers: Vec<Box<dyn SyncEventHandler>>,
    detach_on_error: bool,
) -> JoinHandle<SessionOutcome> {
    tokio::spawn(async move {
        let (events, receiver) = sync_event_channel();
        let mut dispatcher = EventDispatcher::new();
        for handler in handlers {
            dispatcher.register_handler(handler);
        }
        let pump = spawn_event_pump(receiver, dispatcher);

        info!("Starting {} run loop ({})", backend.kind(), strategy.name());
        let outcome = strategy
            .run(backend.clone(), shutdown.clone(), events)
            .await;

        if let Err(e) = pump.await {
            error!("Sync event pump ended abnormally: {}", e);
        }

        if detach_on_error && matches!(outcome, SessionOutcome::Errored(_)) {
            shared.detach_failed(&backend, &shutdown).await;
        }
        outcome
    })
}
