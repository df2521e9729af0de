//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mobile_wallet_sync::backend::{
    BackendConnector, BackendError, BackendKind, NetworkBackend, RpcConnectOptions, SpvOptions,
};
use mobile_wallet_sync::config::{NetworkParams, SyncConfig, WalletConfig};
use mobile_wallet_sync::lifecycle::{CancelCause, ShutdownListener};
use mobile_wallet_sync::wallet::engine::{
    AccountProperties, AccountsSnapshot, EngineError, HeaderFetch, PaymentRequest, RescanProgress,
    TransactionBlock, TransactionNotifications, UnsignedTransaction, WalletEngine,
};
use mobile_wallet_sync::wallet::sync::events::SyncEventSender;
use mobile_wallet_sync::wallet::sync::{
    RescanListener, SyncErrorCode, SyncEvent, SyncListener, TransactionListener,
};
use mobile_wallet_sync::wallet::types::Balance;
use tokio::sync::{mpsc, oneshot};

pub const PASSPHRASE: &[u8] = b"correct horse";

/// Poll `condition` until it holds or a second elapses.
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

pub fn test_config(home: &Path) -> WalletConfig {
    let mut config = WalletConfig::new(home, NetworkParams::testnet3());
    config.sync = SyncConfig {
        retry_initial_interval: Duration::from_millis(10),
        retry_max_interval: Duration::from_millis(50),
        ..SyncConfig::default()
    };
    config
}

/// One scripted rescan tick.
#[derive(Debug, Clone)]
pub enum Tick {
    Scanned(i32),
    Failed(String),
}

pub struct MockEngine {
    locked: AtomicBool,
    /// Relock channels of unlocks that have not been released yet.
    relocks: Mutex<Vec<oneshot::Receiver<()>>>,
    pub unlock_attempts: Mutex<Vec<Vec<u8>>>,
    pub backend_sets: Mutex<Vec<Option<BackendKind>>>,
    backend: Mutex<Option<Arc<dyn NetworkBackend>>>,
    pub account_names: Mutex<HashMap<u32, String>>,
    pub accounts: Mutex<Vec<AccountProperties>>,
    pub balances: Mutex<HashMap<u32, Balance>>,
    pub blocks: Mutex<Vec<TransactionBlock>>,
    pub rescan_script: Mutex<Vec<Tick>>,
    /// Keep the rescan open after the script until canceled.
    pub rescan_hangs: AtomicBool,
    pub rescan_finished: AtomicBool,
    notifications: Mutex<Option<mpsc::Receiver<TransactionNotifications>>>,
    pub notifier: mpsc::Sender<TransactionNotifications>,
    pub signed_while_unlocked: AtomicBool,
    pub published: Mutex<Vec<Vec<u8>>>,
    pub closed: AtomicBool,
    /// `discover_accounts` flag of every address discovery.
    pub discoveries: Mutex<Vec<bool>>,
    pub tip: ([u8; 32], i32),
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        let (notifier, notifications) = mpsc::channel(16);
        Arc::new(Self {
            locked: AtomicBool::new(true),
            relocks: Mutex::new(Vec::new()),
            unlock_attempts: Mutex::new(Vec::new()),
            backend_sets: Mutex::new(Vec::new()),
            backend: Mutex::new(None),
            account_names: Mutex::new(HashMap::from([(0, "default".to_string())])),
            accounts: Mutex::new(Vec::new()),
            balances: Mutex::new(HashMap::new()),
            blocks: Mutex::new(Vec::new()),
            rescan_script: Mutex::new(Vec::new()),
            rescan_hangs: AtomicBool::new(false),
            rescan_finished: AtomicBool::new(false),
            notifications: Mutex::new(Some(notifications)),
            notifier,
            signed_while_unlocked: AtomicBool::new(false),
            published: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            discoveries: Mutex::new(Vec::new()),
            tip: ([0xab; 32], 1234),
        })
    }

    pub fn unlock_count(&self) -> usize {
        self.unlock_attempts.lock().unwrap().len()
    }

    /// Apply every relock that has fired or whose sender was dropped.
    fn settle_relocks(&self) {
        let mut relocks = self.relocks.lock().unwrap();
        let before = relocks.len();
        relocks.retain_mut(|relock| {
            matches!(relock.try_recv(), Err(oneshot::error::TryRecvError::Empty))
        });
        if relocks.len() != before {
            self.locked.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait::async_trait]
impl WalletEngine for MockEngine {
    async fn unlock(
        &self,
        passphrase: &[u8],
        relock: oneshot::Receiver<()>,
    ) -> Result<(), EngineError> {
        self.unlock_attempts.lock().unwrap().push(passphrase.to_vec());
        self.settle_relocks();
        if passphrase != PASSPHRASE {
            return Err(EngineError::new("invalid passphrase"));
        }

        self.locked.store(false, Ordering::SeqCst);
        self.relocks.lock().unwrap().push(relock);
        Ok(())
    }

    fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    fn is_locked(&self) -> bool {
        self.settle_relocks();
        self.locked.load(Ordering::SeqCst)
    }

    fn network_backend(&self) -> Result<Arc<dyn NetworkBackend>, EngineError> {
        self.backend
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| EngineError::new("no network backend"))
    }

    fn set_network_backend(&self, backend: Option<Arc<dyn NetworkBackend>>) {
        self.backend_sets
            .lock()
            .unwrap()
            .push(backend.as_ref().map(|b| b.kind()));
        *self.backend.lock().unwrap() = backend;
    }

    fn transaction_notifications(&self) -> mpsc::Receiver<TransactionNotifications> {
        match self.notifications.lock().unwrap().take() {
            Some(rx) => rx,
            None => mpsc::channel(1).1,
        }
    }

    async fn rescan_progress_from_height(
        &self,
        shutdown: ShutdownListener,
        _backend: Arc<dyn NetworkBackend>,
        _start_height: i32,
        progress: mpsc::Sender<RescanProgress>,
    ) {
        let script = self.rescan_script.lock().unwrap().clone();
        for tick in script {
            let item = match &tick {
                Tick::Scanned(height) => RescanProgress::scanned(*height),
                Tick::Failed(message) => RescanProgress::failed(EngineError::new(message.clone())),
            };
            let sent = tokio::select! {
                sent = progress.send(item) => sent.is_ok(),
                _ = shutdown.canceled() => false,
            };
            if !sent || matches!(tick, Tick::Failed(_)) {
                self.rescan_finished.store(true, Ordering::SeqCst);
                return;
            }
        }

        if self.rescan_hangs.load(Ordering::SeqCst) {
            tokio::select! {
                _ = shutdown.canceled() => {}
                _ = progress.closed() => {}
            }
        }
        self.rescan_finished.store(true, Ordering::SeqCst);
    }

    async fn accounts(&self) -> Result<AccountsSnapshot, EngineError> {
        Ok(AccountsSnapshot {
            accounts: self.accounts.lock().unwrap().clone(),
            current_block_hash: self.tip.0,
            current_block_height: self.tip.1,
        })
    }

    async fn account_balance(
        &self,
        account: u32,
        _required_confirmations: i32,
    ) -> Result<Balance, EngineError> {
        self.balances
            .lock()
            .unwrap()
            .get(&account)
            .cloned()
            .ok_or_else(|| EngineError::new("account not found"))
    }

    async fn account_name(&self, account: u32) -> Result<String, EngineError> {
        self.account_names
            .lock()
            .unwrap()
            .get(&account)
            .cloned()
            .ok_or_else(|| EngineError::new("account not found"))
    }

    async fn next_account(&self, name: &str) -> Result<u32, EngineError> {
        if self.is_locked() {
            return Err(EngineError::new("wallet is locked"));
        }
        let mut names = self.account_names.lock().unwrap();
        let number = names.len() as u32;
        names.insert(number, name.to_string());
        Ok(number)
    }

    async fn rename_account(&self, account: u32, name: &str) -> Result<(), EngineError> {
        let mut names = self.account_names.lock().unwrap();
        match names.get_mut(&account) {
            Some(existing) => {
                *existing = name.to_string();
                Ok(())
            }
            None => Err(EngineError::new("account not found")),
        }
    }

    async fn transactions(
        &self,
        _shutdown: ShutdownListener,
    ) -> Result<Vec<TransactionBlock>, EngineError> {
        Ok(self.blocks.lock().unwrap().clone())
    }

    async fn new_unsigned_transaction(
        &self,
        request: &PaymentRequest,
    ) -> Result<UnsignedTransaction, EngineError> {
        Ok(UnsignedTransaction {
            serialized: vec![0x01, 0x00, 0xff],
            total_input: request.amount + 10_000,
            total_output: request.amount + 7_500,
            estimated_signed_size: 250,
        })
    }

    async fn sign_transaction(
        &self,
        unsigned: &UnsignedTransaction,
    ) -> Result<Vec<u8>, EngineError> {
        if self.is_locked() {
            return Err(EngineError::new("wallet is locked"));
        }
        self.signed_while_unlocked.store(true, Ordering::SeqCst);
        let mut signed = unsigned.serialized.clone();
        signed.push(0x5e);
        Ok(signed)
    }

    async fn publish_transaction(
        &self,
        signed: &[u8],
        _backend: Arc<dyn NetworkBackend>,
    ) -> Result<[u8; 32], EngineError> {
        self.published.lock().unwrap().push(signed.to_vec());
        let mut hash = [0u8; 32];
        hash[0] = 0x01;
        hash[31] = 0xff;
        Ok(hash)
    }

    async fn publish_unmined_transactions(
        &self,
        _shutdown: ShutdownListener,
        _backend: Arc<dyn NetworkBackend>,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    async fn fetch_headers(
        &self,
        _shutdown: ShutdownListener,
        _backend: Arc<dyn NetworkBackend>,
    ) -> Result<HeaderFetch, EngineError> {
        Ok(HeaderFetch {
            fetched: 12,
            rescan_from_height: 1200,
        })
    }

    async fn load_active_data_filters(
        &self,
        _shutdown: ShutdownListener,
        _backend: Arc<dyn NetworkBackend>,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    async fn discover_active_addresses(
        &self,
        _shutdown: ShutdownListener,
        _backend: Arc<dyn NetworkBackend>,
        discover_accounts: bool,
    ) -> Result<(), EngineError> {
        self.discoveries.lock().unwrap().push(discover_accounts);
        Ok(())
    }

    fn main_chain_tip(&self) -> ([u8; 32], i32) {
        self.tip
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// What a backend does on one call to `run`.
#[derive(Debug, Clone)]
pub enum RunStep {
    /// Emit the events, then run until canceled.
    EmitThenWait(Vec<SyncEvent>),
    /// Emit the events, then fail.
    EmitThenFail(Vec<SyncEvent>, String),
}

struct ActiveRun(Arc<AtomicUsize>);

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockBackend {
    kind: BackendKind,
    script: Mutex<VecDeque<RunStep>>,
    pub runs: AtomicUsize,
    pub stopped: AtomicBool,
    /// Run loops currently executing across every backend of one connector.
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl NetworkBackend for MockBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn run(
        &self,
        shutdown: ShutdownListener,
        events: SyncEventSender,
    ) -> Result<(), BackendError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        // Also released when the run future is dropped mid-flight.
        let _active = ActiveRun(self.active.clone());

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RunStep::EmitThenWait(Vec::new()));

        let result = match step {
            RunStep::EmitThenWait(batch) => {
                for event in batch {
                    events.emit(event);
                }
                match shutdown.canceled().await {
                    CancelCause::Canceled => Err(BackendError::Canceled),
                    CancelCause::DeadlineExceeded => Err(BackendError::DeadlineExceeded),
                }
            }
            RunStep::EmitThenFail(batch, message) => {
                for event in batch {
                    events.emit(event);
                }
                Err(BackendError::Other(message))
            }
        };
        result
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockConnector {
    pub rpc_failure: Mutex<Option<String>>,
    pub rpc_script: Mutex<Vec<RunStep>>,
    pub spv_script: Mutex<Vec<RunStep>>,
    pub rpc_addresses: Mutex<Vec<String>>,
    pub spv_options: Mutex<Vec<SpvOptions>>,
    pub created: Mutex<Vec<Arc<MockBackend>>>,
    active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn build(&self, kind: BackendKind, script: Vec<RunStep>) -> Arc<MockBackend> {
        let backend = Arc::new(MockBackend {
            kind,
            script: Mutex::new(script.into()),
            runs: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            active: self.active.clone(),
            max_active: self.max_active.clone(),
        });
        self.created.lock().unwrap().push(backend.clone());
        backend
    }

    pub fn backend(&self, index: usize) -> Arc<MockBackend> {
        self.created.lock().unwrap()[index].clone()
    }

    pub fn active_runs(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl BackendConnector for MockConnector {
    async fn connect_rpc(
        &self,
        options: RpcConnectOptions,
        _shutdown: ShutdownListener,
    ) -> Result<Arc<dyn NetworkBackend>, BackendError> {
        self.rpc_addresses.lock().unwrap().push(options.address.clone());
        if let Some(message) = self.rpc_failure.lock().unwrap().clone() {
            return Err(BackendError::Connection(message));
        }
        let script = self.rpc_script.lock().unwrap().clone();
        Ok(self.build(BackendKind::Rpc, script))
    }

    fn new_spv_syncer(&self, options: SpvOptions) -> Result<Arc<dyn NetworkBackend>, BackendError> {
        self.spv_options.lock().unwrap().push(options);
        let script = self.spv_script.lock().unwrap().clone();
        Ok(self.build(BackendKind::Spv, script))
    }
}

#[derive(Default)]
pub struct RecordingSyncListener {
    pub events: Mutex<Vec<SyncEvent>>,
}

impl RecordingSyncListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<(SyncErrorCode, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SyncEvent::SyncError { code, error } => Some((code, error)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: SyncEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl SyncListener for RecordingSyncListener {
    fn on_synced(&self, synced: bool) {
        self.push(SyncEvent::Synced(synced));
    }

    fn on_fetched_headers(&self, peer_initial_height: i32, fetched_count: i32, last_header_time: i64) {
        self.push(SyncEvent::FetchedHeaders {
            peer_initial_height,
            fetched_count,
            last_header_time,
        });
    }

    fn on_fetch_missing_filters(&self, count: i32) {
        self.push(SyncEvent::FetchMissingFilters(count));
    }

    fn on_discovered_addresses(&self, finished: bool) {
        self.push(SyncEvent::DiscoveredAddresses(finished));
    }

    fn on_rescan_progress(&self, through_height: i32) {
        self.push(SyncEvent::RescanProgress(through_height));
    }

    fn on_peer_connected(&self, count: i32) {
        self.push(SyncEvent::PeerConnected(count));
    }

    fn on_peer_disconnected(&self, count: i32) {
        self.push(SyncEvent::PeerDisconnected(count));
    }

    fn on_sync_error(&self, code: SyncErrorCode, error: String) {
        self.push(SyncEvent::SyncError { code, error });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEvent {
    Transaction(String),
    BlockAttached(i32),
    Confirmed(String, i32),
}

#[derive(Default)]
pub struct RecordingTransactionListener {
    pub events: Mutex<Vec<TxEvent>>,
}

impl RecordingTransactionListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<TxEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl TransactionListener for RecordingTransactionListener {
    fn on_transaction(&self, transaction: String) {
        self.events
            .lock()
            .unwrap()
            .push(TxEvent::Transaction(transaction));
    }

    fn on_block_attached(&self, height: i32) {
        self.events.lock().unwrap().push(TxEvent::BlockAttached(height));
    }

    fn on_transaction_confirmed(&self, hash: String, height: i32) {
        self.events
            .lock()
            .unwrap()
            .push(TxEvent::Confirmed(hash, height));
    }
}

#[derive(Default)]
pub struct RecordingRescanListener {
    /// Stop consuming after this many ticks.
    pub stop_after: Option<usize>,
    pub scans: Mutex<Vec<i32>>,
    pub errors: Mutex<Vec<(i32, String)>>,
    pub ends: Mutex<Vec<(i32, bool)>>,
}

impl RecordingRescanListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stopping_after(ticks: usize) -> Arc<Self> {
        Arc::new(Self {
            stop_after: Some(ticks),
            ..Self::default()
        })
    }

    pub fn scans(&self) -> Vec<i32> {
        self.scans.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<(i32, String)> {
        self.errors.lock().unwrap().clone()
    }

    pub fn ends(&self) -> Vec<(i32, bool)> {
        self.ends.lock().unwrap().clone()
    }
}

impl RescanListener for RecordingRescanListener {
    fn on_scan(&self, scanned_through: i32) -> bool {
        let mut scans = self.scans.lock().unwrap();
        scans.push(scanned_through);
        match self.stop_after {
            Some(limit) => scans.len() < limit,
            None => true,
        }
    }

    fn on_error(&self, code: i32, message: String) {
        self.errors.lock().unwrap().push((code, message));
    }

    fn on_end(&self, total_scanned: i32, canceled: bool) {
        self.ends.lock().unwrap().push((total_scanned, canceled));
    }
}
