//! Wallet engine collaborator contract.
//!
//! Key derivation, signing, script handling and storage belong to the wallet engine. This crate
//! drives the engine through the `WalletEngine` trait and only reads the data it returns.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::backend::NetworkBackend;
use crate::lifecycle::ShutdownListener;
use crate::wallet::types::{Balance, TransactionType};

/// Opaque failure reported by the wallet engine, surfaced unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A spent output that belonged to the wallet.
#[derive(Debug, Clone)]
pub struct InputSummary {
    pub index: u32,
    pub previous_account: u32,
    pub previous_amount: i64,
}

/// An output paying to the wallet.
#[derive(Debug, Clone)]
pub struct OutputSummary {
    pub index: u32,
    pub account: u32,
    pub internal: bool,
    pub amount: i64,
    /// Encoded destination address
    pub address: String,
}

/// Wallet-relevant view of one transaction.
#[derive(Debug, Clone)]
pub struct TransactionSummary {
    /// Hash in internal byte order
    pub hash: [u8; 32],
    /// Serialized transaction
    pub transaction: Vec<u8>,
    pub my_inputs: Vec<InputSummary>,
    pub my_outputs: Vec<OutputSummary>,
    pub fee: i64,
    pub timestamp: i64,
    pub tx_type: TransactionType,
}

/// A block attached to the main chain with its wallet-relevant transactions, in block order.
#[derive(Debug, Clone)]
pub struct BlockSummary {
    pub hash: [u8; 32],
    pub height: i32,
    pub transactions: Vec<TransactionSummary>,
}

/// One batch from the engine's transaction notification stream.
#[derive(Debug, Clone, Default)]
pub struct TransactionNotifications {
    pub unmined_transactions: Vec<TransactionSummary>,
    pub attached_blocks: Vec<BlockSummary>,
}

/// Transactions grouped by the block that mined them. `height` is `None` for unmined ones.
#[derive(Debug, Clone)]
pub struct TransactionBlock {
    pub height: Option<i32>,
    pub transactions: Vec<TransactionSummary>,
}

/// A progress tick from an engine-driven rescan.
#[derive(Debug)]
pub struct RescanProgress {
    pub scanned_through: i32,
    /// Set on the final tick of a failed rescan.
    pub error: Option<EngineError>,
}

impl RescanProgress {
    pub fn scanned(scanned_through: i32) -> Self {
        Self {
            scanned_through,
            error: None,
        }
    }

    pub fn failed(error: EngineError) -> Self {
        Self {
            scanned_through: 0,
            error: Some(error),
        }
    }
}

/// Engine-side account properties.
#[derive(Debug, Clone)]
pub struct AccountProperties {
    pub number: u32,
    pub name: String,
    pub total_balance: i64,
    pub last_used_external_index: u32,
    pub last_used_internal_index: u32,
    pub imported_key_count: u32,
}

#[derive(Debug, Clone)]
pub struct AccountsSnapshot {
    pub accounts: Vec<AccountProperties>,
    pub current_block_hash: [u8; 32],
    pub current_block_height: i32,
}

/// A payment to construct or send.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub destination: String,
    /// Ignored when `send_all` is set.
    pub amount: i64,
    pub source_account: u32,
    pub required_confirmations: i32,
    /// Sweep every eligible output of the source account to `destination`.
    pub send_all: bool,
}

#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    pub serialized: Vec<u8>,
    pub total_input: i64,
    pub total_output: i64,
    pub estimated_signed_size: u32,
}

/// Outcome of a header fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderFetch {
    pub fetched: i32,
    /// First height that needs rescanning after the fetch.
    pub rescan_from_height: i32,
}

/// Capability the sync layer needs from the wallet engine.
#[async_trait::async_trait]
pub trait WalletEngine: Send + Sync {
    /// Unlock private keys until `relock` resolves, either by a send or by its sender dropping.
    async fn unlock(
        &self,
        passphrase: &[u8],
        relock: oneshot::Receiver<()>,
    ) -> Result<(), EngineError>;

    fn lock(&self);

    fn is_locked(&self) -> bool;

    fn network_backend(&self) -> Result<Arc<dyn NetworkBackend>, EngineError>;

    fn set_network_backend(&self, backend: Option<Arc<dyn NetworkBackend>>);

    /// Subscribe to transaction notifications. Dropping the receiver releases the subscription.
    fn transaction_notifications(&self) -> mpsc::Receiver<TransactionNotifications>;

    /// Rescan from `start_height`, sending height-monotonic progress ticks on `progress`.
    ///
    /// Returns once the rescan finishes, fails, `shutdown` fires, or `progress` is closed.
    async fn rescan_progress_from_height(
        &self,
        shutdown: ShutdownListener,
        backend: Arc<dyn NetworkBackend>,
        start_height: i32,
        progress: mpsc::Sender<RescanProgress>,
    );

    async fn accounts(&self) -> Result<AccountsSnapshot, EngineError>;

    async fn account_balance(
        &self,
        account: u32,
        required_confirmations: i32,
    ) -> Result<Balance, EngineError>;

    async fn account_name(&self, account: u32) -> Result<String, EngineError>;

    /// Create the next BIP0044 account. Requires the wallet to be unlocked.
    async fn next_account(&self, name: &str) -> Result<u32, EngineError>;

    async fn rename_account(&self, account: u32, name: &str) -> Result<(), EngineError>;

    async fn transactions(
        &self,
        shutdown: ShutdownListener,
    ) -> Result<Vec<TransactionBlock>, EngineError>;

    async fn new_unsigned_transaction(
        &self,
        request: &PaymentRequest,
    ) -> Result<UnsignedTransaction, EngineError>;

    /// Sign every input. Requires the wallet to be unlocked.
    async fn sign_transaction(&self, unsigned: &UnsignedTransaction)
    -> Result<Vec<u8>, EngineError>;

    /// Publish a signed transaction, returning its hash in internal byte order.
    async fn publish_transaction(
        &self,
        signed: &[u8],
        backend: Arc<dyn NetworkBackend>,
    ) -> Result<[u8; 32], EngineError>;

    async fn publish_unmined_transactions(
        &self,
        shutdown: ShutdownListener,
        backend: Arc<dyn NetworkBackend>,
    ) -> Result<(), EngineError>;

    async fn fetch_headers(
        &self,
        shutdown: ShutdownListener,
        backend: Arc<dyn NetworkBackend>,
    ) -> Result<HeaderFetch, EngineError>;

    async fn load_active_data_filters(
        &self,
        shutdown: ShutdownListener,
        backend: Arc<dyn NetworkBackend>,
    ) -> Result<(), EngineError>;

    async fn discover_active_addresses(
        &self,
        shutdown: ShutdownListener,
        backend: Arc<dyn NetworkBackend>,
        discover_accounts: bool,
    ) -> Result<(), EngineError>;

    /// Hash (internal byte order) and height of the main chain tip.
    fn main_chain_tip(&self) -> ([u8; 32], i32);

    /// Unload the wallet.
    async fn close(&self) -> Result<(), EngineError>;
}
