//! Client-facing wallet facade.
//!
//! `WalletService` wires the wallet engine to the sync manager, the passphrase guard, rescans and
//! the process lifecycle, and exposes the operations a mobile client calls. Query results that
//! cross the client boundary are returned as JSON strings.

use crate::backend::{ActiveBackend, BackendConnector, NetworkBackend};
use crate::config::WalletConfig;
use crate::lifecycle::LifecycleController;
use crate::utils::{format_atoms, reverse_hash_hex};
use crate::wallet::engine::{EngineError, PaymentRequest, WalletEngine};
use crate::wallet::passphrase::{PassphraseGuard, Scrub, UnlockOutcome, unlock_scoped};
use crate::wallet::sync::{
    NotificationBridge, RescanCoordinator, RescanListener, RescanOutcome, SyncListener,
    SyncManager, TransactionListener, transaction_processor::TransactionProcessor,
};
use crate::wallet::types::{
    Account, AccountsResponse, ConstructTxResponse, TransactionsResponse, WalletError,
};

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Log an engine failure before surfacing it.
fn engine_failure(context: &'static str) -> impl FnOnce(EngineError) -> WalletError {
    move |e| {
        error!("{}: {}", context, e);
        WalletError::from(e)
    }
}

/// The wallet as seen by a client.
pub struct WalletService {
    engine: Arc<dyn WalletEngine>,
    config: WalletConfig,
    lifecycle: Arc<LifecycleController>,
    sync: SyncManager,
    guard: PassphraseGuard,
    rescans: RescanCoordinator,
    processor: TransactionProcessor,
}

impl WalletService {
    pub fn new(
        engine: Arc<dyn WalletEngine>,
        connector: Arc<dyn BackendConnector>,
        config: WalletConfig,
        lifecycle: Arc<LifecycleController>,
    ) -> Self {
        let sync = SyncManager::new(
            engine.clone(),
            connector,
            lifecycle.listener(),
            config.network.clone(),
            config.data_dir(),
            config.sync.clone(),
        );
        let rescans = RescanCoordinator::new(
            engine.clone(),
            lifecycle.listener(),
            config.sync.rescan_channel_capacity,
        );

        Self {
            guard: PassphraseGuard::new(engine.clone()),
            processor: TransactionProcessor::new(engine.clone()),
            engine,
            config,
            lifecycle,
            sync,
            rescans,
        }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn sync_manager(&self) -> &SyncManager {
        &self.sync
    }

    /// The installed backend, or `NoBackend`.
    fn require_backend(&self) -> Result<Arc<dyn NetworkBackend>, WalletError> {
        self.sync
            .current_backend()
            .backend()
            .ok_or(WalletError::NoBackend)
    }

    /// Unlock the wallet until `lock_wallet` or `shutdown`. The buffer is zeroed.
    pub async fn unlock_wallet(&self, passphrase: &mut [u8]) -> Result<UnlockOutcome, WalletError> {
        self.guard.unlock(passphrase).await
    }

    pub async fn lock_wallet(&self) {
        self.guard.relock().await;
        if !self.engine.is_locked() {
            self.engine.lock();
        }
    }

    /// Shut the wallet down: raise the shutdown signal, relock, detach the backend and close the
    /// engine. Only the first call does anything.
    pub async fn shutdown(&self) -> Result<(), WalletError> {
        if !self.lifecycle.request_shutdown() {
            return Ok(());
        }

        self.lock_wallet().await;
        self.sync.stop_and_detach().await;
        self.engine
            .close()
            .await
            .map_err(engine_failure("Failed to close wallet"))?;
        info!("Wallet closed");
        Ok(())
    }

    pub async fn start_rpc_client(
        &self,
        address: &str,
        user: &str,
        password: &str,
        certificate: &[u8],
    ) -> Result<(), WalletError> {
        self.sync
            .start_trusted_backend(address, user, password, certificate)
            .await
    }

    pub async fn subscribe_to_block_notifications(
        &self,
        listener: Arc<dyn SyncListener>,
    ) -> Result<(), WalletError> {
        self.sync.subscribe_to_block_notifications(listener).await
    }

    pub async fn spv_sync(
        &self,
        listener: Arc<dyn SyncListener>,
        peers: &str,
        discover_accounts: bool,
        passphrase: &mut [u8],
    ) -> Result<(), WalletError> {
        self.sync
            .start_trustless_backend(peers, discover_accounts, passphrase, listener)
            .await
    }

    pub async fn stop_backend(&self) {
        self.sync.stop_and_detach().await;
    }

    pub fn is_net_backend_nil(&self) -> bool {
        !self.sync.is_backend_installed()
    }

    /// Rescan from `start_height` through the installed backend.
    pub fn rescan(
        &self,
        start_height: i32,
        listener: Arc<dyn RescanListener>,
    ) -> Result<JoinHandle<RescanOutcome>, WalletError> {
        self.rescans
            .start_from_height(start_height, self.sync.current_backend(), listener)
    }

    /// Forward transaction notifications to `listener` until shutdown.
    pub fn transaction_notification(&self, listener: Arc<dyn TransactionListener>) -> JoinHandle<()> {
        NotificationBridge::spawn(self.engine.clone(), listener, self.lifecycle.listener())
    }

    /// Accounts with balances, as JSON.
    ///
    /// Key counts are the last used index plus the gap limit.
    pub async fn get_accounts(&self, required_confirmations: i32) -> Result<String, WalletError> {
        let snapshot = self
            .engine
            .accounts()
            .await
            .map_err(engine_failure("Failed to list accounts"))?;

        let gap_limit = self.config.gap_limit;
        let mut accounts = Vec::with_capacity(snapshot.accounts.len());
        for properties in snapshot.accounts {
            let balance = self
                .engine
                .account_balance(properties.number, required_confirmations)
                .await
                .map_err(engine_failure("Failed to get account balance"))?;

            accounts.push(Account {
                number: properties.number as i32,
                name: properties.name,
                total_balance: properties.total_balance,
                balance,
                external_key_count: properties.last_used_external_index.saturating_add(gap_limit)
                    as i32,
                internal_key_count: properties.last_used_internal_index.saturating_add(gap_limit)
                    as i32,
                imported_key_count: properties.imported_key_count as i32,
            });
        }

        let response = AccountsResponse {
            count: accounts.len(),
            current_block_hash: reverse_hash_hex(&snapshot.current_block_hash),
            current_block_height: snapshot.current_block_height,
            acc: accounts,
            error_occurred: false,
        };
        Ok(serde_json::to_string(&response)?)
    }

    pub async fn spendable_for_account(
        &self,
        account: u32,
        required_confirmations: i32,
    ) -> Result<i64, WalletError> {
        let balance = self
            .engine
            .account_balance(account, required_confirmations)
            .await
            .map_err(engine_failure("Failed to get account balance"))?;
        Ok(balance.spendable)
    }

    pub async fn account_name(&self, account: u32) -> String {
        self.processor.account_name(account).await
    }

    /// Transaction history, as JSON. Mined records carry their block height, unmined ones -1.
    pub async fn get_transactions(&self) -> Result<String, WalletError> {
        let blocks = self
            .engine
            .transactions(self.lifecycle.listener())
            .await
            .map_err(engine_failure("Failed to get transactions"))?;

        let response = TransactionsResponse {
            error_occurred: false,
            transactions: self.processor.process_blocks_batch(&blocks).await,
        };
        Ok(serde_json::to_string(&response)?)
    }

    fn validate_payment(request: &PaymentRequest) -> Result<(), WalletError> {
        if request.destination.is_empty() {
            return Err(WalletError::InvalidArgument(
                "destination address is required".to_string(),
            ));
        }
        if !request.send_all && request.amount <= 0 {
            return Err(WalletError::InvalidArgument(format!(
                "invalid amount {}",
                request.amount
            )));
        }
        Ok(())
    }

    /// Build an unsigned transaction paying `request`.
    pub async fn construct_transaction(
        &self,
        request: &PaymentRequest,
    ) -> Result<ConstructTxResponse, WalletError> {
        Self::validate_payment(request)?;
        let unsigned = self
            .engine
            .new_unsigned_transaction(request)
            .await
            .map_err(engine_failure("Failed to construct transaction"))?;

        Ok(ConstructTxResponse {
            total_output_amount: unsigned.total_output,
            unsigned_transaction: hex::encode(&unsigned.serialized),
            total_previous_output_amount: unsigned.total_input,
            estimated_signed_size: unsigned.estimated_signed_size as i32,
        })
    }

    /// Construct, sign and publish a payment, returning its hash in display order.
    ///
    /// The wallet is unlocked for signing only. `passphrase` is zeroed on every path.
    pub async fn send_transaction(
        &self,
        passphrase: &mut [u8],
        request: &PaymentRequest,
    ) -> Result<String, WalletError> {
        let mut secret = Scrub(passphrase);
        Self::validate_payment(request)?;
        let backend = self.require_backend()?;

        let unsigned = self
            .engine
            .new_unsigned_transaction(request)
            .await
            .map_err(engine_failure("Failed to construct transaction"))?;

        let scope = unlock_scoped(self.engine.as_ref(), &mut *secret.0).await?;
        let signed = self.engine.sign_transaction(&unsigned).await;
        scope.relock();
        let signed = signed.map_err(engine_failure("Failed to sign transaction"))?;

        let hash = self
            .engine
            .publish_transaction(&signed, backend)
            .await
            .map_err(engine_failure("Failed to publish transaction"))?;

        let hash = reverse_hash_hex(&hash);
        info!(
            "Sent {} from account {} to {}: {}",
            format_atoms(unsigned.total_output),
            request.source_account,
            request.destination,
            hash
        );
        Ok(hash)
    }

    /// Create the next account named `name`. `passphrase` is zeroed on every path.
    pub async fn next_account(&self, name: &str, passphrase: &mut [u8]) -> Result<u32, WalletError> {
        let mut secret = Scrub(passphrase);
        if name.is_empty() {
            return Err(WalletError::InvalidArgument(
                "account name is required".to_string(),
            ));
        }

        let scope = unlock_scoped(self.engine.as_ref(), &mut *secret.0).await?;
        let account = self.engine.next_account(name).await;
        scope.relock();
        let account = account.map_err(engine_failure("Failed to create account"))?;
        info!("Created account {} ({})", account, name);
        Ok(account)
    }

    pub async fn rename_account(&self, account: u32, new_name: &str) -> Result<(), WalletError> {
        if new_name.is_empty() {
            return Err(WalletError::InvalidArgument(
                "account name is required".to_string(),
            ));
        }
        self.engine
            .rename_account(account, new_name)
            .await
            .map_err(engine_failure("Failed to rename account"))
    }

    pub async fn publish_unmined_transactions(&self) -> Result<(), WalletError> {
        let backend = self.require_backend()?;
        self.engine
            .publish_unmined_transactions(self.lifecycle.listener(), backend)
            .await
            .map_err(engine_failure("Failed to publish unmined transactions"))
    }

    /// Fetch headers through the installed backend.
    ///
    /// Returns the height to rescan from when new headers were fetched.
    pub async fn fetch_headers(&self) -> Result<Option<i32>, WalletError> {
        let backend = self.require_backend()?;
        let fetch = self
            .engine
            .fetch_headers(self.lifecycle.listener(), backend)
            .await
            .map_err(engine_failure("Failed to fetch headers"))?;

        if fetch.fetched > 0 {
            info!(
                "Fetched {} headers, rescan from {}",
                fetch.fetched, fetch.rescan_from_height
            );
            Ok(Some(fetch.rescan_from_height))
        } else {
            Ok(None)
        }
    }

    pub async fn load_active_data_filters(&self) -> Result<(), WalletError> {
        let backend = self.require_backend()?;
        self.engine
            .load_active_data_filters(self.lifecycle.listener(), backend)
            .await
            .map_err(engine_failure("Failed to load active data filters"))
    }

    /// Discover used addresses through the trusted backend.
    ///
    /// Accounts are discovered as well when the wallet is unlocked at the time of the call.
    pub async fn discover_active_addresses(&self) -> Result<(), WalletError> {
        let backend = match self.sync.current_backend() {
            ActiveBackend::Rpc(backend) => backend,
            _ => {
                return Err(WalletError::NotLoaded(
                    "Consensus server RPC client".to_string(),
                ));
            }
        };

        let discover_accounts = !self.engine.is_locked();
        if !discover_accounts {
            info!("Wallet is locked; discovering addresses only");
        }

        self.engine
            .discover_active_addresses(self.lifecycle.listener(), backend, discover_accounts)
            .await
            .map_err(engine_failure("Failed to discover active addresses"))
    }

    /// Height of the main chain tip.
    pub fn best_block(&self) -> i32 {
        self.engine.main_chain_tip().1
    }

    /// Hash of the main chain tip in display order.
    pub fn best_block_hash(&self) -> String {
        reverse_hash_hex(&self.engine.main_chain_tip().0)
    }
}
