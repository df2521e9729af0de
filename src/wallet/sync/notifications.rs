//! Forwarding of engine transaction notifications to a client `TransactionListener`.

use crate::lifecycle::ShutdownListener;
use crate::utils::reverse_hash_hex;
use crate::wallet::engine::{TransactionNotifications, WalletEngine};
use crate::wallet::sync::events::TransactionListener;
use crate::wallet::sync::transaction_processor::{TransactionProcessor, UNMINED_HEIGHT};

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Bridges the engine's notification stream to a `TransactionListener`.
///
/// For every batch, unmined transactions are delivered first as serialized records, then each
/// attached block is announced once, followed by one confirmation per transaction in block order.
pub struct NotificationBridge {
    processor: TransactionProcessor,
    listener: Arc<dyn TransactionListener>,
}

impl NotificationBridge {
    pub fn new(engine: Arc<dyn WalletEngine>, listener: Arc<dyn TransactionListener>) -> Self {
        Self {
            processor: TransactionProcessor::new(engine),
            listener,
        }
    }

    /// Subscribe once and forward notifications until shutdown or until the stream closes.
    pub fn spawn(
        engine: Arc<dyn WalletEngine>,
        listener: Arc<dyn TransactionListener>,
        shutdown: ShutdownListener,
    ) -> JoinHandle<()> {
        let mut notifications = engine.transaction_notifications();
        let bridge = Self::new(engine, listener);

        tokio::spawn(async move {
            info!("Forwarding transaction notifications");
            loop {
                let batch = tokio::select! {
                    biased;
                    _ = shutdown.canceled() => {
                        debug!("Transaction notifications stopped by shutdown");
                        break;
                    }
                    batch = notifications.recv() => batch,
                };
                let Some(batch) = batch else {
                    debug!("Transaction notification stream closed");
                    break;
                };
                bridge.deliver(&batch).await;
            }
        })
    }

    /// Deliver one notification batch to the listener.
    pub async fn deliver(&self, batch: &TransactionNotifications) {
        for summary in &batch.unmined_transactions {
            match self.processor.serialize_record(summary, UNMINED_HEIGHT).await {
                Ok(record) => self.listener.on_transaction(record),
                Err(e) => error!(
                    "Failed to serialize unmined transaction {}: {}",
                    reverse_hash_hex(&summary.hash),
                    e
                ),
            }
        }

        for block in &batch.attached_blocks {
            self.listener.on_block_attached(block.height);
            for summary in &block.transactions {
                self.listener
                    .on_transaction_confirmed(reverse_hash_hex(&summary.hash), block.height);
            }
        }
    }
}
