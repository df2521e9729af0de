//! Cancellable, progress-streamed rescans.
//!
//! A rescan moves `Idle -> Running -> {Completed, Canceled, Errored}`. Arguments and the backend
//! are checked before anything is spawned. The engine then streams progress ticks over a bounded
//! channel into a consumer task that forwards them to the client's `RescanListener`. The scan
//! itself runs under a lifetime derived from the shutdown signal, so it is canceled both by
//! shutdown and by the consumer asking to stop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::backend::{ActiveBackend, NetworkBackend};
use crate::lifecycle::ShutdownListener;
use crate::wallet::WalletError;
use crate::wallet::engine::WalletEngine;
use crate::wallet::sync::events::RescanListener;
use crate::wallet::sync::progress_tracker::RescanProgressTracker;

/// Error code reported through `RescanListener::on_error` for engine failures.
pub const RESCAN_ERROR_CODE: i32 = -1;

/// Terminal state of a rescan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescanOutcome {
    /// The scan finished, or the consumer stopped consuming early.
    Completed {
        total_scanned: i32,
        stopped_by_consumer: bool,
    },
    /// The shutdown signal fired before the scan finished.
    Canceled { total_scanned: i32 },
    /// A tick carried an error; reporting stopped there.
    Errored { message: String },
}

/// Starts rescans against the installed backend
pub struct RescanCoordinator {
    engine: Arc<dyn WalletEngine>,
    shutdown: ShutdownListener,
    channel_capacity: usize,
}

impl RescanCoordinator {
    pub fn new(
        engine: Arc<dyn WalletEngine>,
        shutdown: ShutdownListener,
        channel_capacity: usize,
    ) -> Self {
        Self {
            engine,
            shutdown,
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Start a rescan from `start_height` using `backend`.
    ///
    /// # Errors
    /// `InvalidArgument` for a negative height and `NoBackend` when no backend is installed. In
    /// both cases nothing is spawned and `listener` is never called.
    pub fn start_from_height(
        &self,
        start_height: i32,
        backend: ActiveBackend,
        listener: Arc<dyn RescanListener>,
    ) -> Result<JoinHandle<RescanOutcome>, WalletError> {
        if start_height < 0 {
            return Err(WalletError::InvalidArgument(
                "Begin height must be non-negative".to_string(),
            ));
        }
        let backend = backend.backend().ok_or(WalletError::NoBackend)?;

        info!("Starting rescan from height {}", start_height);
        let session = RescanSession {
            engine: self.engine.clone(),
            shutdown: self.shutdown.clone(),
            backend,
            start_height,
            listener,
            channel_capacity: self.channel_capacity,
        };
        Ok(tokio::spawn(session.run()))
    }
}

struct RescanSession {
    engine: Arc<dyn WalletEngine>,
    shutdown: ShutdownListener,
    backend: Arc<dyn NetworkBackend>,
    start_height: i32,
    listener: Arc<dyn RescanListener>,
    channel_capacity: usize,
}

impl RescanSession {
    async fn run(self) -> RescanOutcome {
        let (scan_shutdown, stop_scan) = self.shutdown.child();
        let (progress_tx, mut progress_rx) = mpsc::channel(self.channel_capacity);

        let engine = self.engine.clone();
        let backend = self.backend.clone();
        let start_height = self.start_height;
        let scan = tokio::spawn(async move {
            engine
                .rescan_progress_from_height(scan_shutdown, backend, start_height, progress_tx)
                .await;
        });

        let mut tracker = RescanProgressTracker::new(self.start_height);
        let mut stopped_by_consumer = false;
        let mut failure = None;

        loop {
            let progress = tokio::select! {
                biased;
                progress = progress_rx.recv() => progress,
                _ = self.shutdown.canceled() => None,
            };
            let Some(progress) = progress else {
                break;
            };

            if let Some(err) = progress.error {
                error!("Rescan failed: {}", err);
                self.listener
                    .on_error(RESCAN_ERROR_CODE, err.message().to_string());
                failure = Some(err.message().to_string());
                break;
            }

            tracker.record_tick(progress.scanned_through);
            tracker.log_progress(false);

            if !self.listener.on_scan(progress.scanned_through) {
                info!(
                    "Rescan consumer stopped at height {}",
                    progress.scanned_through
                );
                stopped_by_consumer = true;
                break;
            }
        }

        // The scan may still be producing; cancel it and wait for it to wind down.
        stop_scan.cancel();
        drop(progress_rx);
        if let Err(e) = scan.await {
            error!("Rescan task ended abnormally: {}", e);
        }

        if let Some(message) = failure {
            return RescanOutcome::Errored { message };
        }

        let canceled = self.shutdown.is_canceled();
        let total_scanned = tracker.total_scanned();
        tracker.log_progress(true);
        info!("{}", tracker.get_stats().summary());
        self.listener.on_end(total_scanned, canceled);

        if canceled {
            RescanOutcome::Canceled { total_scanned }
        } else {
            RescanOutcome::Completed {
                total_scanned,
                stopped_by_consumer,
            }
        }
    }
}
