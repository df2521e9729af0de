//! Process-wide shutdown signal and derived cancellation lifetimes.
//!
//! A single `LifecycleController` is created at startup. Every long running operation (sync
//! sessions, rescans, the notification bridge) receives a `ShutdownListener` derived from it, so
//! raising the root signal cancels all of them. The signal is broadcast once through a watch
//! channel: the first trigger wins and later triggers are only logged.
//!
//! Derived lifetimes (`ShutdownListener::child`) fire when either their parent or their own
//! `CancelHandle` fires, which lets the sync manager tear down one session without touching the
//! rest of the process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Why a lifetime ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// Explicit shutdown request, interrupt, or teardown of the owning session.
    Canceled,
    /// A backend-specific timeout elapsed.
    DeadlineExceeded,
}

type Signal = watch::Receiver<Option<CancelCause>>;

/// Owner of the root cancellation signal.
pub struct LifecycleController {
    tx: watch::Sender<Option<CancelCause>>,
    triggered: AtomicBool,
}

impl LifecycleController {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx,
            triggered: AtomicBool::new(false),
        }
    }

    /// Raise the shutdown signal.
    ///
    /// Returns `true` for the trigger that actually raised it. Any later trigger is absorbed.
    pub fn request_shutdown(&self) -> bool {
        if self.triggered.swap(true, Ordering::SeqCst) {
            info!("Shutdown signaled. Already shutting down...");
            return false;
        }

        info!("Shutdown requested. Shutting down...");
        self.tx.send_replace(Some(CancelCause::Canceled));
        true
    }

    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// A listener observing the root signal only.
    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            signals: vec![self.tx.subscribe()],
        }
    }

    /// Route interrupt signals (Ctrl-C) into `request_shutdown`.
    ///
    /// The task keeps listening after the first interrupt so that repeated interrupts are
    /// absorbed and logged instead of killing the process mid-teardown.
    pub fn spawn_interrupt_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for interrupt signal: {}", e);
                    return;
                }
                info!("Received interrupt signal");
                controller.request_shutdown();
            }
        })
    }
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellable lifetime handed to background operations.
///
/// Cloning is cheap; every clone observes the same signals.
#[derive(Clone)]
pub struct ShutdownListener {
    // Never empty: the root signal is always first.
    signals: Vec<Signal>,
}

impl ShutdownListener {
    /// The first cause found among this lifetime's signals, if any fired.
    pub fn cause(&self) -> Option<CancelCause> {
        self.signals.iter().find_map(|rx| *rx.borrow())
    }

    pub fn is_canceled(&self) -> bool {
        self.cause().is_some()
    }

    /// Wait until any signal of this lifetime fires.
    pub async fn canceled(&self) -> CancelCause {
        if let Some(cause) = self.cause() {
            return cause;
        }

        let waits = self.signals.iter().cloned().map(|mut rx| {
            Box::pin(async move {
                let cause = match rx.wait_for(Option::is_some).await {
                    Ok(cause) => *cause,
                    Err(_) => None,
                };
                match cause {
                    Some(cause) => cause,
                    // Sender gone without firing: this signal can never fire.
                    None => std::future::pending().await,
                }
            })
        });

        futures::future::select_all(waits).await.0
    }

    /// Derive a lifetime that can additionally be canceled through the returned handle.
    pub fn child(&self) -> (ShutdownListener, CancelHandle) {
        let (tx, rx) = watch::channel(None);
        let mut signals = self.signals.clone();
        signals.push(rx);
        (
            ShutdownListener { signals },
            CancelHandle { tx: Arc::new(tx) },
        )
    }

    /// Derive a lifetime that also ends with `DeadlineExceeded` once `timeout` elapses.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn child_with_timeout(&self, timeout: Duration) -> (ShutdownListener, CancelHandle) {
        let (listener, handle) = self.child();
        let tx = handle.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    fire(&tx, CancelCause::DeadlineExceeded);
                }
                _ = tx.closed() => {}
            }
        });
        (listener, handle)
    }
}

/// Cancels the lifetime it was created with. Idempotent.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<Option<CancelCause>>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        fire(&self.tx, CancelCause::Canceled);
    }
}

fn fire(tx: &watch::Sender<Option<CancelCause>>, cause: CancelCause) {
    tx.send_if_modified(|current| {
        if current.is_none() {
            *current = Some(cause);
            true
        } else {
            false
        }
    });
}
