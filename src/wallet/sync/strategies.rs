use crate::backend::{BackendError, NetworkBackend};
use crate::config::SyncConfig;
use crate::lifecycle::{CancelCause, ShutdownListener};
use crate::wallet::sync::events::{SyncEvent, SyncEventSender};

use backoff::ExponentialBackoff;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Terminal state of a backend run loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
	Canceled,
	DeadlineExceeded,
	Errored(String),
}

/// Trait for the ways a backend's run loop can be driven
#[async_trait::async_trait]
pub trait SyncStrategy: Send + Sync {
	/// Drive `backend` until the strategy gives up or `shutdown` fires
	async fn run(
		&mut self,
		backend: Arc<dyn NetworkBackend>,
		shutdown: ShutdownListener,
		events: SyncEventSender,
	) -> SessionOutcome;

	/// Get the name of this strategy
	fn name(&self) -> &'static str;
}

/// The cancellation error matching why `shutdown` fired, if it did.
fn cancellation_error(shutdown: &ShutdownListener) -> Option<BackendError> {
	shutdown.cause().map(|cause| match cause {
		CancelCause::Canceled => BackendError::Canceled,
		CancelCause::DeadlineExceeded => BackendError::DeadlineExceeded,
	})
}

/// Run `backend` once, classifying the result for the retry loop.
///
/// Cancellation (reported by the backend or observed on `shutdown`) is permanent. Any other
/// ending, including the loop returning without error while still wanted, is transient.
async fn run_once(
	backend: Arc<dyn NetworkBackend>,
	shutdown: ShutdownListener,
	events: SyncEventSender,
) -> Result<(), backoff::Error<BackendError>> {
	let result = backend.run(shutdown.clone(), events).await;

	if let Some(err) = cancellation_error(&shutdown) {
		return Err(backoff::Error::permanent(err));
	}

	match result {
		Err(err) if err.is_cancellation() => Err(backoff::Error::permanent(err)),
		Err(err) => Err(backoff::Error::transient(err)),
		Ok(()) => Err(backoff::Error::transient(BackendError::Other(
			"synchronization ended unexpectedly".to_string(),
		))),
	}
}

fn outcome_for(err: &BackendError) -> SessionOutcome {
	match err {
		BackendError::Canceled => SessionOutcome::Canceled,
		BackendError::DeadlineExceeded => SessionOutcome::DeadlineExceeded,
		other => SessionOutcome::Errored(other.to_string()),
	}
}

/// Trustless strategy: restart the run loop after every failure until canceled.
///
/// Each failure is reported as a sync error event before the restart. Restarts back off
/// exponentially between the configured bounds and never give up on their own.
pub struct RestartingSync {
	config: SyncConfig,
}

impl RestartingSync {
	pub fn new(config: SyncConfig) -> Self {
		Self { config }
	}

	fn backoff(&self) -> ExponentialBackoff {
		ExponentialBackoff {
			initial_interval: self.config.retry_initial_interval,
			max_interval: self.config.retry_max_interval,
			max_elapsed_time: None,
			..ExponentialBackoff::default()
		}
	}
}

#[async_trait::async_trait]
impl SyncStrategy for RestartingSync {
	async fn run(
		&mut self,
		backend: Arc<dyn NetworkBackend>,
		shutdown: ShutdownListener,
		events: SyncEventSender,
	) -> SessionOutcome {
		let notify_events = events.clone();
		let notify = move |err: BackendError, delay: Duration| {
			warn!(
				"SPV synchronization ended: {}; restarting in {:?}",
				err, delay
			);
			notify_events.emit(SyncEvent::from_backend_error(&err));
		};

		let operation = || run_once(backend.clone(), shutdown.clone(), events.clone());
		let retry = backoff::future::retry_notify(self.backoff(), operation, notify);

		// A pending backoff sleep must not hold up shutdown.
		let err = tokio::select! {
			result = retry => match result {
				Ok(()) => BackendError::Other("synchronization ended unexpectedly".to_string()),
				Err(err) => err,
			},
			_ = shutdown.canceled() => {
				cancellation_error(&shutdown).unwrap_or(BackendError::Canceled)
			}
		};

		info!("Syncer run loop is done: {}", err);
		events.emit(SyncEvent::from_backend_error(&err));
		outcome_for(&err)
	}

	fn name(&self) -> &'static str {
		"RestartingSync"
	}
}

/// Trusted strategy: run the loop once.
///
/// Cancellation ends it silently. Any other ending is reported as a sync error event and left
/// for the owner to handle (the sync manager detaches the backend so the client can re-arm).
pub struct SingleRunSync;

#[async_trait::async_trait]
impl SyncStrategy for SingleRunSync {
	async fn run(
		&mut self,
		backend: Arc<dyn NetworkBackend>,
		shutdown: ShutdownListener,
		events: SyncEventSender,
	) -> SessionOutcome {
		let result = backend.run(shutdown.clone(), events.clone()).await;

		let err = match cancellation_error(&shutdown) {
			Some(err) => err,
			None => match result {
				Err(err) => err,
				Ok(()) => BackendError::Other("RPC syncer returned".to_string()),
			},
		};

		if err.is_cancellation() {
			info!("RPC syncer stopped: {}", err);
		} else {
			warn!("RPC syncer failed: {}", err);
			events.emit(SyncEvent::from_backend_error(&err));
		}
		outcome_for(&err)
	}

	fn name(&self) -> &'static str {
		"SingleRunSync"
	}
}
