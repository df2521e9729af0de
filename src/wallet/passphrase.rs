//! Scoped unlock/lock discipline for the wallet's private passphrase.
//!
//! Every path that reads a caller's passphrase buffer goes through `Scrub`, which zeroes the
//! buffer when it goes out of scope: on success, on error and while unwinding. Unlocking hands
//! the engine the receiving half of a single-shot relock channel; the wallet stays unlocked until
//! the sending half fires or is dropped, which is what `UnlockScope` owns.

use std::sync::Arc;

use tokio::sync::{Mutex, oneshot};
use tracing::{debug, error};
use zeroize::Zeroize;

use crate::wallet::WalletError;
use crate::wallet::engine::WalletEngine;

/// Zeroes the borrowed secret when dropped.
pub(crate) struct Scrub<'a>(pub(crate) &'a mut [u8]);

impl Drop for Scrub<'_> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// How a guarded unlock completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    Unlocked,
    /// The guard already held an unlock; nothing was done.
    AlreadyUnlocked,
}

/// Keeps the wallet unlocked until relocked or dropped.
#[must_use = "dropping the scope relocks the wallet immediately"]
pub struct UnlockScope {
    relock: Option<oneshot::Sender<()>>,
}

impl UnlockScope {
    /// Relock now. Dropping the scope has the same effect.
    pub fn relock(mut self) {
        self.fire();
    }

    fn fire(&mut self) {
        if let Some(relock) = self.relock.take() {
            // The engine may have relocked on its own already.
            let _ = relock.send(());
        }
    }
}

impl Drop for UnlockScope {
    fn drop(&mut self) {
        self.fire();
    }
}

/// Unlock the wallet for the lifetime of the returned scope.
///
/// `passphrase` is zeroed before this returns, whatever the outcome.
pub async fn unlock_scoped(
    engine: &dyn WalletEngine,
    passphrase: &mut [u8],
) -> Result<UnlockScope, WalletError> {
    let secret = Scrub(passphrase);
    let (relock, relock_rx) = oneshot::channel();

    engine.unlock(&*secret.0, relock_rx).await.map_err(|e| {
        error!("Failed to unlock wallet: {}", e);
        WalletError::from(e)
    })?;

    Ok(UnlockScope {
        relock: Some(relock),
    })
}

/// Long-lived unlock held on behalf of the client.
///
/// The guard is the only writer of the wallet's unlocked state that outlives a single call.
pub struct PassphraseGuard {
    engine: Arc<dyn WalletEngine>,
    held: Mutex<Option<UnlockScope>>,
}

impl PassphraseGuard {
    pub fn new(engine: Arc<dyn WalletEngine>) -> Self {
        Self {
            engine,
            held: Mutex::new(None),
        }
    }

    /// Unlock the wallet until `relock` is called.
    ///
    /// Returns `AlreadyUnlocked` without touching the engine when this guard already holds an
    /// unlock. Engine failures are propagated unchanged. The buffer is zeroed on every path.
    pub async fn unlock(&self, passphrase: &mut [u8]) -> Result<UnlockOutcome, WalletError> {
        let mut secret = Scrub(passphrase);
        let mut held = self.held.lock().await;

        if held.is_some() {
            debug!("Wallet is already unlocked");
            return Ok(UnlockOutcome::AlreadyUnlocked);
        }

        let scope = unlock_scoped(self.engine.as_ref(), &mut *secret.0).await?;
        *held = Some(scope);
        Ok(UnlockOutcome::Unlocked)
    }

    /// Relock the wallet. A no-op when this guard holds no unlock.
    ///
    /// Returns whether an unlock was released.
    pub async fn relock(&self) -> bool {
        match self.held.lock().await.take() {
            Some(scope) => {
                scope.relock();
                debug!("Wallet relocked");
                true
            }
            None => false,
        }
    }

    pub async fn is_held(&self) -> bool {
        self.held.lock().await.is_some()
    }
}
