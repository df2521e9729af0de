/// Wallet engine collaborator contract
pub mod engine;
/// Scoped unlock handling for the private passphrase
pub mod passphrase;
/// Client-facing wallet facade
pub mod service;
pub mod sync;
pub mod types;

pub use passphrase::{PassphraseGuard, UnlockOutcome, UnlockScope};
pub use service::WalletService;
pub use types::*;
