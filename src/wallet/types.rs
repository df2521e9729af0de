use crate::backend::BackendError;
use crate::wallet::engine::EngineError;

use serde::{Serialize, Serializer};
use std::fmt;

/// Error taxonomy for wallet and sync operations
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	#[error("{0} has not been loaded")]
	NotLoaded(String),

	#[error("No network backend")]
	NoBackend,

	#[error("Connection error: {0}")]
	ConnectionError(String),

	#[error("Operation canceled")]
	Canceled,

	#[error("Deadline exceeded")]
	DeadlineExceeded,

	#[error("Engine error: {0}")]
	EngineError(#[from] EngineError),

	#[error("Serialization error: {0}")]
	SerializationError(#[from] serde_json::Error),

	#[error("Backend error: {0}")]
	BackendError(BackendError),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

impl WalletError {
	/// Cancellation outcomes are expected terminations, not failures.
	pub fn is_cancellation(&self) -> bool {
		matches!(self, WalletError::Canceled | WalletError::DeadlineExceeded)
	}
}

impl From<BackendError> for WalletError {
	fn from(err: BackendError) -> Self {
		match err {
			BackendError::Canceled => WalletError::Canceled,
			BackendError::DeadlineExceeded => WalletError::DeadlineExceeded,
			BackendError::Connection(msg) => WalletError::ConnectionError(msg),
			BackendError::InvalidPeerAddress(msg) => WalletError::InvalidArgument(msg),
			BackendError::Io(e) => WalletError::IoError(e),
			other => WalletError::BackendError(other),
		}
	}
}

/// Net effect of a transaction on the wallet balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	Sent = 0,
	Received = 1,
	/// Wallet-internal move; only the fee left the wallet.
	Transferred = 2,
}

impl Serialize for Direction {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_i32(*self as i32)
	}
}

/// Transaction type as reported by the wallet engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
	Coinbase,
	TicketPurchase,
	Vote,
	Revocation,
	#[default]
	Regular,
}

impl fmt::Display for TransactionType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			TransactionType::Coinbase => "COINBASE",
			TransactionType::TicketPurchase => "TICKET_PURCHASE",
			TransactionType::Vote => "VOTE",
			TransactionType::Revocation => "REVOCATION",
			TransactionType::Regular => "REGULAR",
		};
		f.write_str(name)
	}
}

/// A wallet-owned output of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credit {
	pub index: i32,
	pub account: i32,
	pub internal: bool,
	pub amount: i64,
	pub address: String,
}

/// A previously wallet-owned output spent by a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Debit {
	pub index: i32,
	pub previous_account: i32,
	pub previous_amount: i64,
	pub account_name: String,
}

/// Client-facing view of a wallet-relevant transaction.
///
/// Built fresh for each notification or query; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
	pub fee: i64,
	/// Transaction hash in display (byte-reversed) order
	pub hash: String,
	pub timestamp: i64,
	#[serde(rename = "type")]
	pub tx_type: TransactionType,
	pub credits: Vec<Credit>,
	pub debits: Vec<Debit>,
	pub amount: i64,
	/// Block height, or -1 while unconfirmed
	pub height: i32,
	pub direction: Direction,
}

/// Balance breakdown of one account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
	pub total: i64,
	pub spendable: i64,
	pub immature_reward: i64,
	pub immature_stake_generation: i64,
	pub locked_by_tickets: i64,
	pub voting_authority: i64,
	pub unconfirmed: i64,
}

/// Serialized account entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
	pub number: i32,
	pub name: String,
	pub total_balance: i64,
	pub balance: Balance,
	pub external_key_count: i32,
	pub internal_key_count: i32,
	pub imported_key_count: i32,
}

/// Response for account listings
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsResponse {
	pub count: usize,
	/// Current tip hash in display order
	pub current_block_hash: String,
	pub current_block_height: i32,
	pub acc: Vec<Account>,
	pub error_occurred: bool,
}

/// Response for transaction history queries
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsResponse {
	pub error_occurred: bool,
	pub transactions: Vec<TransactionRecord>,
}

/// Result of constructing an unsigned transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructTxResponse {
	pub total_output_amount: i64,
	/// Hex-encoded serialized unsigned transaction
	pub unsigned_transaction: String,
	pub total_previous_output_amount: i64,
	pub estimated_signed_size: i32,
}
