use crate::utils::reverse_hash_hex;
use crate::wallet::WalletError;
use crate::wallet::engine::{InputSummary, OutputSummary, TransactionBlock, TransactionSummary, WalletEngine};
use crate::wallet::types::{Credit, Debit, Direction, TransactionRecord};

use std::sync::Arc;
use tracing::{debug, error};

/// Account name reported when the engine cannot resolve an account number.
pub const UNKNOWN_ACCOUNT_NAME: &str = "Account not found";

/// Height reported for transactions not yet mined.
pub const UNMINED_HEIGHT: i32 = -1;

/// Direction and net amount of a transaction from the wallet's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
	pub direction: Direction,
	pub amount: i64,
}

/// Classify a transaction from the wallet's credits, debits and the transaction fee.
///
/// The self-transfer check runs first and needs the outflow to equal the fee exactly, so that a
/// wallet-internal move is never reported as income. Anything with a positive net inflow is
/// `Received` (amount is the credit sum, regardless of fee). Everything else is `Sent`, with the
/// fee excluded from the amount.
pub fn classify(credits: &[Credit], debits: &[Debit], fee: i64) -> Classification {
	let output_sum: i64 = credits.iter().map(|credit| credit.amount).sum();
	let input_sum: i64 = debits.iter().map(|debit| debit.previous_amount).sum();
	let difference = output_sum - input_sum;

	if difference < 0 && difference.checked_neg() == Some(fee) {
		Classification {
			direction: Direction::Transferred,
			amount: fee,
		}
	} else if difference > 0 {
		Classification {
			direction: Direction::Received,
			amount: output_sum,
		}
	} else {
		Classification {
			direction: Direction::Sent,
			amount: input_sum - output_sum - fee,
		}
	}
}

pub fn credit_from_output(output: &OutputSummary) -> Credit {
	Credit {
		index: output.index as i32,
		account: output.account as i32,
		internal: output.internal,
		amount: output.amount,
		address: output.address.clone(),
	}
}

pub fn debit_from_input(input: &InputSummary, account_name: String) -> Debit {
	Debit {
		index: input.index as i32,
		previous_account: input.previous_account as i32,
		previous_amount: input.previous_amount,
		account_name,
	}
}

/// Builds client-facing transaction records from engine summaries
#[derive(Clone)]
pub struct TransactionProcessor {
	engine: Arc<dyn WalletEngine>,
}

impl TransactionProcessor {
	pub fn new(engine: Arc<dyn WalletEngine>) -> Self {
		Self { engine }
	}

	/// Resolve an account name, falling back to `UNKNOWN_ACCOUNT_NAME`.
	pub async fn account_name(&self, account: u32) -> String {
		match self.engine.account_name(account).await {
			Ok(name) => name,
			Err(e) => {
				error!("Failed to resolve name of account {}: {}", account, e);
				UNKNOWN_ACCOUNT_NAME.to_string()
			}
		}
	}

	/// Build the record for one transaction at `height` (`UNMINED_HEIGHT` when unmined).
	pub async fn record(&self, summary: &TransactionSummary, height: i32) -> TransactionRecord {
		let credits: Vec<Credit> = summary.my_outputs.iter().map(credit_from_output).collect();

		let mut debits = Vec::with_capacity(summary.my_inputs.len());
		for input in &summary.my_inputs {
			let account_name = self.account_name(input.previous_account).await;
			debits.push(debit_from_input(input, account_name));
		}

		let classification = classify(&credits, &debits, summary.fee);

		TransactionRecord {
			fee: summary.fee,
			hash: reverse_hash_hex(&summary.hash),
			timestamp: summary.timestamp,
			tx_type: summary.tx_type,
			credits,
			debits,
			amount: classification.amount,
			height,
			direction: classification.direction,
		}
	}

	/// Build and serialize the record for one transaction.
	pub async fn serialize_record(
		&self,
		summary: &TransactionSummary,
		height: i32,
	) -> Result<String, WalletError> {
		let record = self.record(summary, height).await;
		debug!(
			"Serializing transaction {} ({:?}, amount {})",
			record.hash, record.direction, record.amount
		);
		Ok(serde_json::to_string(&record)?)
	}

	/// Build records for every transaction in `blocks`, preserving block and in-block order.
	pub async fn process_blocks_batch(&self, blocks: &[TransactionBlock]) -> Vec<TransactionRecord> {
		let mut records = Vec::new();

		for block in blocks {
			let height = block.height.unwrap_or(UNMINED_HEIGHT);
			for summary in &block.transactions {
				records.push(self.record(summary, height).await);
			}
		}

		records
	}
}
