//! Transaction-level types for the claimer.
//!
//! These describe what a chain client hands back (receipts and raw logs),
//! what the simulator predicts, and the structured result the executor
//! records for every bundle.

use crate::chain::{Address, Chain};
use crate::error::{ClaimError, ClaimErrorKind};
use crate::reward::ClaimBundle;
use crate::utils::u256_decimal;
use alloy_primitives::{Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// A raw event log from a transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLog {
	/// Contract that emitted the log.
	pub address: alloy_primitives::Address,
	pub topics: Vec<B256>,
	pub data: Bytes,
	/// Position of the log within the block.
	pub log_index: u64,
}

/// Outcome of a dry-run as reported by a chain client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
	pub success: bool,
	/// Revert reason or client error, when the simulation failed.
	pub revert_reason: Option<String>,
	pub gas_estimate: Option<u64>,
}

/// Receipt of a transaction sent by a chain client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendReceipt {
	pub tx_hash: String,
	/// Whether the transaction executed without reverting.
	pub success: bool,
	pub gas_used: u64,
	/// Gas cost converted to USD at send time.
	pub gas_usd: f64,
	pub logs: Vec<ReceiptLog>,
}

/// A decoded ERC-20 transfer found in receipt logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedTransfer {
	pub token_address: Address,
	pub from: Address,
	pub to: Address,
	#[serde(with = "u256_decimal")]
	pub amount_wei: U256,
	pub tx_hash: String,
	pub log_index: u64,
}

/// Outcome of executing one claim bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxResult {
	pub bundle_id: String,
	pub success: bool,
	pub tx_hash: Option<String>,
	pub error: Option<String>,
	pub error_kind: Option<ClaimErrorKind>,
	pub gas_used: u64,
	pub gas_usd: f64,
	/// Amount the claimer believes was realized, in USD.
	pub claimed_usd: f64,
	pub chain: Chain,
	/// True only when receipt logs independently confirmed the payout.
	pub verified_payout: bool,
}

impl TxResult {
	/// Builds a failed result for `bundle` that never reached the chain or was
	/// rejected by it.
	pub fn failed(bundle: &ClaimBundle, error: &ClaimError) -> Self {
		Self {
			bundle_id: bundle.id.clone(),
			success: false,
			tx_hash: None,
			error: Some(error.to_string()),
			error_kind: Some(error.kind()),
			gas_used: 0,
			gas_usd: 0.0,
			claimed_usd: 0.0,
			chain: bundle.chain,
			verified_payout: false,
		}
	}

	/// Returns true if the failure came from the chain itself rather than from
	/// a local gate.
	pub fn is_chain_failure(&self) -> bool {
		!self.success
			&& matches!(
				self.error_kind,
				Some(ClaimErrorKind::ExecutionFailed) | Some(ClaimErrorKind::SimulationFailed)
			)
	}
}
