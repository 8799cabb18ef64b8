//! Ledger types for the claimer.

use crate::reward::ClaimBundle;
use crate::transaction::TxResult;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Ledger namespaces.
///
/// Replaces string literals in storage calls with typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerKey {
	/// Execution records keyed by bundle id.
	Executions,
	/// Bundles that passed admission, keyed by bundle id.
	Bundles,
}

impl LedgerKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			LedgerKey::Executions => "executions",
			LedgerKey::Bundles => "bundles",
		}
	}

	/// Returns an iterator over all namespaces.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Executions, Self::Bundles].into_iter()
	}
}

impl FromStr for LedgerKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"executions" => Ok(Self::Executions),
			"bundles" => Ok(Self::Bundles),
			_ => Err(()),
		}
	}
}

/// A persisted execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
	pub bundle: ClaimBundle,
	pub result: TxResult,
	/// Unix timestamp of when the record was written.
	pub recorded_at: u64,
}
