//! Common types module for the dust claimer.
//!
//! This module defines the data model shared by every claimer crate: chains and
//! addresses, pending rewards and claim bundles, execution results, the claim
//! error taxonomy and the recipient safety rules. Keeping them in one crate
//! guarantees that discovery, execution and the ledger agree on one shape.

/// Supported chains and chain-tagged addresses.
pub mod chain;
/// Claim error taxonomy shared by the pipeline and its collaborators.
pub mod error;
/// Ledger records written after each execution attempt.
pub mod ledger;
/// Registry trait for pluggable implementations.
pub mod registry;
/// Pending rewards and claim bundles.
pub mod reward;
/// Recipient safety rules applied before any funds move.
pub mod safety;
/// Secret string wrapper for private keys.
pub mod secret_string;
/// Transaction-level types: receipts, logs, execution results.
pub mod transaction;
/// Utility functions for formatting and time.
pub mod utils;

pub use chain::{Address, AddressError, Chain, ChainParseError};
pub use error::{ClaimError, ClaimErrorKind, Retryable};
pub use ledger::{ExecutionRecord, LedgerKey};
pub use registry::ImplementationRegistry;
pub use reward::{BundleKey, ClaimBundle, PendingReward};
pub use safety::{
	check_recipient, is_known_test_address, is_placeholder, RecipientAllowList, RecipientViolation,
};
pub use secret_string::SecretString;
pub use transaction::{ReceiptLog, SendReceipt, SimulationResult, TxResult, VerifiedTransfer};
pub use utils::{current_timestamp, truncate_id, with_0x_prefix, without_0x_prefix};
