//! Recipient safety rules.
//!
//! Funds only ever move to the single allow-listed recipient configured for a
//! chain. The same check runs in the executor and in integrations that build
//! claim transactions, so a bundle cannot be encoded for an address the
//! executor would refuse.

use crate::chain::{Address, Chain};
use crate::utils::without_0x_prefix;
use std::collections::HashMap;
use thiserror::Error;

/// Well-known development, seed and burn addresses.
///
/// Includes the first default accounts of local EVM dev nodes and the
/// conventional burn sinks.
const KNOWN_TEST_ADDRESSES: &[&str] = &[
	"0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
	"0x70997970c51812dc3a010c7d01b50e0d17dc79c8",
	"0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc",
	"0x90f79bf6eb2c4f870365e785982e1f101e93b906",
	"0x1234567890123456789012345678901234567890",
	"0x000000000000000000000000000000000000dead",
	"0xdeaddeaddeaddeaddeaddeaddeaddeaddeaddead",
	"0xdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef",
];

/// Reasons a claim recipient is refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecipientViolation {
	#[error("Refusing placeholder recipient address {0} on {1}")]
	Placeholder(String, Chain),
	#[error("Refusing known test/seed recipient address {0} on {1}")]
	KnownTestAddress(String, Chain),
	#[error("No allow-listed claim recipient configured for chain {0}")]
	NoRecipientConfigured(Chain),
	#[error("Recipient {recipient} is not the allow-listed recipient {expected} on {chain}")]
	NotAllowListed {
		recipient: String,
		expected: String,
		chain: Chain,
	},
}

/// Returns true if the address is empty or its hex body is all zeros.
pub fn is_placeholder(address: &Address) -> bool {
	let body = without_0x_prefix(address.value());
	body.is_empty() || body.chars().all(|c| c == '0')
}

/// Returns true for dev-node accounts, burn sinks and single-digit patterns
/// such as `0x1111…1111`.
pub fn is_known_test_address(address: &Address) -> bool {
	let value = address.value();
	if KNOWN_TEST_ADDRESSES.contains(&value) {
		return true;
	}
	let body = without_0x_prefix(value);
	let mut chars = body.chars();
	match chars.next() {
		Some(first) => body.len() == 40 && chars.all(|c| c == first),
		None => false,
	}
}

/// Checks a recipient against the placeholder, seed and allow-list rules.
pub fn check_recipient(
	claim_to: &Address,
	allowed: Option<&Address>,
) -> Result<(), RecipientViolation> {
	if is_placeholder(claim_to) {
		return Err(RecipientViolation::Placeholder(
			claim_to.value().to_string(),
			claim_to.chain(),
		));
	}
	if is_known_test_address(claim_to) {
		return Err(RecipientViolation::KnownTestAddress(
			claim_to.value().to_string(),
			claim_to.chain(),
		));
	}
	let expected = allowed.ok_or(RecipientViolation::NoRecipientConfigured(claim_to.chain()))?;
	if expected != claim_to {
		return Err(RecipientViolation::NotAllowListed {
			recipient: claim_to.value().to_string(),
			expected: expected.value().to_string(),
			chain: claim_to.chain(),
		});
	}
	Ok(())
}

/// The configured claim recipient per chain.
#[derive(Debug, Clone, Default)]
pub struct RecipientAllowList {
	recipients: HashMap<Chain, Address>,
}

impl RecipientAllowList {
	pub fn new(recipients: HashMap<Chain, Address>) -> Self {
		Self { recipients }
	}

	/// Returns the allow-listed recipient for `chain`, if configured.
	pub fn recipient(&self, chain: Chain) -> Option<&Address> {
		self.recipients.get(&chain)
	}

	/// Checks `claim_to` against the recipient configured for its chain.
	pub fn check(&self, claim_to: &Address) -> Result<(), RecipientViolation> {
		check_recipient(claim_to, self.recipient(claim_to.chain()))
	}
}
