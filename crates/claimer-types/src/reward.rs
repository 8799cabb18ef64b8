//! Pending rewards and claim bundles.
//!
//! A `PendingReward` is one claimable position reported by a protocol
//! integration. A `ClaimBundle` is the atomic unit of execution: a batch of
//! rewards sharing one `(chain, protocol, claim_to)` key that becomes a
//! single claim transaction.

use crate::chain::{Address, Chain};
use crate::utils::u256_decimal;
use alloy_primitives::{Bytes, U256};
use serde::{Deserialize, Serialize};

/// A single claimable reward position.
///
/// Created by discovery integrations and read-only afterwards. A re-discovery
/// produces a new value rather than updating an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingReward {
	/// Protocol-assigned identifier, opaque to the claimer.
	pub id: String,
	/// Wallet holding the reward.
	pub wallet: Address,
	/// Protocol key, matching the integration name.
	pub protocol: String,
	/// Reward token contract.
	pub token: Address,
	/// Raw token amount.
	#[serde(with = "u256_decimal")]
	pub amount_wei: U256,
	/// USD value priced at discovery time.
	pub amount_usd: f64,
	/// Address that receives the claimed proceeds.
	pub claim_to: Address,
	/// Unix timestamp of discovery.
	pub discovered_at: u64,
	/// Unix timestamp of the previous claim for this position, if known.
	#[serde(default)]
	pub last_claim_at: Option<u64>,
	/// Integration-provided gas limit estimate for claiming this item.
	#[serde(default)]
	pub est_gas_limit: Option<u64>,
	/// Test or mock data; must never reach production execution.
	#[serde(default)]
	pub is_synthetic: bool,
}

impl PendingReward {
	/// Returns the grouping key of this reward.
	pub fn bundle_key(&self) -> BundleKey {
		BundleKey {
			chain: self.wallet.chain(),
			protocol: self.protocol.clone(),
			claim_to: self.claim_to.clone(),
		}
	}
}

/// Grouping key shared by every item of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleKey {
	pub chain: Chain,
	pub protocol: String,
	pub claim_to: Address,
}

/// A batch of rewards destined for one claim transaction.
///
/// Bundles are never mutated once built. Splitting, merging or re-pricing
/// always yields a new bundle with a fresh `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimBundle {
	pub id: String,
	pub chain: Chain,
	pub protocol: String,
	pub claim_to: Address,
	pub items: Vec<PendingReward>,
	/// Sum of the items' `amount_usd`.
	pub total_usd: f64,
	/// Estimated gas cost of the claim in USD.
	pub est_gas_usd: f64,
	/// `total_usd - est_gas_usd`.
	pub net_usd: f64,
	/// Pre-encoded transaction target.
	#[serde(default)]
	pub contract_address: Option<Address>,
	#[serde(default)]
	pub call_data: Option<Bytes>,
	#[serde(default)]
	pub value: Option<U256>,
}

impl ClaimBundle {
	/// Builds a bundle for `key` from `items`, pricing it with `est_gas_usd`.
	pub fn new(key: BundleKey, items: Vec<PendingReward>, est_gas_usd: f64) -> Self {
		debug_assert!(items.iter().all(|item| item.bundle_key() == key));
		let total_usd = items.iter().map(|item| item.amount_usd).sum::<f64>();
		Self {
			id: uuid::Uuid::new_v4().to_string(),
			chain: key.chain,
			protocol: key.protocol,
			claim_to: key.claim_to,
			items,
			total_usd,
			est_gas_usd,
			net_usd: total_usd - est_gas_usd,
			contract_address: None,
			call_data: None,
			value: None,
		}
	}

	/// Returns the grouping key of this bundle.
	pub fn key(&self) -> BundleKey {
		BundleKey {
			chain: self.chain,
			protocol: self.protocol.clone(),
			claim_to: self.claim_to.clone(),
		}
	}

	/// Attaches the encoded claim transaction, consuming the bundle.
	///
	/// The bundle content and id are unchanged; only the transaction target
	/// is filled in.
	pub fn with_transaction(mut self, contract: Address, call_data: Bytes, value: U256) -> Self {
		self.contract_address = Some(contract);
		self.call_data = Some(call_data);
		self.value = Some(value);
		self
	}

	/// Number of rewards in the bundle.
	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// Distinct wallets contributing to this bundle, in first-seen order.
	pub fn wallets(&self) -> Vec<&Address> {
		let mut wallets: Vec<&Address> = Vec::new();
		for item in &self.items {
			if !wallets.contains(&&item.wallet) {
				wallets.push(&item.wallet);
			}
		}
		wallets
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn reward(id: &str, usd: f64) -> PendingReward {
		PendingReward {
			id: id.to_string(),
			wallet: Address::new("0x00000000000000000000000000000000000000a1", Chain::Base),
			protocol: "aave".to_string(),
			token: Address::new("0x00000000000000000000000000000000000000b1", Chain::Base),
			amount_wei: U256::from(1_000u64),
			amount_usd: usd,
			claim_to: Address::new("0x00000000000000000000000000000000000000c1", Chain::Base),
			discovered_at: 0,
			last_claim_at: None,
			est_gas_limit: None,
			is_synthetic: false,
		}
	}

	#[test]
	fn test_bundle_totals() {
		let items = vec![reward("a", 0.6), reward("b", 0.7), reward("c", 0.8)];
		let key = items[0].bundle_key();
		let bundle = ClaimBundle::new(key, items, 0.3);
		assert!((bundle.total_usd - 2.1).abs() < 1e-9);
		assert!((bundle.net_usd - 1.8).abs() < 1e-9);
		assert_eq!(bundle.len(), 3);
		assert_eq!(bundle.wallets().len(), 1);
	}

	#[test]
	fn test_new_bundles_get_distinct_ids() {
		let items = vec![reward("a", 1.0)];
		let key = items[0].bundle_key();
		let first = ClaimBundle::new(key.clone(), items.clone(), 0.0);
		let second = ClaimBundle::new(key, items, 0.0);
		assert_ne!(first.id, second.id);
	}

	#[test]
	fn test_amount_wei_serializes_as_decimal_string() {
		let json = serde_json::to_value(reward("a", 1.0)).unwrap();
		assert_eq!(json["amount_wei"], "1000");
		let back: PendingReward = serde_json::from_value(json).unwrap();
		assert_eq!(back.amount_wei, U256::from(1_000u64));
	}
}
