//! Suppresses re-submission of identical bundles.
//!
//! Bundles are identified by content, not by id: two bundles regenerated from
//! the same rewards share one record. State is in memory and lost on restart.

use alloy_primitives::{Keccak256, B256};
use claimer_types::ClaimBundle;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Feeds one length-prefixed field into the hasher.
fn absorb(hasher: &mut Keccak256, field: &[u8]) {
	hasher.update((field.len() as u64).to_be_bytes());
	hasher.update(field);
}

/// Content hash of `bundle`, independent of item order.
///
/// Covers chain, protocol, recipient and every item's id, wallet, token and
/// amount, with items ordered by id.
pub fn bundle_hash(bundle: &ClaimBundle) -> B256 {
	let mut items: Vec<_> = bundle.items.iter().collect();
	items.sort_by(|a, b| a.id.cmp(&b.id));

	let mut hasher = Keccak256::new();
	hasher.update(bundle.chain.chain_id().to_be_bytes());
	absorb(&mut hasher, bundle.protocol.as_bytes());
	absorb(&mut hasher, bundle.claim_to.value().as_bytes());
	hasher.update((items.len() as u64).to_be_bytes());
	for item in items {
		absorb(&mut hasher, item.id.as_bytes());
		absorb(&mut hasher, item.wallet.value().as_bytes());
		absorb(&mut hasher, item.token.value().as_bytes());
		hasher.update(item.amount_wei.to_be_bytes::<32>());
	}
	hasher.finalize()
}

/// TTL-bounded record of recently submitted bundle hashes.
pub struct IdempotencyGuard {
	ttl: Duration,
	seen: Mutex<HashMap<B256, Instant>>,
}

impl IdempotencyGuard {
	pub fn new(ttl: Duration) -> Self {
		Self {
			ttl,
			seen: Mutex::new(HashMap::new()),
		}
	}

	/// Returns true if an identical bundle was recorded within the TTL.
	///
	/// A skip leaves the existing record untouched; otherwise the bundle is
	/// recorded now. Expired records are swept on every call.
	pub async fn should_skip(&self, bundle: &ClaimBundle) -> bool {
		let hash = bundle_hash(bundle);
		let now = Instant::now();
		let mut seen = self.seen.lock().await;

		seen.retain(|_, recorded| now.duration_since(*recorded) < self.ttl);
		if seen.contains_key(&hash) {
			return true;
		}
		seen.insert(hash, now);
		false
	}

	/// Number of live records.
	pub async fn len(&self) -> usize {
		self.seen.lock().await.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::U256;
	use claimer_types::{Address, Chain, PendingReward};

	fn reward(id: &str, amount: u64) -> PendingReward {
		let chain = Chain::Base;
		PendingReward {
			id: id.into(),
			wallet: Address::new(format!("0x{:0>40}", id), chain),
			protocol: "p".into(),
			token: Address::new("0x00000000000000000000000000000000000000b1", chain),
			amount_wei: U256::from(amount),
			amount_usd: 1.0,
			claim_to: Address::new("0x8ba1f109551bd432803012645ac136ddd64dba72", chain),
			discovered_at: 0,
			last_claim_at: None,
			est_gas_limit: None,
			is_synthetic: false,
		}
	}

	fn bundle(items: Vec<PendingReward>) -> ClaimBundle {
		ClaimBundle::new(items[0].bundle_key(), items, 0.1)
	}

	#[test]
	fn test_hash_ignores_item_order_and_bundle_id() {
		let forward = bundle(vec![reward("1", 10), reward("2", 20), reward("3", 30)]);
		let reversed = bundle(vec![reward("3", 30), reward("1", 10), reward("2", 20)]);
		assert_ne!(forward.id, reversed.id);
		assert_eq!(bundle_hash(&forward), bundle_hash(&reversed));
	}

	#[test]
	fn test_hash_changes_with_amount() {
		let original = bundle(vec![reward("1", 10), reward("2", 20)]);
		let changed = bundle(vec![reward("1", 10), reward("2", 21)]);
		assert_ne!(bundle_hash(&original), bundle_hash(&changed));
	}

	#[test]
	fn test_hash_distinguishes_bundle_fields() {
		let original = bundle(vec![reward("1", 10)]);
		let base = bundle_hash(&original);

		let mut other_protocol = original.clone();
		other_protocol.protocol = "q".into();
		assert_ne!(bundle_hash(&other_protocol), base);

		let mut other_recipient = original.clone();
		other_recipient.claim_to =
			Address::new("0x00000000000000000000000000000000000000c1", Chain::Base);
		assert_ne!(bundle_hash(&other_recipient), base);

		let mut other_wallet = original.clone();
		other_wallet.items[0].wallet =
			Address::new("0x00000000000000000000000000000000000000a9", Chain::Base);
		assert_ne!(bundle_hash(&other_wallet), base);
	}

	#[tokio::test(start_paused = true)]
	async fn test_skip_within_ttl_only() {
		let guard = IdempotencyGuard::new(Duration::from_secs(600));
		let first = bundle(vec![reward("1", 10), reward("2", 20)]);
		let regenerated = bundle(vec![reward("2", 20), reward("1", 10)]);

		assert!(!guard.should_skip(&first).await);

		tokio::time::advance(Duration::from_secs(599)).await;
		assert!(guard.should_skip(&regenerated).await);

		// The skip did not refresh the record
		tokio::time::advance(Duration::from_secs(1)).await;
		assert!(!guard.should_skip(&regenerated).await);
	}

	#[tokio::test(start_paused = true)]
	async fn test_expired_records_are_swept() {
		let guard = IdempotencyGuard::new(Duration::from_secs(10));
		guard.should_skip(&bundle(vec![reward("1", 1)])).await;
		guard.should_skip(&bundle(vec![reward("2", 1)])).await;
		assert_eq!(guard.len().await, 2);

		tokio::time::advance(Duration::from_secs(10)).await;
		guard.should_skip(&bundle(vec![reward("3", 1)])).await;
		assert_eq!(guard.len().await, 1);
	}
}
