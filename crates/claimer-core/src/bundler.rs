//! Bundle construction.
//!
//! Rewards are partitioned by `(chain, protocol, claim_to)` into bundles,
//! which are then split or merged to fit the policy's size bounds. Every
//! reshaped bundle is a new value with a fresh id, priced again through the
//! [`GasEstimator`].

use claimer_config::GasConfig;
use claimer_types::{BundleKey, Chain, ClaimBundle, PendingReward};
use std::collections::HashMap;

/// Prices the claim transaction for a set of items sharing one key.
pub trait GasEstimator: Send + Sync {
	/// Estimated gas cost in USD.
	fn estimate_usd(&self, key: &BundleKey, items: &[PendingReward]) -> f64;
}

impl<F> GasEstimator for F
where
	F: Fn(&BundleKey, &[PendingReward]) -> f64 + Send + Sync,
{
	fn estimate_usd(&self, key: &BundleKey, items: &[PendingReward]) -> f64 {
		self(key, items)
	}
}

/// Gas price and native token price observed on one chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasQuote {
	pub gas_price_wei: u128,
	pub native_usd: f64,
}

impl GasQuote {
	pub fn gas_price_gwei(&self) -> f64 {
		self.gas_price_wei as f64 / 1e9
	}
}

/// Estimates gas from a linear gas limit model and per-chain quotes.
///
/// Chains without a quote are priced at infinity, so their bundles fail net
/// admission.
#[derive(Debug, Clone)]
pub struct ChainGasEstimator {
	base_gas: u64,
	per_item_gas: u64,
	quotes: HashMap<Chain, GasQuote>,
}

impl ChainGasEstimator {
	pub fn new(gas: &GasConfig, quotes: HashMap<Chain, GasQuote>) -> Self {
		Self {
			base_gas: gas.base_gas,
			per_item_gas: gas.per_item_gas,
			quotes,
		}
	}

	/// Gas limit for claiming `items` in one transaction.
	pub fn gas_limit(&self, items: &[PendingReward]) -> u64 {
		items.iter().fold(self.base_gas, |total, item| {
			total.saturating_add(item.est_gas_limit.unwrap_or(self.per_item_gas))
		})
	}

	pub fn quote(&self, chain: Chain) -> Option<&GasQuote> {
		self.quotes.get(&chain)
	}
}

impl GasEstimator for ChainGasEstimator {
	fn estimate_usd(&self, key: &BundleKey, items: &[PendingReward]) -> f64 {
		match self.quotes.get(&key.chain) {
			Some(quote) => {
				self.gas_limit(items) as f64 * quote.gas_price_wei as f64 / 1e18 * quote.native_usd
			},
			None => f64::INFINITY,
		}
	}
}

fn price(key: BundleKey, items: Vec<PendingReward>, estimator: &dyn GasEstimator) -> ClaimBundle {
	let est_gas_usd = estimator.estimate_usd(&key, &items);
	ClaimBundle::new(key, items, est_gas_usd)
}

/// Partitions `rewards` into one bundle per key.
///
/// Groups keep the order in which their key was first seen, and items keep
/// their input order.
pub fn group_by_key(rewards: Vec<PendingReward>, estimator: &dyn GasEstimator) -> Vec<ClaimBundle> {
	let mut order: Vec<BundleKey> = Vec::new();
	let mut groups: HashMap<BundleKey, Vec<PendingReward>> = HashMap::new();

	for reward in rewards {
		let key = reward.bundle_key();
		match groups.get_mut(&key) {
			Some(items) => items.push(reward),
			None => {
				order.push(key.clone());
				groups.insert(key, vec![reward]);
			},
		}
	}

	order
		.into_iter()
		.filter_map(|key| {
			let items = groups.remove(&key)?;
			Some(price(key, items, estimator))
		})
		.collect()
}

/// Slices every bundle larger than `max_size` into contiguous chunks.
///
/// Bundles at or below `max_size` pass through unchanged. A `max_size` of
/// zero leaves everything unchanged.
pub fn split_oversized(
	bundles: Vec<ClaimBundle>,
	max_size: usize,
	estimator: &dyn GasEstimator,
) -> Vec<ClaimBundle> {
	if max_size == 0 {
		return bundles;
	}

	let mut result = Vec::with_capacity(bundles.len());
	for bundle in bundles {
		if bundle.len() <= max_size {
			result.push(bundle);
			continue;
		}

		let key = bundle.key();
		tracing::debug!(
			bundle_id = %claimer_types::truncate_id(&bundle.id),
			items = bundle.len(),
			max_size,
			"Splitting oversized bundle"
		);
		let mut items = bundle.items;
		while !items.is_empty() {
			let rest = items.split_off(max_size.min(items.len()));
			result.push(price(key.clone(), items, estimator));
			items = rest;
		}
	}
	result
}

enum Slot {
	Kept(ClaimBundle),
	Group(BundleKey),
}

/// Concatenates same-key bundles smaller than `min_size`.
///
/// A merged group is kept only if it reaches `min_size`; otherwise its
/// constituents are returned as they were. Nothing is dropped. Merged bundles
/// take the position of their first constituent.
pub fn merge_undersized(
	bundles: Vec<ClaimBundle>,
	min_size: usize,
	estimator: &dyn GasEstimator,
) -> Vec<ClaimBundle> {
	let mut slots = Vec::with_capacity(bundles.len());
	let mut groups: HashMap<BundleKey, Vec<ClaimBundle>> = HashMap::new();

	for bundle in bundles {
		if bundle.len() >= min_size {
			slots.push(Slot::Kept(bundle));
			continue;
		}
		let key = bundle.key();
		let group = groups.entry(key.clone()).or_default();
		if group.is_empty() {
			slots.push(Slot::Group(key));
		}
		group.push(bundle);
	}

	let mut result = Vec::with_capacity(slots.len());
	for slot in slots {
		match slot {
			Slot::Kept(bundle) => result.push(bundle),
			Slot::Group(key) => {
				let Some(group) = groups.remove(&key) else {
					continue;
				};
				let combined: usize = group.iter().map(ClaimBundle::len).sum();
				if group.len() > 1 && combined >= min_size {
					let items = group.into_iter().flat_map(|b| b.items).collect();
					result.push(price(key, items, estimator));
				} else {
					result.extend(group);
				}
			},
		}
	}
	result
}
