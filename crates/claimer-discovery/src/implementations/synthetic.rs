//! Synthetic integration for mock runs.
//!
//! Derives a fixed set of wallets and reports the same rewards for them on
//! every scan. Every reward is flagged `is_synthetic`, so the engine drops
//! them outside mock mode.

use crate::abi::encode_claim;
use crate::{
	DiscoveryError, Integration, IntegrationContext, IntegrationFactory, IntegrationRegistry,
};
use alloy_primitives::{keccak256, U256};
use async_trait::async_trait;
use claimer_types::{
	current_timestamp, Address, Chain, ClaimBundle, ImplementationRegistry, PendingReward,
};
use std::str::FromStr;

const PROTOCOL: &str = "synthetic";
const DEFAULT_TOKEN: &str = "0x00000000000000000000000000000000005e1f00";
const DEFAULT_DISTRIBUTOR: &str = "0x00000000000000000000000000000000000d1570";

/// Integration producing deterministic fake rewards.
pub struct SyntheticIntegration {
	chain: Chain,
	wallets: Vec<Address>,
	amounts_usd: Vec<f64>,
	token: Address,
	distributor: Address,
	claim_to: Address,
	context: IntegrationContext,
}

impl SyntheticIntegration {
	pub fn new(
		chain: Chain,
		wallet_count: usize,
		amounts_usd: Vec<f64>,
		token: Address,
		distributor: Address,
		context: IntegrationContext,
	) -> Result<Self, DiscoveryError> {
		let claim_to = context.recipients.recipient(chain).cloned().ok_or_else(|| {
			DiscoveryError::ValidationError(format!("No claim recipient for chain {}", chain))
		})?;

		Ok(Self {
			chain,
			wallets: (0..wallet_count).map(|i| derive_wallet(chain, i)).collect(),
			amounts_usd,
			token,
			distributor,
			claim_to,
			context,
		})
	}
}

/// Wallet `index` of the synthetic set, stable across runs.
fn derive_wallet(chain: Chain, index: usize) -> Address {
	let hash = keccak256(format!("{}:{}:{}", PROTOCOL, chain, index).as_bytes());
	Address::from_evm(alloy_primitives::Address::from_slice(&hash[12..]), chain)
}

/// Raw amount of an 18-decimal token worth `usd` at one dollar per token.
fn usd_to_wei(usd: f64) -> U256 {
	U256::from((usd.max(0.0) * 1e18) as u128)
}

#[async_trait]
impl Integration for SyntheticIntegration {
	fn protocol(&self) -> &str {
		PROTOCOL
	}

	async fn discover_wallets(&self) -> Result<Vec<Address>, DiscoveryError> {
		Ok(self.wallets.clone())
	}

	async fn get_pending_rewards(
		&self,
		wallets: &[Address],
	) -> Result<Vec<PendingReward>, DiscoveryError> {
		let now = current_timestamp();
		let rewards = wallets
			.iter()
			.filter(|wallet| self.wallets.contains(wallet))
			.flat_map(|wallet| {
				self.amounts_usd
					.iter()
					.enumerate()
					.map(move |(index, usd)| (wallet, index, *usd))
			})
			.map(|(wallet, index, usd)| PendingReward {
				id: format!("{}:{}:{}", PROTOCOL, wallet.value(), index),
				wallet: wallet.clone(),
				protocol: PROTOCOL.to_string(),
				token: self.token.clone(),
				amount_wei: usd_to_wei(usd),
				amount_usd: usd,
				claim_to: self.claim_to.clone(),
				discovered_at: now,
				last_claim_at: None,
				est_gas_limit: None,
				is_synthetic: true,
			})
			.collect();
		Ok(rewards)
	}

	async fn build_bundle(&self, bundle: ClaimBundle) -> Result<ClaimBundle, DiscoveryError> {
		self.context.check_recipient(&bundle.claim_to)?;
		let call_data = encode_claim(&bundle)?;
		Ok(bundle.with_transaction(self.distributor.clone(), call_data, U256::ZERO))
	}
}

/// Registry for the synthetic integration.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = PROTOCOL;
	type Factory = IntegrationFactory;

	fn factory() -> Self::Factory {
		create_integration
	}
}

impl IntegrationRegistry for Registry {}

/// Factory function to create the synthetic integration from configuration.
///
/// All values are optional: `chain` (base), `wallet_count` (1),
/// `amounts_usd` ([0.6, 0.7, 0.8]), `token` and `distributor`.
pub fn create_integration(
	config: &toml::Value,
	context: &IntegrationContext,
) -> Result<Box<dyn Integration>, DiscoveryError> {
	let chain = match config.get("chain").and_then(|v| v.as_str()) {
		Some(name) => {
			Chain::from_str(name).map_err(|e| DiscoveryError::ValidationError(e.to_string()))?
		},
		None => Chain::Base,
	};

	let wallet_count = config
		.get("wallet_count")
		.and_then(|v| v.as_integer())
		.unwrap_or(1);
	if wallet_count < 0 {
		return Err(DiscoveryError::ValidationError(
			"wallet_count must not be negative".to_string(),
		));
	}

	let amounts_usd = match config.get("amounts_usd").and_then(|v| v.as_array()) {
		Some(values) => values
			.iter()
			.map(|v| {
				v.as_float()
					.or_else(|| v.as_integer().map(|i| i as f64))
					.ok_or_else(|| {
						DiscoveryError::ValidationError("amounts_usd must be numbers".to_string())
					})
			})
			.collect::<Result<Vec<_>, _>>()?,
		None => vec![0.6, 0.7, 0.8],
	};

	let address = |key: &str, default: &str| {
		Address::new(
			config.get(key).and_then(|v| v.as_str()).unwrap_or(default),
			chain,
		)
	};

	Ok(Box::new(SyntheticIntegration::new(
		chain,
		wallet_count as usize,
		amounts_usd,
		address("token", DEFAULT_TOKEN),
		address("distributor", DEFAULT_DISTRIBUTOR),
		context.clone(),
	)?))
}
