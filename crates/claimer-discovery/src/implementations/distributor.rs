//! On-chain reward distributor integration.
//!
//! Reads each configured wallet's pending balances from an
//! `IRewardDistributor` contract with `eth_call` and claims them in one
//! `claimMany` call per bundle.

use crate::abi::{encode_claim, IRewardDistributor};
use crate::{
	DiscoveryError, Integration, IntegrationContext, IntegrationFactory, IntegrationRegistry,
};
use alloy_primitives::U256;
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use alloy_transport_http::Http;
use async_trait::async_trait;
use claimer_types::{
	current_timestamp, truncate_id, Address, Chain, ClaimBundle, ImplementationRegistry,
	PendingReward,
};
use std::str::FromStr;

const PROTOCOL: &str = "distributor";

/// Integration reading rewards from a single distributor contract.
pub struct DistributorIntegration {
	chain: Chain,
	distributor: Address,
	wallets: Vec<Address>,
	/// Absent in mock mode; no node is contacted then.
	provider: Option<RootProvider<Http<reqwest::Client>>>,
	gas_per_claim: Option<u64>,
	context: IntegrationContext,
}

impl DistributorIntegration {
	pub fn new(
		chain: Chain,
		distributor: Address,
		wallets: Vec<Address>,
		rpc_url: Option<&str>,
		gas_per_claim: Option<u64>,
		context: IntegrationContext,
	) -> Result<Self, DiscoveryError> {
		let provider = match rpc_url {
			Some(url) if !context.mock_mode => Some(RootProvider::new_http(url.parse().map_err(
				|e| DiscoveryError::Connection(format!("Invalid RPC URL: {}", e)),
			)?)),
			_ => None,
		};

		Ok(Self {
			chain,
			distributor,
			wallets,
			provider,
			gas_per_claim,
			context,
		})
	}

	async fn pending_for(
		&self,
		provider: &RootProvider<Http<reqwest::Client>>,
		wallet: &Address,
		claim_to: &Address,
	) -> Result<Vec<PendingReward>, DiscoveryError> {
		let parse = |address: &Address| {
			address
				.to_evm()
				.map_err(|e| DiscoveryError::ValidationError(e.to_string()))
		};

		let call = IRewardDistributor::pendingRewardsCall {
			account: parse(wallet)?,
		};
		let request = TransactionRequest::default()
			.to(parse(&self.distributor)?)
			.input(call.abi_encode().into());
		let output = provider.call(&request).await.map_err(|e| {
			DiscoveryError::Connection(format!("pendingRewards call failed: {}", e))
		})?;
		let pending = IRewardDistributor::pendingRewardsCall::abi_decode_returns(&output, true)
			.map_err(|e| DiscoveryError::ParseError(format!("Invalid pendingRewards output: {}", e)))?;

		if pending.tokens.len() != pending.amounts.len() {
			return Err(DiscoveryError::ParseError(format!(
				"pendingRewards returned {} tokens and {} amounts",
				pending.tokens.len(),
				pending.amounts.len()
			)));
		}

		let mut rewards = Vec::new();
		for (token, amount) in pending.tokens.into_iter().zip(pending.amounts) {
			if amount == U256::ZERO {
				continue;
			}
			let token = Address::from_evm(token, self.chain);
			let amount_usd = self.price(&token, amount).await;
			rewards.push(PendingReward {
				id: format!("{}:{}:{}", self.chain, wallet.value(), token.value()),
				wallet: wallet.clone(),
				protocol: PROTOCOL.to_string(),
				token,
				amount_wei: amount,
				amount_usd,
				claim_to: claim_to.clone(),
				discovered_at: current_timestamp(),
				last_claim_at: None,
				est_gas_limit: self.gas_per_claim,
				is_synthetic: false,
			});
		}
		Ok(rewards)
	}

	/// Unpriced rewards are reported at zero so admission drops them.
	async fn price(&self, token: &Address, amount: U256) -> f64 {
		let Some(pricing) = &self.context.pricing else {
			return 0.0;
		};
		match pricing.quote_to_usd(self.chain, token, amount).await {
			Ok(usd) => usd,
			Err(e) => {
				tracing::warn!(chain = %self.chain, token = %token, error = %e, "Failed to price reward");
				0.0
			},
		}
	}
}

#[async_trait]
impl Integration for DistributorIntegration {
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
		let Some(provider) = &self.provider else {
			tracing::debug!(chain = %self.chain, "No provider for distributor, skipping scan");
			return Ok(Vec::new());
		};
		let claim_to = self.context.recipients.recipient(self.chain).ok_or_else(|| {
			DiscoveryError::ValidationError(format!("No claim recipient for chain {}", self.chain))
		})?;

		let mut rewards = Vec::new();
		for wallet in wallets.iter().filter(|w| w.chain() == self.chain) {
			match self.pending_for(provider, wallet, claim_to).await {
				Ok(found) => rewards.extend(found),
				Err(e) => tracing::warn!(
					chain = %self.chain,
					wallet = %wallet,
					error = %e,
					"Failed to read pending rewards"
				),
			}
		}
		Ok(rewards)
	}

	async fn build_bundle(&self, bundle: ClaimBundle) -> Result<ClaimBundle, DiscoveryError> {
		self.context.check_recipient(&bundle.claim_to)?;
		let call_data = encode_claim(&bundle)?;
		tracing::debug!(
			bundle_id = %truncate_id(&bundle.id),
			items = bundle.len(),
			"Encoded claimMany"
		);
		Ok(bundle.with_transaction(self.distributor.clone(), call_data, U256::ZERO))
	}
}

/// Registry for the distributor integration.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = PROTOCOL;
	type Factory = IntegrationFactory;

	fn factory() -> Self::Factory {
		create_integration
	}
}

impl IntegrationRegistry for Registry {}

/// Factory function to create a distributor integration from configuration.
///
/// Required values: `chain`, `distributor`, `wallets`. Optional: `rpc_url`
/// (defaults to the network's) and `gas_per_claim`.
pub fn create_integration(
	config: &toml::Value,
	context: &IntegrationContext,
) -> Result<Box<dyn Integration>, DiscoveryError> {
	let chain = config
		.get("chain")
		.and_then(|v| v.as_str())
		.ok_or_else(|| DiscoveryError::ValidationError("chain is required".to_string()))
		.and_then(|v| {
			Chain::from_str(v).map_err(|e| DiscoveryError::ValidationError(e.to_string()))
		})?;

	let distributor = config
		.get("distributor")
		.and_then(|v| v.as_str())
		.map(|v| Address::new(v, chain))
		.ok_or_else(|| DiscoveryError::ValidationError("distributor is required".to_string()))?;
	distributor
		.to_evm()
		.map_err(|e| DiscoveryError::ValidationError(format!("distributor: {}", e)))?;

	let wallets = config
		.get("wallets")
		.and_then(|v| v.as_array())
		.ok_or_else(|| DiscoveryError::ValidationError("wallets is required".to_string()))?
		.iter()
		.map(|v| {
			v.as_str()
				.map(|s| Address::new(s, chain))
				.ok_or_else(|| DiscoveryError::ValidationError("wallets must be strings".into()))
		})
		.collect::<Result<Vec<_>, _>>()?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.map(str::to_string)
		.or_else(|| context.networks.get(&chain).map(|n| n.rpc_url.clone()))
		.filter(|url| !url.is_empty());
	if rpc_url.is_none() && !context.mock_mode {
		return Err(DiscoveryError::ValidationError(format!(
			"No rpc_url for distributor on {}",
			chain
		)));
	}

	let gas_per_claim = config
		.get("gas_per_claim")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64);

	Ok(Box::new(DistributorIntegration::new(
		chain,
		distributor,
		wallets,
		rpc_url.as_deref(),
		gas_per_claim,
		context.clone(),
	)?))
}
