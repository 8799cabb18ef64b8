//! Reward discovery for the dust claimer.
//!
//! Every protocol is served by one [`Integration`]: it knows which wallets
//! to scan, reports their pending rewards and encodes the claim transaction
//! for a bundle. Mock mode is fixed when an integration is built.

use async_trait::async_trait;
use claimer_config::NetworkConfig;
use claimer_pricing::PricingService;
use claimer_types::{
	Address, Chain, ClaimBundle, ImplementationRegistry, PendingReward, RecipientAllowList,
	RecipientViolation,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

pub mod abi;

pub mod implementations {
	pub mod distributor;
	pub mod synthetic;
}

/// Errors that can occur during reward discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
	#[error("Connection error: {0}")]
	Connection(String),
	#[error("Parse error: {0}")]
	ParseError(String),
	#[error("Validation error: {0}")]
	ValidationError(String),
	#[error("Safety error: {0}")]
	Safety(#[from] RecipientViolation),
}

/// Interface for a protocol integration.
#[async_trait]
pub trait Integration: Send + Sync {
	/// Protocol key stamped on every reward this integration reports.
	fn protocol(&self) -> &str;

	/// Returns the wallets this integration scans.
	async fn discover_wallets(&self) -> Result<Vec<Address>, DiscoveryError>;

	/// Returns the pending rewards held by `wallets`.
	async fn get_pending_rewards(
		&self,
		wallets: &[Address],
	) -> Result<Vec<PendingReward>, DiscoveryError>;

	/// Attaches the encoded claim transaction to `bundle`.
	///
	/// Outside mock mode the bundle recipient must pass the same recipient
	/// rule the executor applies.
	async fn build_bundle(&self, bundle: ClaimBundle) -> Result<ClaimBundle, DiscoveryError>;
}

/// Shared inputs handed to integration factories.
#[derive(Clone)]
pub struct IntegrationContext {
	pub mock_mode: bool,
	pub recipients: RecipientAllowList,
	pub networks: BTreeMap<Chain, NetworkConfig>,
	/// Used to price discovered amounts.
	pub pricing: Option<Arc<PricingService>>,
}

impl IntegrationContext {
	/// Applies the recipient rule unless running in mock mode.
	pub fn check_recipient(&self, claim_to: &Address) -> Result<(), DiscoveryError> {
		if self.mock_mode {
			return Ok(());
		}
		self.recipients.check(claim_to)?;
		Ok(())
	}
}

/// Type alias for integration factory functions.
pub type IntegrationFactory =
	fn(&toml::Value, &IntegrationContext) -> Result<Box<dyn Integration>, DiscoveryError>;

/// Registry trait for integration implementations.
pub trait IntegrationRegistry: ImplementationRegistry<Factory = IntegrationFactory> {}

/// Get all registered integration implementations.
pub fn get_all_implementations() -> Vec<(&'static str, IntegrationFactory)> {
	use implementations::{distributor, synthetic};

	vec![
		(distributor::Registry::NAME, distributor::Registry::factory()),
		(synthetic::Registry::NAME, synthetic::Registry::factory()),
	]
}

/// The configured integrations keyed by protocol.
#[derive(Clone, Default)]
pub struct DiscoveryService {
	integrations: HashMap<String, Arc<dyn Integration>>,
}

impl DiscoveryService {
	pub fn new(integrations: Vec<Arc<dyn Integration>>) -> Self {
		Self {
			integrations: integrations
				.into_iter()
				.map(|integration| (integration.protocol().to_string(), integration))
				.collect(),
		}
	}

	/// Returns the integration serving `protocol`.
	pub fn get(&self, protocol: &str) -> Option<&Arc<dyn Integration>> {
		self.integrations.get(protocol)
	}

	/// Returns all integrations in protocol order.
	pub fn integrations(&self) -> Vec<&Arc<dyn Integration>> {
		let mut integrations: Vec<_> = self.integrations.values().collect();
		integrations.sort_by(|a, b| a.protocol().cmp(b.protocol()));
		integrations
	}

	/// Attaches a transaction to `bundle` through the integration of its protocol.
	pub async fn build_bundle(&self, bundle: ClaimBundle) -> Result<ClaimBundle, DiscoveryError> {
		let integration = self.get(&bundle.protocol).ok_or_else(|| {
			DiscoveryError::ValidationError(format!(
				"No integration configured for protocol: {}",
				bundle.protocol
			))
		})?;
		integration.build_bundle(bundle).await
	}

	pub fn len(&self) -> usize {
		self.integrations.len()
	}

	pub fn is_empty(&self) -> bool {
		self.integrations.is_empty()
	}
}
