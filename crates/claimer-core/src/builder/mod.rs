//! Builder for constructing claim engines.
//!
//! Services are created from configuration through named factory functions,
//! or supplied ready-made (as tests do). Mock mode is read from
//! configuration here and injected into the components that need it.

use crate::engine::ClaimEngine;
use crate::policy::Policy;
use claimer_chain::{ChainFactory, ChainService};
use claimer_config::Config;
use claimer_discovery::{DiscoveryService, IntegrationContext, IntegrationFactory};
use claimer_pricing::{PricingFactory, PricingInterface, PricingService};
use claimer_storage::{StorageFactory, StorageService};
use claimer_types::RecipientAllowList;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions by implementation name.
pub struct ClaimerFactories {
	pub storage_factories: HashMap<String, StorageFactory>,
	pub pricing_factories: HashMap<String, PricingFactory>,
	/// Must contain `evm` and `mock`; the one matching mock mode is used.
	pub chain_factories: HashMap<String, ChainFactory>,
	pub integration_factories: HashMap<String, IntegrationFactory>,
}

/// Builder for constructing a [`ClaimEngine`].
pub struct EngineBuilder {
	config: Config,
	storage: Option<Arc<StorageService>>,
	pricing: Option<Arc<PricingService>>,
	chains: Option<Arc<ChainService>>,
	discovery: Option<Arc<DiscoveryService>>,
	shutdown: CancellationToken,
}

impl EngineBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			storage: None,
			pricing: None,
			chains: None,
			discovery: None,
			shutdown: CancellationToken::new(),
		}
	}

	pub fn with_storage(mut self, storage: Arc<StorageService>) -> Self {
		self.storage = Some(storage);
		self
	}

	pub fn with_pricing(mut self, pricing: Arc<PricingService>) -> Self {
		self.pricing = Some(pricing);
		self
	}

	pub fn with_chains(mut self, chains: Arc<ChainService>) -> Self {
		self.chains = Some(chains);
		self
	}

	pub fn with_discovery(mut self, discovery: Arc<DiscoveryService>) -> Self {
		self.discovery = Some(discovery);
		self
	}

	/// Token whose cancellation stops the engine.
	pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
		self.shutdown = shutdown;
		self
	}

	/// Builds every service not supplied yet from `factories`.
	pub fn build(mut self, factories: ClaimerFactories) -> Result<ClaimEngine, BuilderError> {
		if self.storage.is_none() {
			self.storage = Some(Arc::new(self.create_storage(&factories)?));
		}
		if self.pricing.is_none() {
			self.pricing = self.create_pricing(&factories)?.map(Arc::new);
		}
		if self.chains.is_none() {
			self.chains = Some(Arc::new(self.create_chains(&factories)?));
		}
		if self.discovery.is_none() {
			self.discovery = Some(Arc::new(self.create_discovery(&factories)?));
		}
		self.build_with_services()
	}

	/// Assembles the engine from supplied services only.
	///
	/// Storage, chains and discovery are required; pricing is optional.
	pub fn build_with_services(self) -> Result<ClaimEngine, BuilderError> {
		let policy = Policy::from_config(&self.config);
		let violations = policy.validate_thresholds();
		if !violations.is_empty() {
			let joined = violations
				.iter()
				.map(ToString::to_string)
				.collect::<Vec<_>>()
				.join("; ");
			return Err(BuilderError::Config(format!("Invalid policy: {}", joined)));
		}

		let storage = self
			.storage
			.ok_or_else(|| BuilderError::MissingComponent("storage".into()))?;
		let chains = self
			.chains
			.ok_or_else(|| BuilderError::MissingComponent("chains".into()))?;
		let discovery = self
			.discovery
			.ok_or_else(|| BuilderError::MissingComponent("discovery".into()))?;

		if discovery.is_empty() {
			tracing::warn!("No integrations configured; cycles will find nothing");
		}

		Ok(ClaimEngine::new(
			self.config.claimer.id.clone(),
			policy,
			self.config.gas.clone(),
			self.config.claimer.mock_mode,
			discovery,
			chains,
			storage,
			self.pricing,
			RecipientAllowList::new(self.config.recipients()),
			Duration::from_secs(self.config.storage.cleanup_interval_seconds),
			self.shutdown,
		))
	}

	fn create_storage(&self, factories: &ClaimerFactories) -> Result<StorageService, BuilderError> {
		let primary = &self.config.storage.primary;
		let config = self.config.storage.implementations.get(primary).ok_or_else(|| {
			BuilderError::Config(format!("Primary storage '{}' has no configuration", primary))
		})?;
		let factory = factories.storage_factories.get(primary).ok_or_else(|| {
			BuilderError::Config(format!("Unknown storage implementation '{}'", primary))
		})?;

		match factory(config) {
			Ok(backend) => {
				tracing::info!(component = "storage", implementation = %primary, "Loaded");
				Ok(StorageService::new(backend))
			},
			Err(e) => {
				tracing::error!(
					component = "storage",
					implementation = %primary,
					error = %e,
					"Failed to create storage implementation"
				);
				Err(BuilderError::Config(format!(
					"Failed to create storage implementation '{}': {}",
					primary, e
				)))
			},
		}
	}

	fn create_pricing(
		&self,
		factories: &ClaimerFactories,
	) -> Result<Option<PricingService>, BuilderError> {
		let mut implementations: HashMap<String, Arc<dyn PricingInterface>> = HashMap::new();
		for (name, config) in &self.config.pricing.implementations {
			let Some(factory) = factories.pricing_factories.get(name) else {
				tracing::warn!(component = "pricing", implementation = %name, "Unknown implementation, skipping");
				continue;
			};
			let implementation = factory(config).map_err(|e| {
				BuilderError::Config(format!(
					"Failed to create pricing implementation '{}': {}",
					name, e
				))
			})?;
			let is_primary = &self.config.pricing.primary == name;
			tracing::info!(component = "pricing", implementation = %name, enabled = %is_primary, "Loaded");
			implementations.insert(name.clone(), Arc::from(implementation));
		}

		if implementations.is_empty() {
			tracing::warn!(component = "pricing", "No pricing configured; payouts will be unpriced");
			return Ok(None);
		}
		PricingService::new(implementations, self.config.pricing.primary.clone())
			.map(Some)
			.map_err(|e| BuilderError::Config(e.to_string()))
	}

	fn create_chains(&self, factories: &ClaimerFactories) -> Result<ChainService, BuilderError> {
		let name = if self.config.claimer.mock_mode {
			claimer_chain::implementations::mock::NAME
		} else {
			claimer_chain::implementations::evm::alloy::NAME
		};
		let factory = factories
			.chain_factories
			.get(name)
			.copied()
			.ok_or_else(|| BuilderError::MissingComponent(format!("chain factory '{}'", name)))?;

		ChainService::from_networks(&self.config.networks, factory).map_err(|e| {
			BuilderError::Config(format!("Failed to create chain clients: {}", e))
		})
	}

	fn create_discovery(
		&self,
		factories: &ClaimerFactories,
	) -> Result<DiscoveryService, BuilderError> {
		let context = IntegrationContext {
			mock_mode: self.config.claimer.mock_mode,
			recipients: RecipientAllowList::new(self.config.recipients()),
			networks: self.config.networks.clone(),
			pricing: self.pricing.clone(),
		};

		let mut names: Vec<_> = self.config.integrations.keys().collect();
		names.sort();

		let mut integrations = Vec::new();
		for name in names {
			let config = &self.config.integrations[name];
			if !config.get("enabled").and_then(|v| v.as_bool()).unwrap_or(true) {
				tracing::info!(component = "discovery", implementation = %name, "Disabled");
				continue;
			}
			let factory = factories.integration_factories.get(name).ok_or_else(|| {
				BuilderError::Config(format!("Unknown integration '{}'", name))
			})?;
			match factory(config, &context) {
				Ok(integration) => {
					tracing::info!(component = "discovery", implementation = %name, "Loaded");
					integrations.push(Arc::from(integration));
				},
				Err(e) => {
					tracing::error!(
						component = "discovery",
						implementation = %name,
						error = %e,
						"Failed to create integration"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create integration '{}': {}",
						name, e
					)));
				},
			}
		}

		Ok(DiscoveryService::new(integrations))
	}
}

/// Collects every registered implementation into [`ClaimerFactories`].
pub fn default_factories() -> ClaimerFactories {
	ClaimerFactories {
		storage_factories: claimer_storage::get_all_implementations()
			.into_iter()
			.map(|(name, factory)| (name.to_string(), factory))
			.collect(),
		pricing_factories: claimer_pricing::get_all_implementations()
			.into_iter()
			.map(|(name, factory)| (name.to_string(), factory))
			.collect(),
		chain_factories: claimer_chain::get_all_implementations()
			.into_iter()
			.map(|(name, factory)| (name.to_string(), factory))
			.collect(),
		integration_factories: claimer_discovery::get_all_implementations()
			.into_iter()
			.map(|(name, factory)| (name.to_string(), factory))
			.collect(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use claimer_config::{ConfigBuilder, PolicyConfig};

	#[tokio::test]
	async fn test_default_config_builds_mock_engine() {
		let engine = EngineBuilder::new(ConfigBuilder::new().build())
			.build(default_factories())
			.unwrap();
		assert!(engine.mock_mode());

		let report = engine.run_cycle().await.unwrap();
		assert_eq!(report.rewards_discovered, 3);
		assert_eq!(report.succeeded, 1);
		assert!(report.results[0].verified_payout);
	}

	#[test]
	fn test_invalid_policy_is_fatal() {
		let config = ConfigBuilder::new()
			.policy(PolicyConfig {
				min_bundle_gross_usd: 1.0,
				min_bundle_net_usd: 2.0,
				..PolicyConfig::default()
			})
			.build();
		let result = EngineBuilder::new(config).build(default_factories());
		match result {
			Err(BuilderError::Config(message)) => assert!(message.contains("min_bundle_net_usd")),
			_ => panic!("expected a policy error"),
		}
	}

	#[test]
	fn test_missing_services() {
		let result = EngineBuilder::new(ConfigBuilder::new().build()).build_with_services();
		assert!(matches!(result, Err(BuilderError::MissingComponent(_))));
	}

	#[test]
	fn test_unknown_integration_is_rejected() {
		let config = ConfigBuilder::new()
			.integration("nonexistent", toml::Value::Table(toml::map::Map::new()))
			.build();
		let result = EngineBuilder::new(config).build(default_factories());
		assert!(matches!(result, Err(BuilderError::Config(_))));
	}
}
