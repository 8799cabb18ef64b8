//! Configuration builder for creating test and development configurations.
//!
//! The defaults describe a mock-mode claimer on Base with in-memory storage,
//! mock pricing and the synthetic integration.

use crate::{
	ClaimerConfig, Config, GasConfig, NetworkConfig, PolicyConfig, PricingConfig, RetryConfig,
	ScheduleConfig, StorageConfig,
};
use claimer_types::Chain;
use std::collections::{BTreeMap, HashMap};

/// Recipient used by builder-produced configurations.
pub const DEFAULT_TEST_RECIPIENT: &str = "0x8ba1f109551bd432803012645ac136ddd64dba72";

/// Builder for creating `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	claimer_id: String,
	mock_mode: bool,
	policy: PolicyConfig,
	schedule: ScheduleConfig,
	retry: RetryConfig,
	gas: GasConfig,
	networks: BTreeMap<Chain, NetworkConfig>,
	storage_primary: String,
	storage_cleanup_interval_seconds: u64,
	integrations: HashMap<String, toml::Value>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Creates a new `ConfigBuilder` with default values suitable for testing.
	pub fn new() -> Self {
		let mut networks = BTreeMap::new();
		networks.insert(
			Chain::Base,
			NetworkConfig {
				rpc_url: String::new(),
				claim_recipient: DEFAULT_TEST_RECIPIENT.to_string(),
				native_usd: 3000.0,
				private_key: None,
			},
		);
		let mut integrations = HashMap::new();
		integrations.insert(
			"synthetic".to_string(),
			toml::Value::Table(toml::map::Map::new()),
		);

		Self {
			claimer_id: "test-claimer".to_string(),
			mock_mode: true,
			policy: PolicyConfig::default(),
			schedule: ScheduleConfig {
				interval_seconds: 10,
				jitter_seconds: 1,
				tick_timeout_seconds: 5,
			},
			retry: RetryConfig {
				max_attempts: 3,
				base_delay_ms: 10,
			},
			gas: GasConfig::default(),
			networks,
			storage_primary: "memory".to_string(),
			storage_cleanup_interval_seconds: 60,
			integrations,
		}
	}

	pub fn claimer_id(mut self, id: String) -> Self {
		self.claimer_id = id;
		self
	}

	pub fn mock_mode(mut self, mock_mode: bool) -> Self {
		self.mock_mode = mock_mode;
		self
	}

	pub fn policy(mut self, policy: PolicyConfig) -> Self {
		self.policy = policy;
		self
	}

	pub fn schedule(mut self, schedule: ScheduleConfig) -> Self {
		self.schedule = schedule;
		self
	}

	pub fn retry(mut self, retry: RetryConfig) -> Self {
		self.retry = retry;
		self
	}

	pub fn gas(mut self, gas: GasConfig) -> Self {
		self.gas = gas;
		self
	}

	/// Adds or replaces the network entry for `chain`.
	pub fn network(mut self, chain: Chain, network: NetworkConfig) -> Self {
		self.networks.insert(chain, network);
		self
	}

	pub fn storage_primary(mut self, primary: String) -> Self {
		self.storage_primary = primary;
		self
	}

	pub fn storage_cleanup_interval_seconds(mut self, interval: u64) -> Self {
		self.storage_cleanup_interval_seconds = interval;
		self
	}

	/// Adds an integration section.
	pub fn integration(mut self, name: &str, config: toml::Value) -> Self {
		self.integrations.insert(name.to_string(), config);
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		let mut storage_implementations = HashMap::new();
		storage_implementations.insert(
			self.storage_primary.clone(),
			toml::Value::Table(toml::map::Map::new()),
		);
		let mut pricing_implementations = HashMap::new();
		pricing_implementations.insert(
			"mock".to_string(),
			toml::Value::Table(toml::map::Map::new()),
		);

		Config {
			claimer: ClaimerConfig {
				id: self.claimer_id,
				mock_mode: self.mock_mode,
			},
			policy: self.policy,
			schedule: self.schedule,
			retry: self.retry,
			gas: self.gas,
			networks: self.networks,
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations: storage_implementations,
				cleanup_interval_seconds: self.storage_cleanup_interval_seconds,
			},
			pricing: PricingConfig {
				primary: "mock".to_string(),
				implementations: pricing_implementations,
			},
			integrations: self.integrations,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_builder_output_passes_validation() {
		let config = ConfigBuilder::new().build();
		assert!(config.validate().is_ok());
		assert!(config.claimer.mock_mode);
		assert_eq!(config.recipients()[&Chain::Base].value(), DEFAULT_TEST_RECIPIENT);
	}
}
