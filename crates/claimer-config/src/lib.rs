//! Configuration module for the dust claimer.
//!
//! This module provides structures and utilities for managing claimer
//! configuration. It supports loading configuration from TOML files and
//! validates that every value the pipeline relies on is present and sane.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

pub mod builders;
mod loader;

pub use builders::config::ConfigBuilder;

use claimer_types::{is_known_test_address, is_placeholder, Address, Chain, SecretString};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the claimer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to the claimer instance.
	pub claimer: ClaimerConfig,
	/// Economic thresholds and TTLs.
	#[serde(default)]
	pub policy: PolicyConfig,
	/// Cycle cadence.
	#[serde(default)]
	pub schedule: ScheduleConfig,
	/// Backoff parameters for chain sends.
	#[serde(default)]
	pub retry: RetryConfig,
	/// Gas limit model used to price bundles.
	#[serde(default)]
	pub gas: GasConfig,
	/// Per-chain RPC endpoints and allow-listed recipients.
	#[serde(
		deserialize_with = "deserialize_networks",
		serialize_with = "serialize_networks"
	)]
	pub networks: BTreeMap<Chain, NetworkConfig>,
	/// Configuration for the ledger storage backend.
	pub storage: StorageConfig,
	/// Configuration for token pricing.
	pub pricing: PricingConfig,
	/// Map of integration names to their raw configurations.
	pub integrations: HashMap<String, toml::Value>,
}

/// Configuration specific to the claimer instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClaimerConfig {
	/// Unique identifier for this claimer instance.
	pub id: String,
	/// Synthesizes chain interactions instead of performing them.
	#[serde(default)]
	pub mock_mode: bool,
}

/// Policy thresholds as written in configuration.
///
/// Durations are in seconds; `claimer-core` converts this into its frozen
/// `Policy`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
	/// Minimum USD value of a single reward.
	pub min_item_usd: f64,
	/// Minimum USD value of a bundle before gas.
	pub min_bundle_gross_usd: f64,
	/// Minimum USD value of a bundle after gas.
	pub min_bundle_net_usd: f64,
	pub min_bundle_size: usize,
	pub max_bundle_size: usize,
	/// Minimum time between two claims of the same position.
	pub claim_cooldown_seconds: u64,
	/// Gas price at which thresholds apply unscaled.
	pub reference_gas_gwei: f64,
	pub quarantine_ttl_seconds: u64,
	pub idempotency_ttl_seconds: u64,
	/// Replaces the thresholds above with the lowered development set.
	pub dev_mode: bool,
}

impl Default for PolicyConfig {
	fn default() -> Self {
		Self {
			min_item_usd: 0.10,
			min_bundle_gross_usd: 2.0,
			min_bundle_net_usd: 1.0,
			min_bundle_size: 2,
			max_bundle_size: 50,
			claim_cooldown_seconds: 3600,
			reference_gas_gwei: 30.0,
			quarantine_ttl_seconds: 3600,
			idempotency_ttl_seconds: 600,
			dev_mode: false,
		}
	}
}

/// Cycle cadence in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
	pub interval_seconds: u64,
	/// Symmetric random offset applied to every interval.
	pub jitter_seconds: u64,
	/// Hard deadline for one cycle.
	pub tick_timeout_seconds: u64,
}

impl Default for ScheduleConfig {
	fn default() -> Self {
		Self {
			interval_seconds: 300,
			jitter_seconds: 30,
			tick_timeout_seconds: 120,
		}
	}
}

/// Backoff parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
	/// Total invocations, including the first.
	pub max_attempts: u32,
	pub base_delay_ms: u64,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay_ms: 1000,
		}
	}
}

/// Gas limit model: `base_gas + per_item_gas * items` unless an item carries
/// its own estimate.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GasConfig {
	pub base_gas: u64,
	pub per_item_gas: u64,
}

impl Default for GasConfig {
	fn default() -> Self {
		Self {
			base_gas: 60_000,
			per_item_gas: 35_000,
		}
	}
}

/// Per-chain settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
	/// HTTP RPC endpoint. Unused in mock mode.
	#[serde(default)]
	pub rpc_url: String,
	/// The single allow-listed recipient of claimed funds on this chain.
	pub claim_recipient: String,
	/// USD price of the native gas token.
	pub native_usd: f64,
	/// Signing key for claim transactions.
	#[serde(default)]
	pub private_key: Option<SecretString>,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired ledger entries.
	pub cleanup_interval_seconds: u64,
}

/// Configuration for token pricing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PricingConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of pricing implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

fn deserialize_networks<'de, D>(deserializer: D) -> Result<BTreeMap<Chain, NetworkConfig>, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = HashMap::<String, NetworkConfig>::deserialize(deserializer)?;
	raw.into_iter()
		.map(|(name, network)| {
			let chain = Chain::from_str(&name).map_err(serde::de::Error::custom)?;
			Ok((chain, network))
		})
		.collect()
}

fn serialize_networks<S>(
	networks: &BTreeMap<Chain, NetworkConfig>,
	serializer: S,
) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	serializer.collect_map(networks.iter().map(|(chain, network)| (chain.as_str(), network)))
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)));
				},
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file with environment variable resolution.
	///
	/// Supports `include = ["file1.toml", "file2.toml"]`. Top-level sections
	/// must be unique across files; `[integrations.<name>]` entries may be
	/// spread over several files, each name defined once.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Returns the allow-listed claim recipient of every configured chain.
	pub fn recipients(&self) -> HashMap<Chain, Address> {
		self.networks
			.iter()
			.map(|(chain, network)| (*chain, Address::new(&network.claim_recipient, *chain)))
			.collect()
	}

	/// Validates the configuration to ensure all required fields are properly set.
	///
	/// Economic threshold sanity is checked separately by the policy itself;
	/// this covers structure, references between sections and recipients.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.claimer.id.is_empty() {
			return Err(ConfigError::Validation("Claimer ID cannot be empty".into()));
		}

		if self.networks.is_empty() {
			return Err(ConfigError::Validation(
				"At least one network must be configured".into(),
			));
		}
		for (chain, network) in &self.networks {
			self.validate_network(*chain, network)?;
		}

		if self.schedule.interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"Schedule interval_seconds must be greater than 0".into(),
			));
		}
		if self.schedule.tick_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"Schedule tick_timeout_seconds must be greater than 0".into(),
			));
		}
		if self.retry.max_attempts == 0 {
			return Err(ConfigError::Validation(
				"Retry max_attempts must be at least 1".into(),
			));
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}
		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds must be greater than 0".into(),
			));
		}
		if self.storage.cleanup_interval_seconds > 86400 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds cannot exceed 86400 (24 hours)".into(),
			));
		}

		if !self
			.pricing
			.implementations
			.contains_key(&self.pricing.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary pricing '{}' not found in implementations",
				self.pricing.primary
			)));
		}

		if self.integrations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one integration must be configured".into(),
			));
		}

		Ok(())
	}

	fn validate_network(&self, chain: Chain, network: &NetworkConfig) -> Result<(), ConfigError> {
		if network.native_usd <= 0.0 || !network.native_usd.is_finite() {
			return Err(ConfigError::Validation(format!(
				"Network {} native_usd must be a positive number",
				chain
			)));
		}

		let recipient = Address::new(&network.claim_recipient, chain);
		recipient
			.to_evm()
			.map_err(|e| ConfigError::Validation(e.to_string()))?;

		if self.claimer.mock_mode {
			return Ok(());
		}

		if network.rpc_url.is_empty() {
			return Err(ConfigError::Validation(format!(
				"Network {} must have rpc_url outside mock mode",
				chain
			)));
		}
		if is_placeholder(&recipient) || is_known_test_address(&recipient) {
			return Err(ConfigError::Validation(format!(
				"Network {} claim_recipient {} is a placeholder or test address",
				chain, recipient
			)));
		}
		if network
			.private_key
			.as_ref()
			.map(|key| key.is_empty())
			.unwrap_or(true)
		{
			return Err(ConfigError::Validation(format!(
				"Network {} must have private_key outside mock mode",
				chain
			)));
		}
		Ok(())
	}
}

/// Parses configuration from a TOML string.
///
/// Environment variables are resolved and the configuration is validated
/// after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MOCK_CONFIG: &str = r#"
[claimer]
id = "test-claimer"
mock_mode = true

[policy]
min_item_usd = 0.1
min_bundle_gross_usd = 2.0
min_bundle_net_usd = 1.0

[networks.base]
claim_recipient = "0x8ba1f109551bd432803012645ac136ddd64dba72"
native_usd = 3000.0

[storage]
primary = "memory"
cleanup_interval_seconds = 3600
[storage.implementations.memory]

[pricing]
primary = "mock"
[pricing.implementations.mock]

[integrations.synthetic]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("CLAIMER_TEST_HOST", "localhost");
		std::env::set_var("CLAIMER_TEST_PORT", "8545");

		let input = "rpc_url = \"http://${CLAIMER_TEST_HOST}:${CLAIMER_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "rpc_url = \"http://localhost:8545\"");

		std::env::remove_var("CLAIMER_TEST_HOST");
		std::env::remove_var("CLAIMER_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${CLAIMER_MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${CLAIMER_MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("CLAIMER_MISSING_VAR"));
	}

	#[test]
	fn test_mock_config_parses_with_defaults() {
		let config: Config = MOCK_CONFIG.parse().unwrap();
		assert_eq!(config.claimer.id, "test-claimer");
		assert!(config.claimer.mock_mode);
		assert_eq!(config.retry.max_attempts, 3);
		assert_eq!(config.schedule.interval_seconds, 300);
		assert!(config.networks.contains_key(&Chain::Base));
		assert_eq!(
			config.recipients()[&Chain::Base].value(),
			"0x8ba1f109551bd432803012645ac136ddd64dba72"
		);
	}

	#[test]
	fn test_networks_accept_chain_ids() {
		let config_str = MOCK_CONFIG.replace("[networks.base]", "[networks.42161]");
		let config: Config = config_str.parse().unwrap();
		assert!(config.networks.contains_key(&Chain::Arbitrum));
	}

	#[test]
	fn test_unknown_network_rejected() {
		let config_str = MOCK_CONFIG.replace("[networks.base]", "[networks.solana]");
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("Unsupported chain"));
	}

	#[test]
	fn test_placeholder_recipient_rejected_outside_mock_mode() {
		let config_str = MOCK_CONFIG
			.replace("mock_mode = true", "mock_mode = false")
			.replace(
				"0x8ba1f109551bd432803012645ac136ddd64dba72",
				"0x0000000000000000000000000000000000000000",
			)
			.replace(
				"native_usd = 3000.0",
				"native_usd = 3000.0\nrpc_url = \"http://localhost:8545\"\nprivate_key = \"0x01\"",
			);
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("placeholder"));
	}

	#[test]
	fn test_live_mode_requires_rpc_url() {
		let config_str = MOCK_CONFIG.replace("mock_mode = true", "mock_mode = false");
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("rpc_url"));
	}

	#[test]
	fn test_primary_storage_must_exist() {
		let config_str = MOCK_CONFIG.replace("primary = \"memory\"", "primary = \"file\"");
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err
			.to_string()
			.contains("Primary storage 'file' not found in implementations"));
	}
}
