//! Token pricing for the dust claimer.
//!
//! Converts raw token amounts into USD. Discovery prices rewards with it and
//! the payout verifier re-prices transfers found in receipt logs. Pricing is
//! optional for verification: without it a transfer is confirmed but its
//! value stays unknown.

use alloy_primitives::U256;
use async_trait::async_trait;
use claimer_types::{Address, Chain, ImplementationRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod implementations {
	pub mod mock;
}

/// Errors that can occur during pricing operations.
#[derive(Debug, Error)]
pub enum PricingError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Token not supported: {0} on chain {1}")]
	TokenNotSupported(String, Chain),
	#[error("Price data unavailable: {0}")]
	PriceUnavailable(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// A token price in USD with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPrice {
	pub token: Address,
	/// Symbol, e.g. "USDC".
	pub symbol: String,
	pub price_usd: f64,
	pub decimals: u8,
	/// Unix timestamp of the quote.
	pub last_updated: u64,
	/// Where the price came from, e.g. "mock" or "mock_override".
	pub source: String,
}

/// Interface for price sources.
#[async_trait]
pub trait PricingInterface: Send + Sync {
	/// Returns the USD price of one whole token.
	async fn get_token_price(&self, chain: Chain, token: &Address)
		-> Result<TokenPrice, PricingError>;

	/// Returns the decimals of a token by symbol.
	fn token_decimals(&self, symbol: &str) -> Result<u8, PricingError>;
}

/// Type alias for pricing factory functions.
pub type PricingFactory = fn(&toml::Value) -> Result<Box<dyn PricingInterface>, PricingError>;

/// Registry trait for pricing implementations.
pub trait PricingRegistry: ImplementationRegistry<Factory = PricingFactory> {}

/// Get all registered pricing implementations.
pub fn get_all_implementations() -> Vec<(&'static str, PricingFactory)> {
	use implementations::mock;

	vec![(mock::Registry::NAME, mock::Registry::factory())]
}

/// Converts a raw integer amount into whole-token units.
pub fn to_units(amount_wei: U256, decimals: u8) -> f64 {
	// Decimal strings round-trip any U256 into the nearest f64
	let raw = amount_wei.to_string().parse::<f64>().unwrap_or(f64::MAX);
	raw / 10f64.powi(decimals as i32)
}

/// Service that dispatches pricing to the primary implementation.
pub struct PricingService {
	implementations: HashMap<String, Arc<dyn PricingInterface>>,
	primary_implementation: String,
}

impl PricingService {
	pub fn new(
		implementations: HashMap<String, Arc<dyn PricingInterface>>,
		primary_implementation: String,
	) -> Result<Self, PricingError> {
		if !implementations.contains_key(&primary_implementation) {
			return Err(PricingError::Configuration(format!(
				"Primary implementation '{}' not found in available implementations",
				primary_implementation
			)));
		}

		Ok(Self {
			implementations,
			primary_implementation,
		})
	}

	fn primary(&self) -> Result<&Arc<dyn PricingInterface>, PricingError> {
		self.implementations
			.get(&self.primary_implementation)
			.ok_or_else(|| {
				PricingError::Configuration(format!(
					"Primary implementation '{}' not available",
					self.primary_implementation
				))
			})
	}

	pub async fn get_token_price(
		&self,
		chain: Chain,
		token: &Address,
	) -> Result<TokenPrice, PricingError> {
		self.primary()?.get_token_price(chain, token).await
	}

	/// Quotes `amount_wei` of `token` in USD.
	pub async fn quote_to_usd(
		&self,
		chain: Chain,
		token: &Address,
		amount_wei: U256,
	) -> Result<f64, PricingError> {
		let price = self.get_token_price(chain, token).await?;
		Ok(to_units(amount_wei, price.decimals) * price.price_usd)
	}

	pub fn token_decimals(&self, symbol: &str) -> Result<u8, PricingError> {
		self.primary()?.token_decimals(symbol)
	}
}
