//! Mock pricing for development and mock-mode runs.
//!
//! Knows a handful of tokens by address and symbol with fixed prices.
//! Overrides and a fallback price come from configuration.

use crate::{
	PricingError, PricingFactory, PricingInterface, PricingRegistry, TokenPrice,
};
use async_trait::async_trait;
use claimer_types::{current_timestamp, Address, Chain, ImplementationRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for the mock price source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockPricingConfig {
	#[serde(default = "default_enabled")]
	pub enabled: bool,
	/// Price overrides keyed by `token_address@chain`, e.g. `0xabc…@base`.
	#[serde(default)]
	pub price_overrides: HashMap<String, f64>,
	/// Price used for tokens the source does not know.
	#[serde(default = "default_fallback_price")]
	pub fallback_price_usd: f64,
}

fn default_enabled() -> bool {
	true
}

fn default_fallback_price() -> f64 {
	1.0
}

impl Default for MockPricingConfig {
	fn default() -> Self {
		Self {
			enabled: default_enabled(),
			price_overrides: HashMap::new(),
			fallback_price_usd: default_fallback_price(),
		}
	}
}

struct KnownToken {
	symbol: &'static str,
	decimals: u8,
	price_usd: f64,
}

const USDC: KnownToken = KnownToken {
	symbol: "USDC",
	decimals: 6,
	price_usd: 1.0,
};
const WETH: KnownToken = KnownToken {
	symbol: "WETH",
	decimals: 18,
	price_usd: 3000.0,
};
const ARB: KnownToken = KnownToken {
	symbol: "ARB",
	decimals: 18,
	price_usd: 0.8,
};
const OP: KnownToken = KnownToken {
	symbol: "OP",
	decimals: 18,
	price_usd: 1.5,
};

/// Mock price source with fixed prices for common tokens.
pub struct MockPricing {
	config: MockPricingConfig,
}

impl MockPricing {
	pub fn new(config: MockPricingConfig) -> Self {
		Self { config }
	}

	fn known_token(token: &Address) -> Option<&'static KnownToken> {
		match (token.chain(), token.value()) {
			(Chain::Ethereum, "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48")
			| (Chain::Base, "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913")
			| (Chain::Arbitrum, "0xaf88d065e77c8cc2239327c5edb3a432268e5831")
			| (Chain::Optimism, "0x0b2c639c533813f4aa9d7837caf62653d097ff85")
			| (Chain::Polygon, "0x3c499c542cef5e3811e1192ce70d8cc03d5c3359") => Some(&USDC),
			(Chain::Ethereum, "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2")
			| (Chain::Base | Chain::Optimism, "0x4200000000000000000000000000000000000006")
			| (Chain::Arbitrum, "0x82af49447d8a07e3bd95bd0d56f35241523fbab1") => Some(&WETH),
			(Chain::Arbitrum, "0x912ce59144191c1204e64559fe8253a0e49e6548") => Some(&ARB),
			(Chain::Optimism, "0x4200000000000000000000000000000000000042") => Some(&OP),
			_ => None,
		}
	}

	fn override_key(chain: Chain, token: &Address) -> String {
		format!("{}@{}", token.value(), chain)
	}
}

#[async_trait]
impl PricingInterface for MockPricing {
	async fn get_token_price(
		&self,
		chain: Chain,
		token: &Address,
	) -> Result<TokenPrice, PricingError> {
		if !self.config.enabled {
			return Err(PricingError::PriceUnavailable(
				"Mock pricing is disabled".to_string(),
			));
		}

		let known = Self::known_token(token);
		let symbol = known.map(|t| t.symbol).unwrap_or("UNKNOWN").to_string();
		let decimals = known.map(|t| t.decimals).unwrap_or(18);

		if let Some(price) = self
			.config
			.price_overrides
			.get(&Self::override_key(chain, token))
		{
			return Ok(TokenPrice {
				token: token.clone(),
				symbol,
				price_usd: *price,
				decimals,
				last_updated: current_timestamp(),
				source: "mock_override".to_string(),
			});
		}

		Ok(TokenPrice {
			token: token.clone(),
			symbol,
			price_usd: known
				.map(|t| t.price_usd)
				.unwrap_or(self.config.fallback_price_usd),
			decimals,
			last_updated: current_timestamp(),
			source: "mock".to_string(),
		})
	}

	fn token_decimals(&self, symbol: &str) -> Result<u8, PricingError> {
		[USDC, WETH, ARB, OP]
			.iter()
			.find(|t| t.symbol.eq_ignore_ascii_case(symbol))
			.map(|t| t.decimals)
			.ok_or_else(|| PricingError::PriceUnavailable(format!("Unknown symbol {}", symbol)))
	}
}

/// Registry for the mock pricing implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = PricingFactory;

	fn factory() -> Self::Factory {
		|config: &toml::Value| -> Result<Box<dyn PricingInterface>, PricingError> {
			let mock_config: MockPricingConfig = config.clone().try_into().map_err(|e| {
				PricingError::Configuration(format!("Invalid mock pricing config: {}", e))
			})?;
			Ok(Box::new(MockPricing::new(mock_config)))
		}
	}
}

impl PricingRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_known_tokens() {
		let pricing = MockPricing::new(MockPricingConfig::default());
		let weth = Address::new("0x4200000000000000000000000000000000000006", Chain::Base);

		let price = pricing.get_token_price(Chain::Base, &weth).await.unwrap();
		assert_eq!(price.symbol, "WETH");
		assert_eq!(price.decimals, 18);
		assert_eq!(price.source, "mock");
		assert_eq!(pricing.token_decimals("usdc").unwrap(), 6);
	}

	#[tokio::test]
	async fn test_override_and_fallback() {
		let token = Address::new("0x00000000000000000000000000000000000000b1", Chain::Base);
		let mut config = MockPricingConfig::default();
		config
			.price_overrides
			.insert(format!("{}@base", token.value()), 0.25);
		let pricing = MockPricing::new(config);

		let overridden = pricing.get_token_price(Chain::Base, &token).await.unwrap();
		assert_eq!(overridden.price_usd, 0.25);
		assert_eq!(overridden.source, "mock_override");

		let other = Address::new("0x00000000000000000000000000000000000000b2", Chain::Base);
		let fallback = pricing.get_token_price(Chain::Base, &other).await.unwrap();
		assert_eq!(fallback.price_usd, 1.0);
		assert_eq!(fallback.symbol, "UNKNOWN");
	}

	#[test]
	fn test_factory_parses_empty_table() {
		let factory = Registry::factory();
		assert!(factory(&toml::Value::Table(toml::map::Map::new())).is_ok());
	}
}
