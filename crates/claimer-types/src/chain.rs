//! Chain identifiers and chain-tagged addresses.
//!
//! Every address the claimer handles carries the chain it lives on. Equality
//! is the lowercase string plus the chain tag, so a checksummed and a
//! lowercase spelling of the same account compare equal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Supported EVM networks.
///
/// The set is closed: dispatch to chain clients and recipient allow-lists is
/// keyed by this enum, never by free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
	Ethereum,
	Arbitrum,
	Optimism,
	Base,
	Polygon,
}

impl Chain {
	/// Returns the EVM chain id.
	pub fn chain_id(&self) -> u64 {
		match self {
			Chain::Ethereum => 1,
			Chain::Arbitrum => 42161,
			Chain::Optimism => 10,
			Chain::Base => 8453,
			Chain::Polygon => 137,
		}
	}

	/// Returns the lowercase configuration name of the chain.
	pub fn as_str(&self) -> &'static str {
		match self {
			Chain::Ethereum => "ethereum",
			Chain::Arbitrum => "arbitrum",
			Chain::Optimism => "optimism",
			Chain::Base => "base",
			Chain::Polygon => "polygon",
		}
	}

	/// Returns an iterator over all supported chains.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Ethereum,
			Self::Arbitrum,
			Self::Optimism,
			Self::Base,
			Self::Polygon,
		]
		.into_iter()
	}
}

impl fmt::Display for Chain {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when a chain name or id is not supported.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unsupported chain: {0}")]
pub struct ChainParseError(pub String);

impl FromStr for Chain {
	type Err = ChainParseError;

	/// Accepts the lowercase name (`"base"`) or the numeric chain id (`"8453"`).
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let normalized = s.trim().to_lowercase();
		if let Ok(id) = normalized.parse::<u64>() {
			return Chain::all()
				.find(|chain| chain.chain_id() == id)
				.ok_or_else(|| ChainParseError(s.to_string()));
		}
		Chain::all()
			.find(|chain| chain.as_str() == normalized)
			.ok_or_else(|| ChainParseError(s.to_string()))
	}
}

/// Errors that can occur when converting an address for on-chain use.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
	#[error("Invalid address '{value}' on {chain}: {reason}")]
	Invalid {
		value: String,
		chain: Chain,
		reason: String,
	},
}

/// An address on a specific chain.
///
/// The value is normalized to lowercase on construction and on
/// deserialization, which makes the derived equality and hashing
/// case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawAddress")]
pub struct Address {
	value: String,
	chain: Chain,
}

#[derive(Deserialize)]
struct RawAddress {
	value: String,
	chain: Chain,
}

impl From<RawAddress> for Address {
	fn from(raw: RawAddress) -> Self {
		Address::new(raw.value, raw.chain)
	}
}

impl Address {
	/// Creates a new address, normalizing the value to trimmed lowercase.
	pub fn new(value: impl AsRef<str>, chain: Chain) -> Self {
		Self {
			value: value.as_ref().trim().to_lowercase(),
			chain,
		}
	}

	/// Creates an address from an EVM address.
	pub fn from_evm(address: alloy_primitives::Address, chain: Chain) -> Self {
		Self::new(address.to_string(), chain)
	}

	pub fn value(&self) -> &str {
		&self.value
	}

	pub fn chain(&self) -> Chain {
		self.chain
	}

	/// Returns the `chain:address` key used by wallet-level bookkeeping.
	pub fn key(&self) -> String {
		format!("{}:{}", self.chain, self.value)
	}

	/// Parses the value as a 20-byte EVM address.
	pub fn to_evm(&self) -> Result<alloy_primitives::Address, AddressError> {
		self.value
			.parse::<alloy_primitives::Address>()
			.map_err(|e| AddressError::Invalid {
				value: self.value.clone(),
				chain: self.chain,
				reason: e.to_string(),
			})
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.value)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_address_equality_is_case_insensitive() {
		let checksummed = Address::new("0xAbC0000000000000000000000000000000000001", Chain::Base);
		let lower = Address::new("0xabc0000000000000000000000000000000000001", Chain::Base);
		assert_eq!(checksummed, lower);
		assert_eq!(checksummed.key(), "base:0xabc0000000000000000000000000000000000001");
	}

	#[test]
	fn test_address_chain_tag_participates_in_equality() {
		let on_base = Address::new("0xabc0000000000000000000000000000000000001", Chain::Base);
		let on_mainnet =
			Address::new("0xabc0000000000000000000000000000000000001", Chain::Ethereum);
		assert_ne!(on_base, on_mainnet);
	}

	#[test]
	fn test_deserialize_normalizes_value() {
		let json = r#"{"value":"0xABCDEF0000000000000000000000000000000001","chain":"polygon"}"#;
		let address: Address = serde_json::from_str(json).unwrap();
		assert_eq!(address.value(), "0xabcdef0000000000000000000000000000000001");
		assert_eq!(address.chain(), Chain::Polygon);
	}

	#[test]
	fn test_chain_from_str() {
		assert_eq!("Arbitrum".parse::<Chain>().unwrap(), Chain::Arbitrum);
		assert_eq!("8453".parse::<Chain>().unwrap(), Chain::Base);
		assert!("solana".parse::<Chain>().is_err());
	}

	#[test]
	fn test_to_evm_rejects_garbage() {
		let address = Address::new("not-an-address", Chain::Ethereum);
		assert!(address.to_evm().is_err());
	}
}
