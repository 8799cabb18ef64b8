//! Serde adapter storing `U256` as a decimal string.
//!
//! Reward amounts are arbitrary-precision integers; the decimal form keeps
//! ledger rows and integration payloads human readable.

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = String::deserialize(deserializer)?;
	U256::from_str_radix(raw.trim(), 10)
		.map_err(|e| serde::de::Error::custom(format!("Invalid amount '{}': {}", raw, e)))
}
