//! Deterministic chain client used in mock mode.
//!
//! Nothing leaves the process. Sends succeed with a hash derived from the
//! bundle id and emit one ERC-20 `Transfer` log per claimed item, paid to the
//! bundle's recipient, so the payout verifier has real logs to decode.

use crate::{ChainClient, ChainError};
use alloy_primitives::{keccak256, Bytes};
use alloy_sol_types::{sol, SolEvent};
use async_trait::async_trait;
use claimer_config::NetworkConfig;
use claimer_types::{
	with_0x_prefix, Address, Chain, ClaimBundle, ReceiptLog, SendReceipt, SimulationResult,
};
use std::sync::Arc;

sol! {
	event Transfer(address indexed from, address indexed to, uint256 value);
}

/// Registry name of the mock client.
pub const NAME: &str = "mock";

const BASE_GAS: u64 = 60_000;
const GAS_PER_ITEM: u64 = 35_000;

/// Chain client that synthesizes results instead of talking to a node.
pub struct MockChainClient {
	chain: Chain,
	native_usd: f64,
	gas_price_wei: u128,
	/// When set, simulations fail and sends revert with this reason.
	revert_reason: Option<String>,
}

impl MockChainClient {
	pub fn new(chain: Chain, native_usd: f64) -> Self {
		Self {
			chain,
			native_usd,
			gas_price_wei: 1_000_000_000,
			revert_reason: None,
		}
	}

	pub fn with_gas_price(mut self, gas_price_wei: u128) -> Self {
		self.gas_price_wei = gas_price_wei;
		self
	}

	/// Makes every simulation and send on this client fail with `reason`.
	pub fn with_revert(mut self, reason: &str) -> Self {
		self.revert_reason = Some(reason.to_string());
		self
	}

	fn gas_used(bundle: &ClaimBundle) -> u64 {
		BASE_GAS + GAS_PER_ITEM * bundle.len() as u64
	}

	fn transfer_logs(&self, bundle: &ClaimBundle) -> Result<Vec<ReceiptLog>, ChainError> {
		let invalid = |e: claimer_types::AddressError| ChainError::InvalidTransaction(e.to_string());
		let to = bundle.claim_to.to_evm().map_err(invalid)?;
		let from = match &bundle.contract_address {
			Some(contract) => contract.to_evm().map_err(invalid)?,
			None => alloy_primitives::Address::ZERO,
		};

		bundle
			.items
			.iter()
			.enumerate()
			.map(|(index, item)| -> Result<ReceiptLog, ChainError> {
				let data = Transfer {
					from,
					to,
					value: item.amount_wei,
				}
				.encode_log_data();
				Ok(ReceiptLog {
					address: item.token.to_evm().map_err(invalid)?,
					topics: data.topics().to_vec(),
					data: data.data,
					log_index: index as u64,
				})
			})
			.collect()
	}
}

#[async_trait]
impl ChainClient for MockChainClient {
	fn chain(&self) -> Chain {
		self.chain
	}

	async fn gas_price(&self) -> Result<u128, ChainError> {
		Ok(self.gas_price_wei)
	}

	async fn native_usd(&self) -> Result<f64, ChainError> {
		Ok(self.native_usd)
	}

	async fn simulate(&self, bundle: &ClaimBundle) -> Result<SimulationResult, ChainError> {
		if let Some(reason) = &self.revert_reason {
			return Ok(SimulationResult {
				success: false,
				revert_reason: Some(reason.clone()),
				gas_estimate: None,
			});
		}
		Ok(SimulationResult {
			success: !bundle.is_empty(),
			revert_reason: bundle.is_empty().then(|| "Bundle has no items".to_string()),
			gas_estimate: Some(Self::gas_used(bundle)),
		})
	}

	async fn send_raw(&self, bundle: &ClaimBundle) -> Result<SendReceipt, ChainError> {
		if let Some(reason) = &self.revert_reason {
			return Err(ChainError::Reverted(reason.clone()));
		}

		let tx_hash = keccak256(format!("{}:{}", self.chain, bundle.id).as_bytes());
		let gas_used = Self::gas_used(bundle);
		let gas_usd = gas_used as f64 * self.gas_price_wei as f64 / 1e18 * self.native_usd;

		Ok(SendReceipt {
			tx_hash: with_0x_prefix(&hex::encode(tx_hash)),
			success: true,
			gas_used,
			gas_usd,
			logs: self.transfer_logs(bundle)?,
		})
	}

	async fn get_code(&self, _address: &Address) -> Result<Bytes, ChainError> {
		// Every address looks like a contract
		Ok(Bytes::from_static(&[0x60, 0x80]))
	}
}

/// Factory function creating a mock client for a configured network.
pub fn create_client(
	chain: Chain,
	network: &NetworkConfig,
) -> Result<Arc<dyn ChainClient>, ChainError> {
	Ok(Arc::new(MockChainClient::new(chain, network.native_usd)))
}
