//! Alloy-based EVM chain client.
//!
//! Talks to a node over HTTP. The provider carries the claim signer, so
//! `send_raw` signs, submits and waits for the receipt in one call.

use crate::{ChainClient, ChainError};
use alloy_network::EthereumWallet;
use alloy_primitives::{Address as AlloyAddress, Bytes, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport_http::Http;
use async_trait::async_trait;
use claimer_config::NetworkConfig;
use claimer_types::{
	truncate_id, with_0x_prefix, Address, Chain, ClaimBundle, ReceiptLog, SendReceipt,
	SimulationResult,
};
use std::sync::Arc;

/// Registry name of the HTTP client.
pub const NAME: &str = "evm";

/// HTTP chain client for one EVM network.
pub struct AlloyChainClient {
	chain: Chain,
	provider: Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>,
	/// Address of the signer, used as `from` in simulations.
	sender: AlloyAddress,
	native_usd: f64,
}

impl AlloyChainClient {
	pub fn new(
		chain: Chain,
		rpc_url: &str,
		signer: PrivateKeySigner,
		native_usd: f64,
	) -> Result<Self, ChainError> {
		let url = rpc_url.parse().map_err(|e| {
			ChainError::Configuration(format!("Invalid RPC URL for {}: {}", chain, e))
		})?;

		let signer = signer.with_chain_id(Some(chain.chain_id()));
		let sender = signer.address();
		let provider = ProviderBuilder::new()
			.with_recommended_fillers()
			.wallet(EthereumWallet::from(signer))
			.on_http(url);

		Ok(Self {
			chain,
			provider: Arc::new(provider),
			sender,
			native_usd,
		})
	}

	/// Builds the claim transaction carried by the bundle.
	fn transaction_request(&self, bundle: &ClaimBundle) -> Result<TransactionRequest, ChainError> {
		let contract = bundle.contract_address.as_ref().ok_or_else(|| {
			ChainError::InvalidTransaction(format!(
				"Bundle {} has no contract address",
				truncate_id(&bundle.id)
			))
		})?;
		let to = contract
			.to_evm()
			.map_err(|e| ChainError::InvalidTransaction(e.to_string()))?;
		let input = bundle.call_data.clone().ok_or_else(|| {
			ChainError::InvalidTransaction(format!(
				"Bundle {} has no call data",
				truncate_id(&bundle.id)
			))
		})?;

		Ok(TransactionRequest::default()
			.from(self.sender)
			.to(to)
			.input(input.into())
			.value(bundle.value.unwrap_or(U256::ZERO)))
	}
}

/// Maps provider errors, treating reverts as final.
fn classify(context: &str, error: impl std::fmt::Display) -> ChainError {
	let message = format!("{}: {}", context, error);
	if message.to_lowercase().contains("revert") {
		ChainError::Reverted(message)
	} else {
		ChainError::Network(message)
	}
}

/// Error for a broadcast transaction whose receipt never arrived.
fn unconfirmed(tx_hash: &str, error: impl std::fmt::Display) -> ChainError {
	ChainError::Unconfirmed {
		tx_hash: tx_hash.to_string(),
		message: format!("Failed to get receipt: {}", error),
	}
}

#[async_trait]
impl ChainClient for AlloyChainClient {
	fn chain(&self) -> Chain {
		self.chain
	}

	async fn gas_price(&self) -> Result<u128, ChainError> {
		self.provider
			.get_gas_price()
			.await
			.map_err(|e| classify("Failed to get gas price", e))
	}

	async fn native_usd(&self) -> Result<f64, ChainError> {
		Ok(self.native_usd)
	}

	async fn simulate(&self, bundle: &ClaimBundle) -> Result<SimulationResult, ChainError> {
		let request = self.transaction_request(bundle)?;

		if let Err(e) = self.provider.call(&request).await {
			return match classify("Simulation failed", e) {
				ChainError::Reverted(reason) => Ok(SimulationResult {
					success: false,
					revert_reason: Some(reason),
					gas_estimate: None,
				}),
				other => Err(other),
			};
		}

		let gas_estimate = self
			.provider
			.estimate_gas(&request)
			.await
			.map_err(|e| classify("Gas estimation failed", e))?;

		Ok(SimulationResult {
			success: true,
			revert_reason: None,
			gas_estimate: Some(gas_estimate),
		})
	}

	async fn send_raw(&self, bundle: &ClaimBundle) -> Result<SendReceipt, ChainError> {
		let request = self.transaction_request(bundle)?;

		let pending = self
			.provider
			.send_transaction(request)
			.await
			.map_err(|e| classify("Failed to send transaction", e))?;
		let tx_hash = with_0x_prefix(&hex::encode(pending.tx_hash()));
		tracing::info!(
			chain = %self.chain,
			bundle_id = %truncate_id(&bundle.id),
			tx_hash = %truncate_id(&tx_hash),
			"Submitted claim transaction"
		);

		let receipt = pending
			.get_receipt()
			.await
			.map_err(|e| unconfirmed(&tx_hash, e))?;

		let gas_used = receipt.gas_used as u64;
		let gas_usd =
			gas_used as f64 * receipt.effective_gas_price as f64 / 1e18 * self.native_usd;
		let logs = receipt
			.inner
			.logs()
			.iter()
			.enumerate()
			.map(|(position, log)| ReceiptLog {
				address: log.address(),
				topics: log.topics().to_vec(),
				data: log.data().data.clone(),
				log_index: log.log_index.unwrap_or(position as u64),
			})
			.collect();

		Ok(SendReceipt {
			tx_hash,
			success: receipt.status(),
			gas_used,
			gas_usd,
			logs,
		})
	}

	async fn get_code(&self, address: &Address) -> Result<Bytes, ChainError> {
		let address = address
			.to_evm()
			.map_err(|e| ChainError::InvalidTransaction(e.to_string()))?;
		self.provider
			.get_code_at(address)
			.await
			.map_err(|e| classify("Failed to get code", e))
	}
}

/// Factory function creating an HTTP client for a configured network.
///
/// Requires `rpc_url` and `private_key` in the network section.
pub fn create_client(
	chain: Chain,
	network: &NetworkConfig,
) -> Result<Arc<dyn ChainClient>, ChainError> {
	let private_key = network.private_key.as_ref().ok_or_else(|| {
		ChainError::Configuration(format!("Network {} has no private_key", chain))
	})?;
	let signer: PrivateKeySigner = private_key.with_exposed(|key| {
		key.parse().map_err(|_| {
			ChainError::Configuration(format!("Invalid private key format for network {}", chain))
		})
	})?;

	Ok(Arc::new(AlloyChainClient::new(
		chain,
		&network.rpc_url,
		signer,
		network.native_usd,
	)?))
}
