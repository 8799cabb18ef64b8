//! Chain access for the dust claimer.
//!
//! Each supported chain is served by one [`ChainClient`]. The pipeline never
//! inspects chain specifics: it asks for gas prices, dry-runs bundles and
//! sends them, and gets receipts back in the shared transaction types.

use alloy_primitives::Bytes;
use async_trait::async_trait;
use claimer_config::NetworkConfig;
use claimer_types::{Address, Chain, ClaimBundle, Retryable, SendReceipt, SimulationResult};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
	pub mod mock;
}

/// Errors that can occur while talking to a chain.
#[derive(Debug, Error)]
pub enum ChainError {
	/// Transport failure; worth retrying.
	#[error("Network error: {0}")]
	Network(String),
	/// The chain rejected the transaction.
	#[error("Transaction reverted: {0}")]
	Reverted(String),
	/// Broadcast, but no receipt was obtained. Resending would double-spend.
	#[error("Transaction {tx_hash} unconfirmed: {message}")]
	Unconfirmed { tx_hash: String, message: String },
	/// The bundle cannot be turned into a transaction.
	#[error("Invalid transaction: {0}")]
	InvalidTransaction(String),
	#[error("No client configured for chain: {0}")]
	NoClient(Chain),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl Retryable for ChainError {
	fn is_retryable(&self) -> bool {
		matches!(self, ChainError::Network(_))
	}
}

/// Interface to a single chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
	/// The chain this client serves.
	fn chain(&self) -> Chain;

	/// Current gas price in wei.
	async fn gas_price(&self) -> Result<u128, ChainError>;

	/// USD price of the native gas token.
	async fn native_usd(&self) -> Result<f64, ChainError>;

	/// Dry-runs the bundle's claim transaction without committing gas.
	///
	/// A predicted revert is reported in the result, not as an error.
	async fn simulate(&self, bundle: &ClaimBundle) -> Result<SimulationResult, ChainError>;

	/// Signs and sends the bundle's claim transaction and waits for its receipt.
	async fn send_raw(&self, bundle: &ClaimBundle) -> Result<SendReceipt, ChainError>;

	/// Returns the deployed bytecode at `address`.
	async fn get_code(&self, _address: &Address) -> Result<Bytes, ChainError> {
		Ok(Bytes::new())
	}
}

/// Type alias for chain client factory functions.
pub type ChainFactory = fn(Chain, &NetworkConfig) -> Result<Arc<dyn ChainClient>, ChainError>;

/// Get all registered chain client implementations.
///
/// `evm` talks to real nodes; `mock` synthesizes every interaction.
pub fn get_all_implementations() -> Vec<(&'static str, ChainFactory)> {
	use implementations::{evm::alloy, mock};

	vec![
		(alloy::NAME, alloy::create_client as ChainFactory),
		(mock::NAME, mock::create_client as ChainFactory),
	]
}

/// Chain clients keyed by chain.
#[derive(Clone, Default)]
pub struct ChainService {
	clients: HashMap<Chain, Arc<dyn ChainClient>>,
}

impl ChainService {
	pub fn new(clients: HashMap<Chain, Arc<dyn ChainClient>>) -> Self {
		Self { clients }
	}

	/// Builds one client per configured network with `factory`.
	pub fn from_networks<'a>(
		networks: impl IntoIterator<Item = (&'a Chain, &'a NetworkConfig)>,
		factory: ChainFactory,
	) -> Result<Self, ChainError> {
		let mut clients = HashMap::new();
		for (chain, network) in networks {
			let client = factory(*chain, network)?;
			tracing::info!(chain = %chain, "Loaded chain client");
			clients.insert(*chain, client);
		}
		Ok(Self { clients })
	}

	/// Returns the client for `chain`, if configured.
	pub fn get(&self, chain: Chain) -> Option<&Arc<dyn ChainClient>> {
		self.clients.get(&chain)
	}

	/// Returns the client for `chain` or [`ChainError::NoClient`].
	pub fn client(&self, chain: Chain) -> Result<&Arc<dyn ChainClient>, ChainError> {
		self.clients.get(&chain).ok_or(ChainError::NoClient(chain))
	}

	pub fn chains(&self) -> impl Iterator<Item = Chain> + '_ {
		self.clients.keys().copied()
	}

	pub fn is_empty(&self) -> bool {
		self.clients.is_empty()
	}
}
