//! Bundle execution.
//!
//! Outside mock mode a bundle must pass the recipient safety gate before any
//! chain interaction. Chain errors never escape: every outcome, including a
//! refusal, is reported as a [`TxResult`].

use crate::policy::RetryPolicy;
use crate::retry::with_backoff_cancellable;
use crate::verifier::verify_payout;
use claimer_chain::{ChainError, ChainService};
use claimer_pricing::PricingService;
use claimer_types::{
	truncate_id, ClaimBundle, ClaimError, ClaimErrorKind, RecipientAllowList, Retryable, TxResult,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Sends claim transactions and checks what they paid out.
pub struct Executor {
	chains: Arc<ChainService>,
	recipients: RecipientAllowList,
	pricing: Option<Arc<PricingService>>,
	retry: RetryPolicy,
	mock_mode: bool,
	shutdown: CancellationToken,
}

impl Executor {
	pub fn new(
		chains: Arc<ChainService>,
		recipients: RecipientAllowList,
		pricing: Option<Arc<PricingService>>,
		retry: RetryPolicy,
		mock_mode: bool,
		shutdown: CancellationToken,
	) -> Self {
		Self {
			chains,
			recipients,
			pricing,
			retry,
			mock_mode,
			shutdown,
		}
	}

	pub fn mock_mode(&self) -> bool {
		self.mock_mode
	}

	/// Fails closed on any recipient or data problem outside mock mode.
	fn safety_gate(&self, bundle: &ClaimBundle) -> Result<(), ClaimError> {
		if self.mock_mode {
			return Ok(());
		}
		self.recipients
			.check(&bundle.claim_to)
			.map_err(|violation| ClaimError::SafetyRejected(violation.to_string()))?;
		if let Some(item) = bundle.items.iter().find(|item| item.is_synthetic) {
			return Err(ClaimError::SafetyRejected(format!(
				"Refusing synthetic reward {} outside mock mode",
				item.id
			)));
		}
		Ok(())
	}

	/// Executes `bundle` and reports the outcome.
	#[instrument(skip_all, fields(bundle_id = %truncate_id(&bundle.id), chain = %bundle.chain, protocol = %bundle.protocol))]
	pub async fn execute(&self, bundle: &ClaimBundle) -> TxResult {
		if let Err(error) = self.safety_gate(bundle) {
			tracing::error!(claim_to = %bundle.claim_to, error = %error, "Safety gate rejected bundle");
			return TxResult::failed(bundle, &error);
		}

		let client = match self.chains.client(bundle.chain) {
			Ok(client) => client,
			Err(e) => {
				return TxResult::failed(
					bundle,
					&ClaimError::ExecutionFailed {
						message: e.to_string(),
						retryable: false,
					},
				)
			},
		};

		let receipt = match with_backoff_cancellable(
			|| client.send_raw(bundle),
			&self.retry,
			&self.shutdown,
		)
		.await
		{
			Ok(receipt) => receipt,
			Err(ChainError::Unconfirmed { tx_hash, message }) => {
				let error = ClaimError::VerificationFailed(format!(
					"Transaction {} broadcast without receipt: {}",
					truncate_id(&tx_hash),
					message
				));
				tracing::warn!(tx_hash = %truncate_id(&tx_hash), error = %error, "Claim transaction unconfirmed");
				let mut result = TxResult::failed(bundle, &error);
				result.tx_hash = Some(tx_hash);
				return result;
			},
			Err(e) => {
				tracing::warn!(error = %e, "Claim transaction failed");
				return TxResult::failed(
					bundle,
					&ClaimError::ExecutionFailed {
						message: e.to_string(),
						retryable: e.is_retryable(),
					},
				);
			},
		};

		let mut result = TxResult {
			bundle_id: bundle.id.clone(),
			success: receipt.success,
			tx_hash: Some(receipt.tx_hash.clone()),
			error: None,
			error_kind: None,
			gas_used: receipt.gas_used,
			gas_usd: receipt.gas_usd,
			claimed_usd: 0.0,
			chain: bundle.chain,
			verified_payout: false,
		};

		if !receipt.success {
			let error = ClaimError::ExecutionFailed {
				message: format!("Transaction {} reverted", truncate_id(&receipt.tx_hash)),
				retryable: false,
			};
			tracing::warn!(tx_hash = %truncate_id(&receipt.tx_hash), "Claim transaction reverted");
			result.error = Some(error.to_string());
			result.error_kind = Some(error.kind());
			return result;
		}

		result.claimed_usd = bundle.total_usd;
		if self.mock_mode {
			result.verified_payout = true;
		} else if !receipt.logs.is_empty() {
			let verification = verify_payout(
				bundle.chain,
				&receipt.tx_hash,
				&receipt.logs,
				&bundle.claim_to,
				self.pricing.as_deref(),
			)
			.await;

			if verification.verified {
				result.verified_payout = true;
				if let Some(total_usd) = verification.total_usd {
					result.claimed_usd = total_usd;
				}
			} else {
				let error = ClaimError::VerificationFailed(verification.error.unwrap_or_default());
				tracing::warn!(error = %error, "Payout not verified");
				result.error = Some(error.to_string());
				result.error_kind = Some(ClaimErrorKind::VerificationFailed);
			}
		}

		tracing::info!(
			tx_hash = %truncate_id(&receipt.tx_hash),
			claimed_usd = %claimer_types::utils::format_usd(result.claimed_usd),
			verified = result.verified_payout,
			"Claim executed"
		);
		result
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{Bytes, U256};
	use async_trait::async_trait;
	use claimer_chain::implementations::mock::MockChainClient;
	use claimer_chain::ChainClient;
	use claimer_types::{
		Address, Chain, PendingReward, SendReceipt, SimulationResult,
	};
	use std::collections::HashMap;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::time::Duration;

	const RECIPIENT: &str = "0x8ba1f109551bd432803012645ac136ddd64dba72";
	const ZERO: &str = "0x0000000000000000000000000000000000000000";

	fn bundle(chain: Chain, claim_to: &str, amounts: &[f64]) -> ClaimBundle {
		let items: Vec<_> = amounts
			.iter()
			.enumerate()
			.map(|(i, usd)| PendingReward {
				id: format!("r-{}", i),
				wallet: Address::new(format!("0x{:0>40}", i + 1), chain),
				protocol: "p".into(),
				token: Address::new("0x00000000000000000000000000000000000000b1", chain),
				amount_wei: U256::from((usd * 1e18) as u128),
				amount_usd: *usd,
				claim_to: Address::new(claim_to, chain),
				discovered_at: 0,
				last_claim_at: None,
				est_gas_limit: None,
				is_synthetic: false,
			})
			.collect();
		ClaimBundle::new(items[0].bundle_key(), items, 0.3)
	}

	fn recipients() -> RecipientAllowList {
		let mut recipients = HashMap::new();
		recipients.insert(Chain::Base, Address::new(RECIPIENT, Chain::Base));
		RecipientAllowList::new(recipients)
	}

	fn executor(client: Arc<dyn ChainClient>, mock_mode: bool) -> Executor {
		let mut clients = HashMap::new();
		clients.insert(client.chain(), client);
		Executor::new(
			Arc::new(ChainService::new(clients)),
			recipients(),
			None,
			RetryPolicy {
				max_attempts: 3,
				base_delay: Duration::from_millis(10),
			},
			mock_mode,
			CancellationToken::new(),
		)
	}

	fn mock_client() -> Arc<dyn ChainClient> {
		Arc::new(MockChainClient::new(Chain::Base, 3000.0))
	}

	/// Fails with a network error a fixed number of times, then delegates.
	struct FlakyClient {
		inner: MockChainClient,
		failures: u32,
		sends: AtomicU32,
	}

	#[async_trait]
	impl ChainClient for FlakyClient {
		fn chain(&self) -> Chain {
			self.inner.chain()
		}

		async fn gas_price(&self) -> Result<u128, ChainError> {
			self.inner.gas_price().await
		}

		async fn native_usd(&self) -> Result<f64, ChainError> {
			self.inner.native_usd().await
		}

		async fn simulate(&self, bundle: &ClaimBundle) -> Result<SimulationResult, ChainError> {
			self.inner.simulate(bundle).await
		}

		async fn send_raw(&self, bundle: &ClaimBundle) -> Result<SendReceipt, ChainError> {
			let n = self.sends.fetch_add(1, Ordering::SeqCst);
			if n < self.failures {
				return Err(ChainError::Network("connection reset".into()));
			}
			let mut receipt = self.inner.send_raw(bundle).await?;
			receipt.logs.clear();
			Ok(receipt)
		}

		async fn get_code(&self, _address: &Address) -> Result<Bytes, ChainError> {
			Ok(Bytes::new())
		}
	}

	/// Broadcasts once, then loses track of the receipt.
	struct UnconfirmedClient {
		inner: MockChainClient,
		sends: AtomicU32,
	}

	#[async_trait]
	impl ChainClient for UnconfirmedClient {
		fn chain(&self) -> Chain {
			self.inner.chain()
		}

		async fn gas_price(&self) -> Result<u128, ChainError> {
			self.inner.gas_price().await
		}

		async fn native_usd(&self) -> Result<f64, ChainError> {
			self.inner.native_usd().await
		}

		async fn simulate(&self, bundle: &ClaimBundle) -> Result<SimulationResult, ChainError> {
			self.inner.simulate(bundle).await
		}

		async fn send_raw(&self, _bundle: &ClaimBundle) -> Result<SendReceipt, ChainError> {
			self.sends.fetch_add(1, Ordering::SeqCst);
			Err(ChainError::Unconfirmed {
				tx_hash: "0xfeedbeef".into(),
				message: "Failed to get receipt: request timed out".into(),
			})
		}
	}

	/// Mines the claim but routes every transfer to another address.
	struct DivertingClient {
		inner: MockChainClient,
	}

	#[async_trait]
	impl ChainClient for DivertingClient {
		fn chain(&self) -> Chain {
			self.inner.chain()
		}

		async fn gas_price(&self) -> Result<u128, ChainError> {
			self.inner.gas_price().await
		}

		async fn native_usd(&self) -> Result<f64, ChainError> {
			self.inner.native_usd().await
		}

		async fn simulate(&self, bundle: &ClaimBundle) -> Result<SimulationResult, ChainError> {
			self.inner.simulate(bundle).await
		}

		async fn send_raw(&self, bundle: &ClaimBundle) -> Result<SendReceipt, ChainError> {
			let mut receipt = self.inner.send_raw(bundle).await?;
			let elsewhere = alloy_primitives::Address::repeat_byte(0xf1).into_word();
			for log in &mut receipt.logs {
				log.topics[2] = elsewhere;
			}
			Ok(receipt)
		}
	}

	#[tokio::test]
	async fn test_placeholder_recipient_rejected_outside_mock_mode() {
		let placeholder = bundle(Chain::Base, ZERO, &[0.6, 0.7, 0.8]);

		let result = executor(mock_client(), false).execute(&placeholder).await;
		assert!(!result.success);
		assert!(!result.verified_payout);
		assert!(result.tx_hash.is_none());
		assert!(result.error.unwrap().contains("placeholder"));
		assert_eq!(result.error_kind, Some(ClaimErrorKind::SafetyRejected));

		let result = executor(mock_client(), true).execute(&placeholder).await;
		assert!(result.success);
	}

	#[tokio::test]
	async fn test_foreign_recipient_rejected() {
		let foreign = bundle(
			Chain::Base,
			"0x00000000000000000000000000000000000000f1",
			&[1.0],
		);
		let result = executor(mock_client(), false).execute(&foreign).await;
		assert_eq!(result.error_kind, Some(ClaimErrorKind::SafetyRejected));
	}

	#[tokio::test]
	async fn test_synthetic_rewards_rejected_outside_mock_mode() {
		let mut synthetic = bundle(Chain::Base, RECIPIENT, &[1.0]);
		synthetic.items[0].is_synthetic = true;
		let result = executor(mock_client(), false).execute(&synthetic).await;
		assert_eq!(result.error_kind, Some(ClaimErrorKind::SafetyRejected));
	}

	#[tokio::test]
	async fn test_mock_mode_is_trivially_verified() {
		let result = executor(mock_client(), true)
			.execute(&bundle(Chain::Base, RECIPIENT, &[0.6, 0.7, 0.8]))
			.await;
		assert!(result.success);
		assert!(result.verified_payout);
		assert!((result.claimed_usd - 2.1).abs() < 1e-9);
		assert!(result.tx_hash.is_some());
	}

	#[tokio::test]
	async fn test_receipt_logs_verify_payout() {
		let result = executor(mock_client(), false)
			.execute(&bundle(Chain::Base, RECIPIENT, &[1.0, 2.0]))
			.await;
		assert!(result.success);
		assert!(result.verified_payout);
		assert!(result.error.is_none());
		// No pricing service, so the declared value stands
		assert!((result.claimed_usd - 3.0).abs() < 1e-9);
	}

	#[tokio::test]
	async fn test_missing_client() {
		let result = executor(mock_client(), true)
			.execute(&bundle(Chain::Arbitrum, RECIPIENT, &[1.0]))
			.await;
		assert!(!result.success);
		assert_eq!(
			result.error.as_deref(),
			Some("Execution failed: No client configured for chain: arbitrum")
		);
		assert_eq!(result.claimed_usd, 0.0);
	}

	#[tokio::test]
	async fn test_revert_is_reported_not_propagated() {
		let reverting = Arc::new(MockChainClient::new(Chain::Base, 3000.0).with_revert("paused"));
		let result = executor(reverting, true)
			.execute(&bundle(Chain::Base, RECIPIENT, &[1.0]))
			.await;
		assert!(!result.success);
		assert!(result.is_chain_failure());
		assert!(result.error.unwrap().contains("paused"));
	}

	#[tokio::test(start_paused = true)]
	async fn test_transient_send_failures_are_retried() {
		let flaky = Arc::new(FlakyClient {
			inner: MockChainClient::new(Chain::Base, 3000.0),
			failures: 2,
			sends: AtomicU32::new(0),
		});
		let result = executor(flaky.clone(), false)
			.execute(&bundle(Chain::Base, RECIPIENT, &[1.0]))
			.await;
		assert!(result.success);
		assert_eq!(flaky.sends.load(Ordering::SeqCst), 3);
		// Receipt without logs stays unverified
		assert!(!result.verified_payout);
	}

	#[tokio::test(start_paused = true)]
	async fn test_unconfirmed_send_is_not_resent() {
		let client = Arc::new(UnconfirmedClient {
			inner: MockChainClient::new(Chain::Base, 3000.0),
			sends: AtomicU32::new(0),
		});
		let result = executor(client.clone(), false)
			.execute(&bundle(Chain::Base, RECIPIENT, &[1.0]))
			.await;

		assert_eq!(client.sends.load(Ordering::SeqCst), 1);
		assert!(!result.success);
		assert_eq!(result.tx_hash.as_deref(), Some("0xfeedbeef"));
		assert_eq!(result.error_kind, Some(ClaimErrorKind::VerificationFailed));
		assert!(!result.is_chain_failure());
	}

	#[tokio::test]
	async fn test_payout_to_other_address_is_unverified() {
		let client = Arc::new(DivertingClient {
			inner: MockChainClient::new(Chain::Base, 3000.0),
		});
		let result = executor(client, false)
			.execute(&bundle(Chain::Base, RECIPIENT, &[1.0, 2.0]))
			.await;

		assert!(result.success);
		assert!(!result.verified_payout);
		assert_eq!(result.error_kind, Some(ClaimErrorKind::VerificationFailed));
		assert!(result.error.as_ref().unwrap().contains("No transfer to"));
		assert!(!result.is_chain_failure());
	}
}
