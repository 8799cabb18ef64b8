//! One pass of the claim pipeline.
//!
//! discover -> admit rewards -> bundle -> encode -> admit bundles ->
//! idempotency -> ledger -> simulate -> execute -> quarantine -> ledger.

use super::{ClaimEngine, EngineError};
use crate::bundler::{group_by_key, merge_undersized, split_oversized, ChainGasEstimator, GasQuote};
use crate::policy::{Admission, Thresholds};
use claimer_types::{
	current_timestamp, truncate_id, Address, Chain, ClaimBundle, ClaimError, ExecutionRecord,
	LedgerKey, PendingReward, TxResult,
};
use std::collections::HashMap;
use tracing::instrument;

/// Volatility fed into market adjustment; no volatility source is wired in.
const MARKET_VOLATILITY: f64 = 0.0;

/// Per-stage counters of one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
	pub wallets_scanned: usize,
	pub wallets_quarantined: usize,
	pub integration_failures: usize,
	pub rewards_discovered: usize,
	pub rewards_synthetic_dropped: usize,
	pub rewards_rejected: usize,
	pub bundles_built: usize,
	pub bundles_unencodable: usize,
	pub bundles_rejected: usize,
	pub bundles_duplicate: usize,
	pub simulations_failed: usize,
	pub executed: usize,
	pub succeeded: usize,
	pub failed: usize,
	pub verified: usize,
	pub claimed_usd: f64,
	pub gas_usd: f64,
	pub ledger_failures: usize,
	/// Every recorded outcome, simulation failures included.
	pub results: Vec<TxResult>,
}

impl ClaimEngine {
	/// Runs one full cycle.
	///
	/// Failures of single integrations or bundles are counted in the report.
	/// An error is returned only when no integration could be scanned.
	#[instrument(skip_all, fields(claimer_id = %self.claimer_id))]
	pub async fn run_cycle(&self) -> Result<CycleReport, EngineError> {
		let mut report = CycleReport::default();
		let now = current_timestamp();

		let quotes = self.gas_quotes().await;
		let thresholds = self.chain_thresholds(&quotes);
		let estimator = ChainGasEstimator::new(&self.gas, quotes);

		let rewards = self.discover(&mut report).await?;
		let admitted = self.admit_rewards(rewards, &thresholds, now, &mut report);

		let bundles = group_by_key(admitted, &estimator);
		let bundles = split_oversized(bundles, self.policy.max_bundle_size, &estimator);
		let bundles = merge_undersized(bundles, self.policy.min_bundle_size, &estimator);
		report.bundles_built = bundles.len();

		let mut ready = Vec::new();
		for bundle in bundles {
			let bundle = match self.discovery.build_bundle(bundle).await {
				Ok(bundle) => bundle,
				Err(e) => {
					report.bundles_unencodable += 1;
					tracing::warn!(error = %e, "Failed to encode bundle");
					continue;
				},
			};

			let limits = thresholds
				.get(&bundle.chain)
				.copied()
				.unwrap_or(self.policy.thresholds);
			if let Admission::Rejected(reason) = self.policy.admit_bundle(&bundle, &limits) {
				report.bundles_rejected += 1;
				tracing::info!(
					bundle_id = %truncate_id(&bundle.id),
					chain = %bundle.chain,
					protocol = %bundle.protocol,
					%reason,
					"Bundle not admitted"
				);
				continue;
			}

			if self.idempotency.should_skip(&bundle).await {
				report.bundles_duplicate += 1;
				tracing::info!(bundle_id = %truncate_id(&bundle.id), "Skipping recently submitted bundle");
				continue;
			}
			if let Err(e) = self
				.storage
				.store(LedgerKey::Bundles.as_str(), &bundle.id, &bundle)
				.await
			{
				report.ledger_failures += 1;
				tracing::warn!(bundle_id = %truncate_id(&bundle.id), error = %e, "Failed to record bundle");
			}
			ready.push(bundle);
		}

		let simulation = self.simulator.dry_run_batch(&ready).await;
		report.simulations_failed = simulation.failed;

		for (bundle, outcome) in ready.iter().zip(&simulation.outcomes) {
			let result = if outcome.ok {
				if self.shutdown.is_cancelled() {
					tracing::info!(bundle_id = %truncate_id(&bundle.id), "Shutdown requested, not executing");
					continue;
				}
				report.executed += 1;
				self.executor.execute(bundle).await
			} else {
				let reason = outcome.reason.clone().unwrap_or_default();
				TxResult::failed(bundle, &ClaimError::SimulationFailed(reason))
			};

			self.settle(bundle, result, &mut report).await;
		}

		tracing::info!(
			discovered = report.rewards_discovered,
			bundles = report.bundles_built,
			executed = report.executed,
			succeeded = report.succeeded,
			failed = report.failed,
			claimed_usd = %claimer_types::utils::format_usd(report.claimed_usd),
			"Cycle complete"
		);
		Ok(report)
	}

	/// Current gas quote per configured chain. Chains that cannot be quoted
	/// are left out.
	async fn gas_quotes(&self) -> HashMap<Chain, GasQuote> {
		let mut quotes = HashMap::new();
		for chain in self.chains.chains() {
			let Some(client) = self.chains.get(chain) else {
				continue;
			};
			let quote = async {
				Ok::<_, claimer_chain::ChainError>(GasQuote {
					gas_price_wei: client.gas_price().await?,
					native_usd: client.native_usd().await?,
				})
			}
			.await;
			match quote {
				Ok(quote) => {
					quotes.insert(chain, quote);
				},
				Err(e) => tracing::warn!(chain = %chain, error = %e, "Failed to quote gas"),
			}
		}
		quotes
	}

	fn chain_thresholds(&self, quotes: &HashMap<Chain, GasQuote>) -> HashMap<Chain, Thresholds> {
		quotes
			.iter()
			.map(|(chain, quote)| {
				let adjusted = self
					.policy
					.adjust_for_market_conditions(quote.gas_price_gwei(), MARKET_VOLATILITY);
				(*chain, adjusted)
			})
			.collect()
	}

	/// Collects pending rewards from every integration, skipping quarantined
	/// wallets.
	async fn discover(&self, report: &mut CycleReport) -> Result<Vec<PendingReward>, EngineError> {
		let mut rewards = Vec::new();
		let integrations = self.discovery.integrations();

		for integration in &integrations {
			let protocol = integration.protocol();
			let wallets = match integration.discover_wallets().await {
				Ok(wallets) => wallets,
				Err(e) => {
					report.integration_failures += 1;
					tracing::warn!(protocol, error = %e, "Wallet discovery failed");
					continue;
				},
			};
			report.wallets_scanned += wallets.len();

			let mut active: Vec<Address> = Vec::with_capacity(wallets.len());
			for wallet in wallets {
				if self.quarantine.is_quarantined(&wallet).await {
					report.wallets_quarantined += 1;
				} else {
					active.push(wallet);
				}
			}

			match integration.get_pending_rewards(&active).await {
				Ok(found) => {
					tracing::debug!(protocol, rewards = found.len(), "Discovered rewards");
					rewards.extend(found);
				},
				Err(e) => {
					report.integration_failures += 1;
					tracing::warn!(protocol, error = %e, "Reward scan failed");
				},
			}
		}

		if !integrations.is_empty() && report.integration_failures == integrations.len() {
			return Err(EngineError::Service(format!(
				"All {} integrations failed",
				integrations.len()
			)));
		}
		report.rewards_discovered = rewards.len();
		Ok(rewards)
	}

	fn admit_rewards(
		&self,
		rewards: Vec<PendingReward>,
		thresholds: &HashMap<Chain, Thresholds>,
		now: u64,
		report: &mut CycleReport,
	) -> Vec<PendingReward> {
		rewards
			.into_iter()
			.filter(|reward| {
				if reward.is_synthetic && !self.mock_mode {
					report.rewards_synthetic_dropped += 1;
					return false;
				}
				let limits = thresholds
					.get(&reward.wallet.chain())
					.copied()
					.unwrap_or(self.policy.thresholds);
				match self.policy.admit_reward(reward, &limits, now) {
					Admission::Admitted => true,
					Admission::Rejected(reason) => {
						report.rewards_rejected += 1;
						tracing::debug!(%reason, "Reward not admitted");
						false
					},
				}
			})
			.collect()
	}

	/// Books one outcome: counters, quarantine and ledger.
	async fn settle(&self, bundle: &ClaimBundle, result: TxResult, report: &mut CycleReport) {
		if result.success {
			report.succeeded += 1;
			report.claimed_usd += result.claimed_usd;
			if result.verified_payout {
				report.verified += 1;
			}
		} else {
			report.failed += 1;
		}
		report.gas_usd += result.gas_usd;

		if result.is_chain_failure() {
			let reason = result.error.clone().unwrap_or_default();
			for wallet in bundle.wallets() {
				self.quarantine.quarantine(wallet, &reason).await;
			}
		}

		let record = ExecutionRecord {
			bundle: bundle.clone(),
			result: result.clone(),
			recorded_at: current_timestamp(),
		};
		if let Err(e) = self
			.storage
			.store(LedgerKey::Executions.as_str(), &bundle.id, &record)
			.await
		{
			report.ledger_failures += 1;
			tracing::warn!(bundle_id = %truncate_id(&bundle.id), error = %e, "Failed to record execution");
		}
		report.results.push(result);
	}
}

#[cfg(test)]
mod tests {
	use crate::builder::EngineBuilder;
	use crate::engine::ClaimEngine;
	use alloy_primitives::U256;
	use async_trait::async_trait;
	use claimer_chain::implementations::mock::MockChainClient;
	use claimer_chain::{ChainClient, ChainService};
	use claimer_config::{ConfigBuilder, PolicyConfig};
	use claimer_discovery::{DiscoveryError, DiscoveryService, Integration};
	use claimer_storage::implementations::memory::MemoryStorage;
	use claimer_storage::StorageService;
	use claimer_types::{
		Address, Chain, ClaimBundle, ClaimErrorKind, ExecutionRecord, LedgerKey, PendingReward,
	};
	use std::collections::HashMap;
	use std::sync::Arc;

	const RECIPIENT: &str = "0x8ba1f109551bd432803012645ac136ddd64dba72";

	/// Integration returning a fixed reward list.
	struct StaticIntegration {
		rewards: Vec<PendingReward>,
		fail: bool,
	}

	#[async_trait]
	impl Integration for StaticIntegration {
		fn protocol(&self) -> &str {
			"p"
		}

		async fn discover_wallets(&self) -> Result<Vec<Address>, DiscoveryError> {
			if self.fail {
				return Err(DiscoveryError::Connection("unreachable".into()));
			}
			let mut wallets: Vec<Address> = self.rewards.iter().map(|r| r.wallet.clone()).collect();
			wallets.dedup();
			Ok(wallets)
		}

		async fn get_pending_rewards(
			&self,
			wallets: &[Address],
		) -> Result<Vec<PendingReward>, DiscoveryError> {
			Ok(self
				.rewards
				.iter()
				.filter(|r| wallets.contains(&r.wallet))
				.cloned()
				.collect())
		}

		async fn build_bundle(&self, bundle: ClaimBundle) -> Result<ClaimBundle, DiscoveryError> {
			let contract = Address::new("0x00000000000000000000000000000000000d1570", bundle.chain);
			Ok(bundle.with_transaction(contract, Default::default(), U256::ZERO))
		}
	}

	fn reward(id: &str, wallet: &str, usd: f64) -> PendingReward {
		let chain = Chain::Base;
		PendingReward {
			id: id.into(),
			wallet: Address::new(wallet, chain),
			protocol: "p".into(),
			token: Address::new("0x00000000000000000000000000000000000000b1", chain),
			amount_wei: U256::from((usd * 1e18) as u128),
			amount_usd: usd,
			claim_to: Address::new(RECIPIENT, chain),
			discovered_at: 0,
			last_claim_at: None,
			est_gas_limit: None,
			is_synthetic: false,
		}
	}

	fn scenario() -> Vec<PendingReward> {
		let wallet = "0x00000000000000000000000000000000000000a1";
		vec![
			reward("1", wallet, 0.6),
			reward("2", wallet, 0.7),
			reward("3", wallet, 0.8),
		]
	}

	/// Gas price chosen so the three-item bundle costs exactly $0.30.
	fn base_client() -> MockChainClient {
		// (60_000 + 3 * 35_000) gas * price / 1e18 * $3000 = $0.30
		MockChainClient::new(Chain::Base, 3000.0).with_gas_price(606_060_606)
	}

	fn engine(
		rewards: Vec<PendingReward>,
		client: MockChainClient,
		mock_mode: bool,
	) -> (ClaimEngine, Arc<StorageService>) {
		let config = ConfigBuilder::new()
			.mock_mode(mock_mode)
			.policy(PolicyConfig {
				min_bundle_size: 1,
				..PolicyConfig::default()
			})
			.build();

		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let mut clients: HashMap<Chain, Arc<dyn ChainClient>> = HashMap::new();
		clients.insert(Chain::Base, Arc::new(client));
		let integration: Arc<dyn Integration> = Arc::new(StaticIntegration {
			rewards,
			fail: false,
		});

		let engine = EngineBuilder::new(config)
			.with_storage(storage.clone())
			.with_chains(Arc::new(ChainService::new(clients)))
			.with_discovery(Arc::new(DiscoveryService::new(vec![integration])))
			.build_with_services()
			.unwrap();
		(engine, storage)
	}

	#[tokio::test]
	async fn test_end_to_end_mock_cycle() {
		let (engine, storage) = engine(scenario(), base_client(), true);
		let report = engine.run_cycle().await.unwrap();

		assert_eq!(report.rewards_discovered, 3);
		assert_eq!(report.bundles_built, 1);
		assert_eq!(report.executed, 1);
		assert_eq!(report.succeeded, 1);

		let result = &report.results[0];
		assert!(result.success);
		assert!(result.verified_payout);
		assert!((result.claimed_usd - 2.1).abs() < 1e-6);

		let record: ExecutionRecord = storage
			.retrieve(LedgerKey::Executions.as_str(), &result.bundle_id)
			.await
			.unwrap();
		assert!((record.bundle.total_usd - 2.1).abs() < 1e-9);
		assert!((record.bundle.est_gas_usd - 0.3).abs() < 1e-6);
		assert!((record.bundle.net_usd - 1.8).abs() < 1e-6);
		assert!(storage
			.exists(LedgerKey::Bundles.as_str(), &result.bundle_id)
			.await
			.unwrap());
	}

	#[tokio::test]
	async fn test_below_threshold_reward_produces_no_bundle() {
		let rewards = vec![reward("1", "0x00000000000000000000000000000000000000a1", 0.05)];
		let (engine, _) = engine(rewards, base_client(), true);
		let report = engine.run_cycle().await.unwrap();

		assert_eq!(report.rewards_discovered, 1);
		assert_eq!(report.rewards_rejected, 1);
		assert_eq!(report.bundles_built, 0);
		assert!(report.results.is_empty());
	}

	#[tokio::test]
	async fn test_identical_bundle_is_not_resubmitted() {
		let (engine, _) = engine(scenario(), base_client(), true);
		let first = engine.run_cycle().await.unwrap();
		let second = engine.run_cycle().await.unwrap();

		assert_eq!(first.executed, 1);
		assert_eq!(second.bundles_duplicate, 1);
		assert_eq!(second.executed, 0);
	}

	#[tokio::test]
	async fn test_simulation_failure_quarantines_wallets() {
		let (engine, _) = engine(scenario(), base_client().with_revert("already claimed"), true);
		let first = engine.run_cycle().await.unwrap();

		assert_eq!(first.simulations_failed, 1);
		assert_eq!(first.executed, 0);
		assert_eq!(first.results[0].error_kind, Some(ClaimErrorKind::SimulationFailed));

		let wallet = Address::new("0x00000000000000000000000000000000000000a1", Chain::Base);
		assert!(engine.quarantine().is_quarantined(&wallet).await);

		let second = engine.run_cycle().await.unwrap();
		assert_eq!(second.wallets_quarantined, 1);
		assert_eq!(second.rewards_discovered, 0);
	}

	#[tokio::test]
	async fn test_synthetic_rewards_dropped_outside_mock_mode() {
		let mut rewards = scenario();
		for reward in &mut rewards {
			reward.is_synthetic = true;
		}
		let (engine, _) = engine(rewards, base_client(), false);
		let report = engine.run_cycle().await.unwrap();
		assert_eq!(report.rewards_synthetic_dropped, 3);
		assert_eq!(report.bundles_built, 0);
	}

	#[tokio::test]
	async fn test_all_integrations_failing_fails_the_cycle() {
		let config = ConfigBuilder::new().build();
		let integration: Arc<dyn Integration> = Arc::new(StaticIntegration {
			rewards: Vec::new(),
			fail: true,
		});
		let engine = EngineBuilder::new(config)
			.with_storage(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
			.with_chains(Arc::new(ChainService::default()))
			.with_discovery(Arc::new(DiscoveryService::new(vec![integration])))
			.build_with_services()
			.unwrap();
		assert!(engine.run_cycle().await.is_err());
	}
}
