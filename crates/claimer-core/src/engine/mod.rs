//! The claim engine.
//!
//! Owns every pipeline component and the shared idempotency and quarantine
//! state. One cycle runs at a time, driven by the [`Scheduler`].

pub mod cycle;

use crate::executor::Executor;
use crate::idempotency::IdempotencyGuard;
use crate::policy::Policy;
use crate::retry::Quarantine;
use crate::scheduler::{Scheduler, SchedulerStats, TickError};
use crate::simulator::Simulator;
use claimer_chain::ChainService;
use claimer_config::GasConfig;
use claimer_discovery::DiscoveryService;
use claimer_pricing::PricingService;
use claimer_storage::StorageService;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use cycle::CycleReport;

/// Errors that end a cycle early.
///
/// Per-bundle failures are never reported here; they are part of the
/// [`CycleReport`].
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

/// Main claimer engine.
pub struct ClaimEngine {
	pub(crate) claimer_id: String,
	pub(crate) policy: Policy,
	pub(crate) gas: GasConfig,
	pub(crate) mock_mode: bool,
	pub(crate) discovery: Arc<DiscoveryService>,
	pub(crate) chains: Arc<ChainService>,
	pub(crate) storage: Arc<StorageService>,
	pub(crate) idempotency: Arc<IdempotencyGuard>,
	pub(crate) quarantine: Arc<Quarantine>,
	pub(crate) simulator: Simulator,
	pub(crate) executor: Executor,
	pub(crate) cleanup_interval: Duration,
	pub(crate) shutdown: CancellationToken,
}

impl ClaimEngine {
	/// Assembles an engine from ready services.
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		claimer_id: String,
		policy: Policy,
		gas: GasConfig,
		mock_mode: bool,
		discovery: Arc<DiscoveryService>,
		chains: Arc<ChainService>,
		storage: Arc<StorageService>,
		pricing: Option<Arc<PricingService>>,
		recipients: claimer_types::RecipientAllowList,
		cleanup_interval: Duration,
		shutdown: CancellationToken,
	) -> Self {
		let executor = Executor::new(
			chains.clone(),
			recipients,
			pricing,
			policy.retry,
			mock_mode,
			shutdown.clone(),
		);

		Self {
			claimer_id,
			idempotency: Arc::new(IdempotencyGuard::new(policy.idempotency_ttl)),
			quarantine: Arc::new(Quarantine::new(policy.quarantine_ttl)),
			simulator: Simulator::new(chains.clone()),
			executor,
			policy,
			gas,
			mock_mode,
			discovery,
			chains,
			storage,
			cleanup_interval,
			shutdown,
		}
	}

	pub fn policy(&self) -> &Policy {
		&self.policy
	}

	pub fn mock_mode(&self) -> bool {
		self.mock_mode
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn quarantine(&self) -> &Arc<Quarantine> {
		&self.quarantine
	}

	/// Token that stops [`ClaimEngine::run`] and interrupts retry backoff.
	pub fn shutdown_token(&self) -> CancellationToken {
		self.shutdown.clone()
	}

	/// Runs cycles until the shutdown token is cancelled.
	pub async fn run(&self) -> SchedulerStats {
		tracing::info!(
			claimer_id = %self.claimer_id,
			mock_mode = self.mock_mode,
			integrations = self.discovery.len(),
			"Starting claim engine"
		);

		let cleanup_handle = self.spawn_ledger_cleanup();
		let scheduler = Scheduler::new(self.policy.schedule, self.shutdown.clone());

		let stats = scheduler
			.run(|| async {
				match self.run_cycle().await {
					Ok(_) => Ok(()),
					Err(EngineError::Config(reason)) => Err(TickError::Fatal(reason)),
					Err(EngineError::Service(reason)) => Err(TickError::Failed(reason)),
				}
			})
			.await;

		cleanup_handle.abort();
		tracing::info!(claimer_id = %self.claimer_id, "Claim engine stopped");
		stats
	}

	/// Periodically drops expired ledger entries and quarantine records.
	fn spawn_ledger_cleanup(&self) -> tokio::task::JoinHandle<()> {
		let storage = self.storage.clone();
		let quarantine = self.quarantine.clone();
		let shutdown = self.shutdown.clone();
		let period = self.cleanup_interval.max(Duration::from_secs(1));

		tokio::spawn(async move {
			let mut interval = tokio::time::interval(period);
			loop {
				tokio::select! {
					_ = shutdown.cancelled() => break,
					_ = interval.tick() => {}
				}
				match storage.cleanup_expired().await {
					Ok(count) if count > 0 => {
						tracing::debug!("Ledger cleanup: removed {} expired entries", count);
					},
					Err(e) => {
						tracing::warn!("Ledger cleanup failed: {}", e);
					},
					_ => {},
				}
				let released = quarantine.sweep().await;
				if released > 0 {
					tracing::debug!("Quarantine sweep: released {} wallets", released);
				}
			}
		})
	}
}
