//! Dry-runs bundles before any gas is spent.

use claimer_chain::ChainService;
use claimer_types::{truncate_id, ClaimBundle};
use futures::future::join_all;
use std::sync::Arc;
use tracing::instrument;

/// Normalized dry-run result for one bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutcome {
	pub bundle_id: String,
	pub ok: bool,
	/// Human-readable cause when `ok` is false.
	pub reason: Option<String>,
	pub gas_estimate: Option<u64>,
}

/// Aggregate of a concurrent batch of dry-runs, in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchSimulation {
	pub succeeded: usize,
	pub failed: usize,
	pub outcomes: Vec<SimulationOutcome>,
	/// `(bundle_id, reason)` of every failure.
	pub failures: Vec<(String, String)>,
}

/// Runs bundle simulations against the configured chain clients.
pub struct Simulator {
	chains: Arc<ChainService>,
}

impl Simulator {
	pub fn new(chains: Arc<ChainService>) -> Self {
		Self { chains }
	}

	/// Dry-runs `bundle`. A missing client fails closed.
	#[instrument(skip_all, fields(bundle_id = %truncate_id(&bundle.id), chain = %bundle.chain))]
	pub async fn dry_run(&self, bundle: &ClaimBundle) -> SimulationOutcome {
		let failed = |reason: String| SimulationOutcome {
			bundle_id: bundle.id.clone(),
			ok: false,
			reason: Some(reason),
			gas_estimate: None,
		};

		let client = match self.chains.client(bundle.chain) {
			Ok(client) => client,
			Err(e) => return failed(e.to_string()),
		};

		match client.simulate(bundle).await {
			Ok(result) if result.success => SimulationOutcome {
				bundle_id: bundle.id.clone(),
				ok: true,
				reason: None,
				gas_estimate: result.gas_estimate,
			},
			Ok(result) => failed(
				result
					.revert_reason
					.unwrap_or_else(|| "Simulation reverted without a reason".to_string()),
			),
			Err(e) => failed(format!("Simulation error: {}", e)),
		}
	}

	/// Dry-runs every bundle concurrently.
	pub async fn dry_run_batch(&self, bundles: &[ClaimBundle]) -> BatchSimulation {
		let outcomes = join_all(bundles.iter().map(|bundle| self.dry_run(bundle))).await;

		let mut batch = BatchSimulation::default();
		for outcome in &outcomes {
			if outcome.ok {
				batch.succeeded += 1;
			} else {
				batch.failed += 1;
				let reason = outcome.reason.clone().unwrap_or_default();
				tracing::info!(
					bundle_id = %truncate_id(&outcome.bundle_id),
					%reason,
					"Simulation failed, skipping bundle"
				);
				batch.failures.push((outcome.bundle_id.clone(), reason));
			}
		}
		batch.outcomes = outcomes;
		batch
	}
}
