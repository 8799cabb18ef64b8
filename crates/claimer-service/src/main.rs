//! Main entry point for the dust claimer service.
//!
//! Loads configuration, builds the claim engine from every registered
//! implementation and runs claim cycles until interrupted. `--once` runs a
//! single cycle and exits, which is how the pipeline is exercised by hand.

use clap::Parser;
use claimer_config::Config;
use claimer_core::{default_factories, ClaimEngine, CycleReport, EngineBuilder};
use claimer_types::utils::format_usd;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Command-line arguments for the claimer service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	/// Force mock mode regardless of configuration
	#[arg(long, env = "CLAIMER_MOCK_MODE")]
	mock: bool,

	/// Run a single cycle and exit
	#[arg(long)]
	once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started claimer");

	let config = load_config(&args.config, args.mock).await?;
	tracing::info!(
		"Loaded configuration [{}] (mock_mode: {})",
		config.claimer.id,
		config.claimer.mock_mode
	);

	let shutdown = CancellationToken::new();
	let engine = build_engine(config, shutdown.clone())?;

	if args.once {
		let report = engine.run_cycle().await?;
		log_report(&report);
	} else {
		tokio::spawn(wait_for_signal(shutdown));
		let stats = engine.run().await;
		tracing::info!(
			ticks = stats.ticks,
			succeeded = stats.succeeded,
			failed = stats.failed,
			timed_out = stats.timed_out,
			"Scheduler finished"
		);
	}

	tracing::info!("Stopped claimer");
	Ok(())
}

/// Loads configuration, optionally forcing mock mode on.
async fn load_config(path: &Path, force_mock: bool) -> Result<Config, Box<dyn std::error::Error>> {
	let path = path
		.to_str()
		.ok_or_else(|| format!("Configuration path is not valid UTF-8: {}", path.display()))?;
	let mut config = Config::from_file(path).await?;
	if force_mock {
		config.claimer.mock_mode = true;
	}
	Ok(config)
}

fn build_engine(
	config: Config,
	shutdown: CancellationToken,
) -> Result<ClaimEngine, Box<dyn std::error::Error>> {
	Ok(EngineBuilder::new(config)
		.with_shutdown(shutdown)
		.build(default_factories())?)
}

/// Cancels `shutdown` on ctrl-c or SIGTERM.
async fn wait_for_signal(shutdown: CancellationToken) {
	#[cfg(unix)]
	{
		use tokio::signal::unix::{signal, SignalKind};
		match signal(SignalKind::terminate()) {
			Ok(mut terminate) => {
				tokio::select! {
					_ = tokio::signal::ctrl_c() => {},
					_ = terminate.recv() => {},
				}
			},
			Err(e) => {
				tracing::warn!("Failed to install SIGTERM handler: {}", e);
				let _ = tokio::signal::ctrl_c().await;
			},
		}
	}
	#[cfg(not(unix))]
	{
		let _ = tokio::signal::ctrl_c().await;
	}

	tracing::info!("Shutdown requested");
	shutdown.cancel();
}

fn log_report(report: &CycleReport) {
	tracing::info!(
		rewards = report.rewards_discovered,
		rejected = report.rewards_rejected,
		bundles = report.bundles_built,
		duplicates = report.bundles_duplicate,
		executed = report.executed,
		succeeded = report.succeeded,
		failed = report.failed,
		verified = report.verified,
		claimed_usd = %format_usd(report.claimed_usd),
		gas_usd = %format_usd(report.gas_usd),
		"Cycle complete"
	);
	for result in &report.results {
		match &result.error {
			Some(error) => tracing::warn!(bundle_id = %result.bundle_id, error = %error, "Bundle failed"),
			None => tracing::info!(
				bundle_id = %result.bundle_id,
				tx_hash = result.tx_hash.as_deref().unwrap_or("-"),
				"Bundle claimed"
			),
		}
	}
}
