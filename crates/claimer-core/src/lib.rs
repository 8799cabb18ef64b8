//! Core claim pipeline for the dust claimer.
//!
//! Turns pending rewards reported by protocol integrations into economically
//! viable claim transactions. Each cycle filters rewards through the policy,
//! bundles them, drops duplicates, dry-runs the survivors and executes them
//! one at a time, verifying payouts from receipt logs. Failing wallets are
//! quarantined and every outcome is written to the ledger.

pub mod builder;
pub mod bundler;
pub mod engine;
pub mod executor;
pub mod idempotency;
pub mod policy;
pub mod retry;
pub mod scheduler;
pub mod simulator;
pub mod verifier;

pub use builder::{default_factories, BuilderError, ClaimerFactories, EngineBuilder};
pub use bundler::{ChainGasEstimator, GasEstimator, GasQuote};
pub use engine::{ClaimEngine, CycleReport, EngineError};
pub use executor::Executor;
pub use idempotency::{bundle_hash, IdempotencyGuard};
pub use policy::{Admission, Policy, PolicyViolation, RetryPolicy, ScheduleConfig, Thresholds};
pub use retry::{with_backoff, with_backoff_cancellable, Quarantine};
pub use scheduler::{Scheduler, SchedulerState, SchedulerStats, TickError};
pub use simulator::{BatchSimulation, SimulationOutcome, Simulator};
pub use verifier::{verify_payout, PayoutVerification};
