//! Periodic cycle driver.
//!
//! The scheduler moves through `Idle -> Scheduled -> Running -> (Scheduled |
//! ShuttingDown) -> Stopped`. Ticks never overlap: the next delay starts only
//! once the current tick has settled.

use crate::policy::ScheduleConfig;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Lifecycle states of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
	Idle,
	Scheduled,
	Running,
	ShuttingDown,
	Stopped,
}

/// Failure reported by a tick.
#[derive(Debug, Error)]
pub enum TickError {
	/// The tick failed but the next one may succeed.
	#[error("Tick failed: {0}")]
	Failed(String),
	/// The loop must stop.
	#[error("Fatal tick error: {0}")]
	Fatal(String),
}

/// Counters returned when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
	/// Ticks started.
	pub ticks: u64,
	pub succeeded: u64,
	/// Failed ticks, timeouts included.
	pub failed: u64,
	pub timed_out: u64,
}

/// Drives ticks at a jittered interval until shutdown.
pub struct Scheduler {
	schedule: ScheduleConfig,
	shutdown: CancellationToken,
	state: watch::Sender<SchedulerState>,
}

impl Scheduler {
	/// Creates a scheduler that stops when `shutdown` is cancelled.
	pub fn new(schedule: ScheduleConfig, shutdown: CancellationToken) -> Self {
		let (state, _) = watch::channel(SchedulerState::Idle);
		Self {
			schedule,
			shutdown,
			state,
		}
	}

	pub fn state(&self) -> SchedulerState {
		*self.state.borrow()
	}

	/// Subscribes to state transitions.
	pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
		self.state.subscribe()
	}

	/// Requests shutdown. Calling it again has no effect.
	pub fn stop(&self) {
		if !self.shutdown.is_cancelled() {
			tracing::info!("Scheduler stop requested");
			self.shutdown.cancel();
		}
	}

	fn set_state(&self, state: SchedulerState) {
		self.state.send_replace(state);
	}

	/// `interval` shifted by a uniform offset in `[-jitter, +jitter]`.
	fn next_delay(&self) -> Duration {
		let interval = self.schedule.interval.as_millis() as i128;
		let jitter = self.schedule.jitter.as_millis() as i128;
		let offset = if jitter > 0 {
			rand::thread_rng().gen_range(-jitter..=jitter)
		} else {
			0
		};
		Duration::from_millis((interval + offset).max(0) as u64)
	}

	/// Runs `tick` until shutdown and returns the loop's counters.
	///
	/// A tick exceeding `tick_timeout` is dropped, counted as failed, and
	/// doubles the following delay once. A fatal tick error stops the loop.
	/// A tick that is in flight when shutdown is requested runs to completion
	/// but its outcome is ignored.
	pub async fn run<F, Fut>(&self, mut tick: F) -> SchedulerStats
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<(), TickError>>,
	{
		let mut stats = SchedulerStats::default();
		if self.shutdown.is_cancelled() {
			self.set_state(SchedulerState::Stopped);
			return stats;
		}

		let mut delay = self.next_delay();
		loop {
			self.set_state(SchedulerState::Scheduled);
			tracing::debug!(delay_ms = delay.as_millis() as u64, "Next tick scheduled");
			tokio::select! {
				biased;
				_ = self.shutdown.cancelled() => break,
				_ = tokio::time::sleep(delay) => {}
			}

			self.set_state(SchedulerState::Running);
			stats.ticks += 1;
			let outcome = tokio::time::timeout(self.schedule.tick_timeout, tick()).await;

			if self.shutdown.is_cancelled() {
				tracing::info!(tick = stats.ticks, "Discarding tick outcome after stop");
				break;
			}

			delay = self.next_delay();
			match outcome {
				Ok(Ok(())) => stats.succeeded += 1,
				Ok(Err(TickError::Failed(reason))) => {
					stats.failed += 1;
					tracing::warn!(tick = stats.ticks, %reason, "Tick failed");
				},
				Ok(Err(TickError::Fatal(reason))) => {
					stats.failed += 1;
					tracing::error!(tick = stats.ticks, %reason, "Fatal tick error, stopping");
					self.stop();
					break;
				},
				Err(_) => {
					stats.failed += 1;
					stats.timed_out += 1;
					tracing::warn!(
						tick = stats.ticks,
						timeout_secs = self.schedule.tick_timeout.as_secs(),
						"Tick timed out, backing off"
					);
					delay = delay.saturating_mul(2);
				},
			}
		}

		self.set_state(SchedulerState::ShuttingDown);
		tracing::info!(
			ticks = stats.ticks,
			succeeded = stats.succeeded,
			failed = stats.failed,
			timed_out = stats.timed_out,
			"Scheduler stopped"
		);
		self.set_state(SchedulerState::Stopped);
		stats
	}
}
