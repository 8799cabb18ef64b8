//! Bounded exponential backoff and wallet quarantine.

use crate::policy::RetryPolicy;
use claimer_types::{Address, Retryable};
use rand::Rng;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)` plus
/// up to 10% jitter.
fn backoff_delay(base_delay: Duration, attempt: u32) -> Duration {
	let exponential = base_delay.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
	let jitter_ceiling = exponential.as_millis() as u64 / 10;
	let jitter = if jitter_ceiling > 0 {
		rand::thread_rng().gen_range(0..=jitter_ceiling)
	} else {
		0
	};
	exponential.saturating_add(Duration::from_millis(jitter))
}

/// Runs `op` up to `max_attempts` times.
///
/// Non-retryable errors are returned immediately. Backoff sleeps always run
/// to completion; see [`with_backoff_cancellable`] for the interruptible
/// variant.
pub async fn with_backoff<T, E, F, Fut>(
	op: F,
	max_attempts: u32,
	base_delay: Duration,
) -> Result<T, E>
where
	E: Retryable + std::fmt::Display,
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
{
	run(op, max_attempts, base_delay, None).await
}

/// Like [`with_backoff`], but a cancelled `token` ends the loop at the next
/// sleep with the last error.
pub async fn with_backoff_cancellable<T, E, F, Fut>(
	op: F,
	policy: &RetryPolicy,
	token: &CancellationToken,
) -> Result<T, E>
where
	E: Retryable + std::fmt::Display,
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
{
	run(op, policy.max_attempts, policy.base_delay, Some(token)).await
}

async fn run<T, E, F, Fut>(
	mut op: F,
	max_attempts: u32,
	base_delay: Duration,
	token: Option<&CancellationToken>,
) -> Result<T, E>
where
	E: Retryable + std::fmt::Display,
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
{
	let max_attempts = max_attempts.max(1);
	let mut attempt = 1;
	loop {
		let error = match op().await {
			Ok(value) => return Ok(value),
			Err(error) => error,
		};

		if !error.is_retryable() {
			tracing::debug!(attempt, error = %error, "Non-retryable failure");
			return Err(error);
		}
		if attempt >= max_attempts {
			tracing::warn!(attempts = attempt, error = %error, "Retries exhausted");
			return Err(error);
		}

		let delay = backoff_delay(base_delay, attempt);
		tracing::debug!(
			attempt,
			max_attempts,
			delay_ms = delay.as_millis() as u64,
			error = %error,
			"Retrying after backoff"
		);
		match token {
			Some(token) => {
				tokio::select! {
					_ = token.cancelled() => {
						tracing::info!(attempt, "Backoff cancelled");
						return Err(error);
					}
					_ = tokio::time::sleep(delay) => {}
				}
			},
			None => tokio::time::sleep(delay).await,
		}
		attempt += 1;
	}
}

struct QuarantineEntry {
	release_at: Instant,
	reason: String,
}

/// Temporary admission ban on wallets whose claims failed on chain.
pub struct Quarantine {
	ttl: Duration,
	entries: Mutex<HashMap<String, QuarantineEntry>>,
}

impl Quarantine {
	pub fn new(ttl: Duration) -> Self {
		Self {
			ttl,
			entries: Mutex::new(HashMap::new()),
		}
	}

	/// Bans `wallet` for the quarantine TTL, replacing any earlier ban.
	pub async fn quarantine(&self, wallet: &Address, reason: &str) {
		let release_at = Instant::now() + self.ttl;
		tracing::warn!(wallet = %wallet.key(), reason, ttl_secs = self.ttl.as_secs(), "Quarantined wallet");
		self.entries.lock().await.insert(
			wallet.key(),
			QuarantineEntry {
				release_at,
				reason: reason.to_string(),
			},
		);
	}

	/// Returns true while `wallet` is banned; expired bans are evicted here.
	pub async fn is_quarantined(&self, wallet: &Address) -> bool {
		let key = wallet.key();
		let mut entries = self.entries.lock().await;
		match entries.get(&key) {
			Some(entry) if Instant::now() < entry.release_at => true,
			Some(entry) => {
				tracing::info!(wallet = %key, reason = %entry.reason, "Released wallet from quarantine");
				entries.remove(&key);
				false
			},
			None => false,
		}
	}

	/// Reason of the active ban on `wallet`, if any.
	pub async fn reason(&self, wallet: &Address) -> Option<String> {
		let entries = self.entries.lock().await;
		entries
			.get(&wallet.key())
			.filter(|entry| Instant::now() < entry.release_at)
			.map(|entry| entry.reason.clone())
	}

	/// Removes every expired ban and returns how many were removed.
	pub async fn sweep(&self) -> usize {
		let now = Instant::now();
		let mut entries = self.entries.lock().await;
		let before = entries.len();
		entries.retain(|_, entry| now < entry.release_at);
		before - entries.len()
	}

	pub async fn len(&self) -> usize {
		self.entries.lock().await.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use claimer_types::Chain;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::Arc;
	use thiserror::Error;

	#[derive(Debug, Error)]
	#[error("{message}")]
	struct TestError {
		message: &'static str,
		retryable: bool,
	}

	impl Retryable for TestError {
		fn is_retryable(&self) -> bool {
			self.retryable
		}
	}

	fn counting(
		calls: Arc<AtomicU32>,
		retryable: bool,
	) -> impl FnMut() -> std::future::Ready<Result<(), TestError>> {
		move || {
			calls.fetch_add(1, Ordering::SeqCst);
			std::future::ready(Err(TestError {
				message: "boom",
				retryable,
			}))
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_retryable_failure_exhausts_attempts() {
		let calls = Arc::new(AtomicU32::new(0));
		let result = with_backoff(counting(calls.clone(), true), 3, Duration::from_millis(100)).await;
		assert_eq!(result.unwrap_err().message, "boom");
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_non_retryable_failure_runs_once() {
		let calls = Arc::new(AtomicU32::new(0));
		let result = with_backoff(counting(calls.clone(), false), 3, Duration::from_millis(100)).await;
		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_success_after_transient_failures() {
		let calls = Arc::new(AtomicU32::new(0));
		let counter = calls.clone();
		let result = with_backoff(
			move || {
				let n = counter.fetch_add(1, Ordering::SeqCst);
				async move {
					if n < 2 {
						Err(TestError {
							message: "blip",
							retryable: true,
						})
					} else {
						Ok(n)
					}
				}
			},
			5,
			Duration::from_millis(10),
		)
		.await;
		assert_eq!(result.unwrap(), 2);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_backoff_waits_exponentially() {
		let start = Instant::now();
		let calls = Arc::new(AtomicU32::new(0));
		let _ = with_backoff(counting(calls, true), 3, Duration::from_secs(1)).await;
		// 1s + 2s, each with at most 10% jitter
		let elapsed = start.elapsed();
		assert!(elapsed >= Duration::from_secs(3));
		assert!(elapsed <= Duration::from_millis(3300));
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancellation_interrupts_backoff() {
		let token = CancellationToken::new();
		token.cancel();
		let calls = Arc::new(AtomicU32::new(0));
		let policy = RetryPolicy {
			max_attempts: 5,
			base_delay: Duration::from_secs(60),
		};

		let start = Instant::now();
		let result = with_backoff_cancellable(counting(calls.clone(), true), &policy, &token).await;
		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert!(start.elapsed() < Duration::from_secs(60));
	}

	#[tokio::test(start_paused = true)]
	async fn test_quarantine_expires_after_ttl() {
		let quarantine = Quarantine::new(Duration::from_secs(3600));
		let wallet = Address::new("0x00000000000000000000000000000000000000a1", Chain::Base);
		let other_chain = Address::new("0x00000000000000000000000000000000000000a1", Chain::Optimism);

		quarantine.quarantine(&wallet, "reverted").await;
		assert!(quarantine.is_quarantined(&wallet).await);
		assert!(!quarantine.is_quarantined(&other_chain).await);
		assert_eq!(quarantine.reason(&wallet).await.as_deref(), Some("reverted"));

		tokio::time::advance(Duration::from_secs(3599)).await;
		assert!(quarantine.is_quarantined(&wallet).await);

		tokio::time::advance(Duration::from_secs(1)).await;
		assert!(!quarantine.is_quarantined(&wallet).await);
		assert_eq!(quarantine.len().await, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_sweep_removes_expired_bans() {
		let quarantine = Quarantine::new(Duration::from_secs(10));
		quarantine
			.quarantine(&Address::new("0xa1", Chain::Base), "x")
			.await;
		tokio::time::advance(Duration::from_secs(5)).await;
		quarantine
			.quarantine(&Address::new("0xa2", Chain::Base), "y")
			.await;
		tokio::time::advance(Duration::from_secs(5)).await;
		assert_eq!(quarantine.sweep().await, 1);
		assert_eq!(quarantine.len().await, 1);
	}
}
