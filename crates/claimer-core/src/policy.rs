//! Economic thresholds and admission control.
//!
//! A [`Policy`] is frozen at startup. Every component reads from it and none
//! writes to it; market adjustment returns a new [`Thresholds`] value instead
//! of changing the policy.

use claimer_config::Config;
use claimer_types::{ClaimBundle, PendingReward};
use std::fmt;
use std::time::Duration;

/// USD thresholds applied during admission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
	pub min_item_usd: f64,
	pub min_bundle_gross_usd: f64,
	pub min_bundle_net_usd: f64,
}

/// Backoff parameters for retried operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Total invocations, including the first.
	pub max_attempts: u32,
	pub base_delay: Duration,
}

/// Cycle cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
	pub interval: Duration,
	/// Maximum symmetric offset applied to each interval.
	pub jitter: Duration,
	pub tick_timeout: Duration,
}

/// The frozen claimer policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
	pub thresholds: Thresholds,
	pub min_bundle_size: usize,
	pub max_bundle_size: usize,
	pub claim_cooldown: Duration,
	/// Gas price, in gwei, at which thresholds apply unscaled.
	pub reference_gas_gwei: f64,
	pub retry: RetryPolicy,
	pub quarantine_ttl: Duration,
	pub idempotency_ttl: Duration,
	pub schedule: ScheduleConfig,
}

/// A sanity problem found in a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyViolation {
	pub field: &'static str,
	pub message: String,
}

impl fmt::Display for PolicyViolation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.field, self.message)
	}
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
	Admitted,
	Rejected(String),
}

impl Admission {
	pub fn is_admitted(&self) -> bool {
		matches!(self, Admission::Admitted)
	}
}

impl Default for Policy {
	fn default() -> Self {
		Self {
			thresholds: Thresholds {
				min_item_usd: 0.10,
				min_bundle_gross_usd: 2.0,
				min_bundle_net_usd: 1.0,
			},
			min_bundle_size: 2,
			max_bundle_size: 50,
			claim_cooldown: Duration::from_secs(3600),
			reference_gas_gwei: 30.0,
			retry: RetryPolicy {
				max_attempts: 3,
				base_delay: Duration::from_secs(1),
			},
			quarantine_ttl: Duration::from_secs(3600),
			idempotency_ttl: Duration::from_secs(600),
			schedule: ScheduleConfig {
				interval: Duration::from_secs(300),
				jitter: Duration::from_secs(30),
				tick_timeout: Duration::from_secs(120),
			},
		}
	}
}

impl Policy {
	/// The lowered development variant.
	pub fn dev() -> Self {
		let base = Self::default();
		Self {
			thresholds: Thresholds {
				min_item_usd: 0.01,
				min_bundle_gross_usd: 0.10,
				min_bundle_net_usd: 0.05,
			},
			min_bundle_size: 1,
			claim_cooldown: Duration::from_secs(60),
			quarantine_ttl: Duration::from_secs(60),
			idempotency_ttl: Duration::from_secs(60),
			schedule: ScheduleConfig {
				interval: Duration::from_secs(30),
				jitter: Duration::from_secs(5),
				tick_timeout: Duration::from_secs(60),
			},
			..base
		}
	}

	/// Builds the policy from the `[policy]`, `[schedule]` and `[retry]`
	/// sections. `dev_mode` keeps the lowered thresholds and sizes but still
	/// honours the configured schedule and retry settings.
	pub fn from_config(config: &Config) -> Self {
		let retry = RetryPolicy {
			max_attempts: config.retry.max_attempts,
			base_delay: Duration::from_millis(config.retry.base_delay_ms),
		};
		let schedule = ScheduleConfig {
			interval: Duration::from_secs(config.schedule.interval_seconds),
			jitter: Duration::from_secs(config.schedule.jitter_seconds),
			tick_timeout: Duration::from_secs(config.schedule.tick_timeout_seconds),
		};

		let policy = &config.policy;
		if policy.dev_mode {
			return Self {
				retry,
				schedule,
				reference_gas_gwei: policy.reference_gas_gwei,
				..Self::dev()
			};
		}

		Self {
			thresholds: Thresholds {
				min_item_usd: policy.min_item_usd,
				min_bundle_gross_usd: policy.min_bundle_gross_usd,
				min_bundle_net_usd: policy.min_bundle_net_usd,
			},
			min_bundle_size: policy.min_bundle_size,
			max_bundle_size: policy.max_bundle_size,
			claim_cooldown: Duration::from_secs(policy.claim_cooldown_seconds),
			reference_gas_gwei: policy.reference_gas_gwei,
			retry,
			quarantine_ttl: Duration::from_secs(policy.quarantine_ttl_seconds),
			idempotency_ttl: Duration::from_secs(policy.idempotency_ttl_seconds),
			schedule,
		}
	}

	/// Reports every sanity violation; never fails.
	pub fn validate_thresholds(&self) -> Vec<PolicyViolation> {
		let mut violations = Vec::new();
		let mut report = |field: &'static str, message: String| {
			violations.push(PolicyViolation { field, message });
		};

		let t = &self.thresholds;
		for (field, value) in [
			("min_item_usd", t.min_item_usd),
			("min_bundle_gross_usd", t.min_bundle_gross_usd),
			("min_bundle_net_usd", t.min_bundle_net_usd),
		] {
			if !value.is_finite() || value < 0.0 {
				report(field, format!("must be a non-negative number, got {}", value));
			}
		}
		if t.min_bundle_net_usd > t.min_bundle_gross_usd {
			report(
				"min_bundle_net_usd",
				format!(
					"{} exceeds min_bundle_gross_usd {}",
					t.min_bundle_net_usd, t.min_bundle_gross_usd
				),
			);
		}
		if self.max_bundle_size == 0 {
			report("max_bundle_size", "must be at least 1".to_string());
		}
		if self.min_bundle_size > self.max_bundle_size {
			report(
				"min_bundle_size",
				format!(
					"{} exceeds max_bundle_size {}",
					self.min_bundle_size, self.max_bundle_size
				),
			);
		}
		if !(self.reference_gas_gwei > 0.0) {
			report("reference_gas_gwei", "must be positive".to_string());
		}
		if self.retry.max_attempts == 0 {
			report("max_attempts", "must be at least 1".to_string());
		}
		if self.quarantine_ttl.is_zero() {
			report("quarantine_ttl_seconds", "must be positive".to_string());
		}
		if self.idempotency_ttl.is_zero() {
			report("idempotency_ttl_seconds", "must be positive".to_string());
		}
		if self.schedule.interval.is_zero() {
			report("interval_seconds", "must be positive".to_string());
		}
		if self.schedule.jitter >= self.schedule.interval && !self.schedule.interval.is_zero() {
			report(
				"jitter_seconds",
				"must be smaller than interval_seconds".to_string(),
			);
		}
		if self.schedule.tick_timeout.is_zero() {
			report("tick_timeout_seconds", "must be positive".to_string());
		}

		violations
	}

	/// Scales the thresholds for the observed gas price and volatility.
	///
	/// Gas above the reference raises every threshold, capped at five times;
	/// volatility in `[0, 1]` further raises the net threshold up to double.
	pub fn adjust_for_market_conditions(&self, gas_price_gwei: f64, volatility: f64) -> Thresholds {
		let ratio = if self.reference_gas_gwei > 0.0 && gas_price_gwei.is_finite() {
			gas_price_gwei / self.reference_gas_gwei
		} else {
			1.0
		};
		let gas_factor = ratio.clamp(1.0, 5.0);
		let vol_factor = 1.0 + if volatility.is_finite() { volatility.clamp(0.0, 1.0) } else { 0.0 };

		let t = &self.thresholds;
		let min_bundle_net_usd = t.min_bundle_net_usd * gas_factor * vol_factor;
		Thresholds {
			min_item_usd: t.min_item_usd * gas_factor,
			min_bundle_gross_usd: (t.min_bundle_gross_usd * gas_factor).max(min_bundle_net_usd),
			min_bundle_net_usd,
		}
	}

	/// Admission check for a single reward at unix time `now`.
	pub fn admit_reward(&self, reward: &PendingReward, thresholds: &Thresholds, now: u64) -> Admission {
		if reward.amount_usd < thresholds.min_item_usd {
			return Admission::Rejected(format!(
				"reward {} worth ${:.4} is below min_item_usd ${:.4}",
				reward.id, reward.amount_usd, thresholds.min_item_usd
			));
		}
		if let Some(last) = reward.last_claim_at {
			let ready_at = last.saturating_add(self.claim_cooldown.as_secs());
			if now < ready_at {
				return Admission::Rejected(format!(
					"reward {} is cooling down for another {}s",
					reward.id,
					ready_at - now
				));
			}
		}
		Admission::Admitted
	}

	/// Admission check for a priced bundle.
	pub fn admit_bundle(&self, bundle: &ClaimBundle, thresholds: &Thresholds) -> Admission {
		if bundle.total_usd < thresholds.min_bundle_gross_usd {
			return Admission::Rejected(format!(
				"gross ${:.4} is below min_bundle_gross_usd ${:.4}",
				bundle.total_usd, thresholds.min_bundle_gross_usd
			));
		}
		if bundle.net_usd < thresholds.min_bundle_net_usd {
			return Admission::Rejected(format!(
				"net ${:.4} is below min_bundle_net_usd ${:.4}",
				bundle.net_usd, thresholds.min_bundle_net_usd
			));
		}
		Admission::Admitted
	}
}
