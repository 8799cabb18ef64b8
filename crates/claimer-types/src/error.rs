//! Claim error taxonomy.
//!
//! Callers branch on the variant rather than on message text. Idempotency
//! skips and quarantine blocks are absent: they are decisions,
//! not failures.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marks whether an error is worth another attempt.
///
/// Backoff loops consult this before sleeping; a `false` answer ends the
/// loop immediately with the error.
pub trait Retryable {
	fn is_retryable(&self) -> bool;
}

/// Errors produced while moving a bundle through the claim pipeline.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClaimError {
	/// The bundle or reward failed a policy threshold.
	#[error("Admission rejected: {0}")]
	AdmissionRejected(String),
	/// The recipient failed the safety gate.
	#[error("Safety rejected: {0}")]
	SafetyRejected(String),
	/// The dry-run predicted a failure.
	#[error("Simulation failed: {0}")]
	SimulationFailed(String),
	/// The chain rejected or never received the transaction.
	#[error("Execution failed: {message}")]
	ExecutionFailed { message: String, retryable: bool },
	/// The payout could not be confirmed from receipt logs.
	#[error("Verification failed: {0}")]
	VerificationFailed(String),
}

impl ClaimError {
	/// Returns the kind of this error without its payload.
	pub fn kind(&self) -> ClaimErrorKind {
		match self {
			ClaimError::AdmissionRejected(_) => ClaimErrorKind::AdmissionRejected,
			ClaimError::SafetyRejected(_) => ClaimErrorKind::SafetyRejected,
			ClaimError::SimulationFailed(_) => ClaimErrorKind::SimulationFailed,
			ClaimError::ExecutionFailed { .. } => ClaimErrorKind::ExecutionFailed,
			ClaimError::VerificationFailed(_) => ClaimErrorKind::VerificationFailed,
		}
	}
}

impl Retryable for ClaimError {
	fn is_retryable(&self) -> bool {
		matches!(
			self,
			ClaimError::ExecutionFailed {
				retryable: true,
				..
			}
		)
	}
}

/// Payload-free discriminant of [`ClaimError`], persisted with results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimErrorKind {
	AdmissionRejected,
	SafetyRejected,
	SimulationFailed,
	ExecutionFailed,
	VerificationFailed,
}
