//! Payout verification from receipt logs.
//!
//! Recomputes what actually reached the claim recipient by decoding ERC-20
//! `Transfer` events, independent of the value declared before execution.

use alloy_primitives::{Log as PrimLog, LogData};
use alloy_sol_types::{sol, SolEvent};
use claimer_pricing::PricingService;
use claimer_types::{truncate_id, Address, Chain, ReceiptLog, VerifiedTransfer};

sol! {
	/// ERC-20 transfer event.
	event Transfer(address indexed from, address indexed to, uint256 value);
}

/// Result of checking a receipt against the expected recipient.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayoutVerification {
	/// True when at least one transfer reached the recipient.
	pub verified: bool,
	pub transfers: Vec<VerifiedTransfer>,
	/// USD value of the priced transfers; `None` without a pricing service.
	pub total_usd: Option<f64>,
	pub error: Option<String>,
}

/// Decodes a log as an ERC-20 transfer, ignoring every other event.
fn decode_transfer(chain: Chain, tx_hash: &str, log: &ReceiptLog) -> Option<VerifiedTransfer> {
	// ERC-721 shares the signature but indexes the token id as a fourth topic
	if log.topics.len() != 3 || log.topics[0] != Transfer::SIGNATURE_HASH {
		return None;
	}

	let prim_log = PrimLog {
		address: log.address,
		data: LogData::new_unchecked(log.topics.clone(), log.data.clone()),
	};
	match Transfer::decode_log(&prim_log, true) {
		Ok(event) => Some(VerifiedTransfer {
			token_address: Address::from_evm(log.address, chain),
			from: Address::from_evm(event.data.from, chain),
			to: Address::from_evm(event.data.to, chain),
			amount_wei: event.data.value,
			tx_hash: tx_hash.to_string(),
			log_index: log.log_index,
		}),
		Err(e) => {
			tracing::debug!(log_index = log.log_index, error = %e, "Skipping undecodable transfer log");
			None
		},
	}
}

/// Verifies that `logs` pay `expected_recipient`.
///
/// Pricing failures on individual transfers are logged and left out of the
/// total. No matching transfer is reported as an unverified result.
pub async fn verify_payout(
	chain: Chain,
	tx_hash: &str,
	logs: &[ReceiptLog],
	expected_recipient: &Address,
	pricing: Option<&PricingService>,
) -> PayoutVerification {
	let transfers: Vec<_> = logs
		.iter()
		.filter_map(|log| decode_transfer(chain, tx_hash, log))
		.filter(|transfer| transfer.to.value() == expected_recipient.value())
		.collect();

	if transfers.is_empty() {
		return PayoutVerification {
			verified: false,
			transfers,
			total_usd: None,
			error: Some(format!(
				"No transfer to {} found in {} logs of {}",
				expected_recipient,
				logs.len(),
				truncate_id(tx_hash)
			)),
		};
	}

	let total_usd = match pricing {
		Some(pricing) => {
			let mut total = 0.0;
			for transfer in &transfers {
				match pricing
					.quote_to_usd(chain, &transfer.token_address, transfer.amount_wei)
					.await
				{
					Ok(usd) => total += usd,
					Err(e) => tracing::warn!(
						token = %transfer.token_address,
						log_index = transfer.log_index,
						error = %e,
						"Failed to price verified transfer"
					),
				}
			}
			Some(total)
		},
		None => None,
	};

	PayoutVerification {
		verified: true,
		transfers,
		total_usd,
		error: None,
	}
}
