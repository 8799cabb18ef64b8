//! Solidity interface of the reward distributor contract.

use crate::DiscoveryError;
use alloy_primitives::Bytes;
use alloy_sol_types::{sol, SolCall};
use claimer_types::{Address, ClaimBundle};

sol! {
	/// Reward distributor holding per-account balances of several tokens.
	interface IRewardDistributor {
		/// Pending balances of `account`, one amount per token.
		function pendingRewards(address account)
			external
			view
			returns (address[] memory tokens, uint256[] memory amounts);

		/// Claims `tokens` for every account in `accounts` and pays `recipient`.
		function claimMany(address[] calldata accounts, address[] calldata tokens, address recipient)
			external;
	}
}

/// Encodes `claimMany` for every wallet and token in `bundle`.
pub fn encode_claim(bundle: &ClaimBundle) -> Result<Bytes, DiscoveryError> {
	let parse = |address: &Address| {
		address
			.to_evm()
			.map_err(|e| DiscoveryError::ValidationError(e.to_string()))
	};

	let accounts = bundle
		.wallets()
		.into_iter()
		.map(parse)
		.collect::<Result<Vec<_>, _>>()?;
	let mut tokens = Vec::new();
	for item in &bundle.items {
		let token = parse(&item.token)?;
		if !tokens.contains(&token) {
			tokens.push(token);
		}
	}

	let call = IRewardDistributor::claimManyCall {
		accounts,
		tokens,
		recipient: parse(&bundle.claim_to)?,
	};
	Ok(call.abi_encode().into())
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::U256;
	use claimer_types::{Chain, PendingReward};

	fn reward(id: &str, wallet: &str, token: &str) -> PendingReward {
		PendingReward {
			id: id.into(),
			wallet: Address::new(wallet, Chain::Arbitrum),
			protocol: "distributor".into(),
			token: Address::new(token, Chain::Arbitrum),
			amount_wei: U256::from(1u64),
			amount_usd: 0.5,
			claim_to: Address::new("0x8ba1f109551bd432803012645ac136ddd64dba72", Chain::Arbitrum),
			discovered_at: 0,
			last_claim_at: None,
			est_gas_limit: None,
			is_synthetic: false,
		}
	}

	#[test]
	fn test_claim_encoding_deduplicates_accounts_and_tokens() {
		let wallet_a = "0x00000000000000000000000000000000000000a1";
		let wallet_b = "0x00000000000000000000000000000000000000a2";
		let token = "0x912ce59144191c1204e64559fe8253a0e49e6548";
		let items = vec![
			reward("1", wallet_a, token),
			reward("2", wallet_b, token),
			reward("3", wallet_a, token),
		];
		let bundle = ClaimBundle::new(items[0].bundle_key(), items, 0.0);

		let data = encode_claim(&bundle).unwrap();
		assert_eq!(&data[..4], IRewardDistributor::claimManyCall::SELECTOR.as_slice());

		let decoded = IRewardDistributor::claimManyCall::abi_decode(&data, true).unwrap();
		assert_eq!(decoded.accounts.len(), 2);
		assert_eq!(decoded.tokens.len(), 1);
		assert_eq!(
			decoded.recipient,
			bundle.claim_to.to_evm().unwrap()
		);
	}
}
