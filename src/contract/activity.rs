//! Read-only activity feed derived from contracts.

use crate::contract::types::{Contract, ContractId, ContractState};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
	Creation,
	Topup,
	Redeemed,
	Liquidated,
}

/// One lifecycle event of a contract, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Activity {
	pub contract_id: ContractId,
	pub kind: ActivityKind,
	pub timestamp: Option<DateTime<Utc>>,
	pub collateral_asset: String,
	pub synthetic_asset: String,
}

impl Activity {
	fn for_contract(
		contract: &Contract,
		id: &ContractId,
		kind: ActivityKind,
		timestamp: Option<DateTime<Utc>>,
	) -> Self {
		Self {
			contract_id: id.clone(),
			kind,
			timestamp,
			collateral_asset: contract.params().collateral_asset.clone(),
			synthetic_asset: contract.params().synthetic_asset.clone(),
		}
	}
}

/// Project contracts into activities, newest first.
///
/// Contracts without a funding transaction have no activity yet.
pub fn derive_activities(contracts: &[Contract]) -> Vec<Activity> {
	contracts
		.iter()
		.filter_map(|contract| contract.identity().map(|id| (contract, id)))
		.flat_map(|(contract, id)| {
			let created_at = contract
				.params()
				.setup_timestamp
				.or(contract.confirmed_at());
			let mut activities = vec![Activity::for_contract(
				contract,
				&id,
				ActivityKind::Creation,
				created_at,
			)];
			let closing = match contract.state() {
				ContractState::Redeemed => Some(ActivityKind::Redeemed),
				ContractState::Liquidated => Some(ActivityKind::Liquidated),
				ContractState::Topup => Some(ActivityKind::Topup),
				_ => None,
			};
			if let Some(kind) = closing {
				activities.push(Activity::for_contract(
					contract,
					&id,
					kind,
					contract.closed_at(),
				));
			}
			activities
		})
		.sorted_by(|a, b| b.timestamp.cmp(&a.timestamp))
		.collect()
}
