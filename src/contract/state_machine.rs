//! Pure lifecycle transition function for contracts.
//!
//! Given a contract and the evidence gathered for it in one reconciliation cycle,
//! [`advance`] decides the contract's next state. It never suspends and never
//! performs I/O, so the same inputs always give the same answer.

use crate::contract::classifier::{LeafOperation, classify_witness};
use crate::contract::types::{Contract, ContractState, TransitionError};
use crate::indexer::{HistoryEntry, SpendStatus};

use chrono::{DateTime, Utc};

/// Everything observed about a contract during one cycle.
#[derive(Debug, Clone)]
pub struct Evidence {
	/// Funding script history; only gathered while the contract is unconfirmed.
	pub history: Option<Vec<HistoryEntry>>,
	/// Spend of the funding output, if any.
	pub spend: Option<SpendStatus>,
	/// Whether the funding outpoint is in the wallet's current coin set.
	pub in_coin_set: bool,
	/// When the evidence was gathered; stamps `confirmed_at`.
	pub observed_at: DateTime<Utc>,
}

/// Result of applying evidence to a contract.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
	Unchanged,
	Advanced(Contract),
}

/// A history confirms the funding transaction once any entry is mined.
///
/// An empty history and a mempool-only history (`height == 0`) both leave the
/// contract unconfirmed.
pub fn is_confirmed(history: &[HistoryEntry]) -> bool {
	history.iter().any(|entry| entry.height > 0)
}

/// Target state for a spent funding output.
pub fn state_for_spend(spend: &SpendStatus) -> ContractState {
	match classify_witness(&spend.witness) {
		LeafOperation::Liquidate => ContractState::Liquidated,
		LeafOperation::Redeem => ContractState::Redeemed,
		LeafOperation::Topup => ContractState::Topup,
		LeafOperation::Unrecognized => ContractState::Unknown,
	}
}

/// Apply `evidence` to `contract`.
///
/// Returns [`Outcome::Unchanged`] when nothing would change, so re-applying the
/// same evidence never produces a write or a new timestamp.
pub fn advance(contract: &Contract, evidence: &Evidence) -> Result<Outcome, TransitionError> {
	if contract.state().is_terminal() {
		return Ok(Outcome::Unchanged);
	}

	let mut next = contract.clone();

	if next.state() == ContractState::Unconfirmed {
		let confirmed = evidence.history.as_deref().is_some_and(is_confirmed);
		if !confirmed {
			return Ok(Outcome::Unchanged);
		}
		next.transition(ContractState::Confirmed, evidence.observed_at)?;
	}

	match &evidence.spend {
		Some(spend) => {
			next.transition(state_for_spend(spend), spend.timestamp)?;
		}
		None if evidence.in_coin_set => {
			next.transition(ContractState::Open, evidence.observed_at)?;
		}
		None => {
			// the coin may have just left the wallet through a redeem or topup
			if !matches!(next.state(), ContractState::Redeemed | ContractState::Topup) {
				next.transition(ContractState::Unknown, evidence.observed_at)?;
			}
		}
	}

	if next == *contract {
		Ok(Outcome::Unchanged)
	} else {
		Ok(Outcome::Advanced(next))
	}
}
