//! Types describing a collateralized synthetic-asset position and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chain environment a contract lives on. Records are always scoped by network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
	Liquid,
	Testnet,
	Regtest,
}

impl Network {
	pub fn as_str(&self) -> &'static str {
		match self {
			Network::Liquid => "liquid",
			Network::Testnet => "testnet",
			Network::Regtest => "regtest",
		}
	}
}

impl fmt::Display for Network {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Identity of a contract: the funding outpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractId {
	pub txid: String,
	pub vout: u32,
}

impl ContractId {
	pub fn new(txid: impl Into<String>, vout: u32) -> Self {
		Self {
			txid: txid.into(),
			vout,
		}
	}
}

impl fmt::Display for ContractId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.txid, self.vout)
	}
}

/// Lifecycle state of a contract.
///
/// `Redeemed` and `Liquidated` are terminal: nothing moves a contract out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractState {
	Unconfirmed,
	Confirmed,
	Open,
	Topup,
	Redeemed,
	Liquidated,
	Unknown,
}

impl ContractState {
	pub fn is_terminal(&self) -> bool {
		matches!(self, ContractState::Redeemed | ContractState::Liquidated)
	}

	/// Whether `self -> next` is an edge of the lifecycle graph.
	///
	/// Staying in the same state is not an edge; callers treat it as a no-op.
	pub fn can_transition_to(&self, next: ContractState) -> bool {
		use ContractState::*;
		match (self, next) {
			(Redeemed | Liquidated, _) => false,
			(_, Unconfirmed) => false,
			(Unconfirmed, Confirmed) => true,
			(Unconfirmed, _) => false,
			(_, Confirmed) => false,
			// a topped-up funding output is already spent, it cannot be open again
			(Topup, Open) => false,
			(Topup, Unknown) => false,
			(Confirmed | Open | Unknown | Topup, Open | Topup | Redeemed | Liquidated | Unknown) => {
				true
			}
		}
	}
}

impl fmt::Display for ContractState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ContractState::Unconfirmed => "unconfirmed",
			ContractState::Confirmed => "confirmed",
			ContractState::Open => "open",
			ContractState::Topup => "topup",
			ContractState::Redeemed => "redeemed",
			ContractState::Liquidated => "liquidated",
			ContractState::Unknown => "unknown",
		};
		f.write_str(name)
	}
}

/// Position parameters fixed when the contract is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractParams {
	pub collateral_asset: String,
	pub collateral_amount: u64,
	pub synthetic_asset: String,
	pub synthetic_amount: u64,
	/// Collateral ratio in percent.
	pub ratio: u32,
	pub oracle_id: Option<String>,
	pub setup_timestamp: Option<DateTime<Utc>>,
}

/// A collateralized position.
///
/// State and lifecycle timestamps are private: they only change through
/// [`crate::contract::state_machine::advance`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
	/// Funding transaction id, absent until the funding transaction is known.
	pub txid: Option<String>,
	pub vout: u32,
	pub network: Network,
	/// Extended public key of the wallet account that owns the position.
	pub owner_key: Option<String>,
	/// Hex-encoded output script of the covenant funding output.
	pub funding_script: Option<String>,
	params: ContractParams,
	state: ContractState,
	confirmed_at: Option<DateTime<Utc>>,
	closed_at: Option<DateTime<Utc>>,
}

impl Contract {
	/// Create a new, unconfirmed contract.
	pub fn new(txid: Option<String>, vout: u32, network: Network, params: ContractParams) -> Self {
		Self {
			txid,
			vout,
			network,
			owner_key: None,
			funding_script: None,
			params,
			state: ContractState::Unconfirmed,
			confirmed_at: None,
			closed_at: None,
		}
	}

	pub fn with_owner_key(mut self, owner_key: impl Into<String>) -> Self {
		self.owner_key = Some(owner_key.into());
		self
	}

	pub fn with_funding_script(mut self, script_hex: impl Into<String>) -> Self {
		self.funding_script = Some(script_hex.into());
		self
	}

	pub fn identity(&self) -> Option<ContractId> {
		self.txid
			.as_ref()
			.map(|txid| ContractId::new(txid.clone(), self.vout))
	}

	pub fn params(&self) -> &ContractParams {
		&self.params
	}

	pub fn state(&self) -> ContractState {
		self.state
	}

	pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
		self.confirmed_at
	}

	pub fn closed_at(&self) -> Option<DateTime<Utc>> {
		self.closed_at
	}

	pub fn is_owned_by(&self, network: Network, owner_key: &str) -> bool {
		self.network == network && self.owner_key.as_deref() == Some(owner_key)
	}

	/// Move to `next`, stamping lifecycle timestamps.
	///
	/// `confirmed_at` is set on entering `Confirmed`; `closed_at` on entering a
	/// terminal state. Re-entering the current state is a no-op.
	pub(crate) fn transition(
		&mut self,
		next: ContractState,
		at: DateTime<Utc>,
	) -> Result<(), TransitionError> {
		if self.state == next {
			return Ok(());
		}
		if !self.state.can_transition_to(next) {
			return Err(TransitionError {
				from: self.state,
				to: next,
			});
		}
		if next == ContractState::Confirmed {
			self.confirmed_at = Some(at);
		}
		if next.is_terminal() {
			self.closed_at = Some(at);
		}
		self.state = next;
		Ok(())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid contract transition: {from} -> {to}")]
pub struct TransitionError {
	pub from: ContractState,
	pub to: ContractState,
}
