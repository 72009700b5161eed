//! Reconciliation engine.
//!
//! One cycle scans every locally stored contract of the session's owner, gathers
//! chain evidence for each, runs the state machine, and writes all resulting
//! changes in a single batch. Evidence queries for different contracts run
//! concurrently up to a configured bound; the decision step is synchronous.
//!
//! Whole-cycle failures (indexer or wallet bridge unreachable, storage failure)
//! leave the store untouched. Per-contract problems (unclassifiable witness,
//! rejected transition, missing funding script) only affect that contract.

use crate::contract::state_machine::{self, Evidence, Outcome};
use crate::contract::{Contract, ContractId, ContractState};
use crate::indexer::{ChainSource, IndexerError};
use crate::store::ContractRepository;
use crate::sync::progress_tracker::{CycleReport, CycleTracker};
use crate::sync::session::SessionContext;
use crate::sync::types::ReconcileError;
use crate::wallet::WalletBridge;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the engine decided for one contract.
#[derive(Debug)]
enum Decision {
	Unchanged,
	MissingScript,
	Rejected,
	Advanced {
		from: ContractState,
		contract: Contract,
	},
}

pub struct ReconciliationEngine {
	chain: Arc<dyn ChainSource>,
	wallet: Arc<dyn WalletBridge>,
	store: Arc<dyn ContractRepository>,
	max_concurrent_queries: usize,
}

impl ReconciliationEngine {
	pub fn new(
		chain: Arc<dyn ChainSource>,
		wallet: Arc<dyn WalletBridge>,
		store: Arc<dyn ContractRepository>,
		max_concurrent_queries: usize,
	) -> Self {
		Self {
			chain,
			wallet,
			store,
			max_concurrent_queries: max_concurrent_queries.max(1),
		}
	}

	/// Run one full reconciliation cycle for `session`.
	pub async fn run_cycle(&self, session: &SessionContext) -> Result<CycleReport, ReconcileError> {
		let owner_key = session
			.owner_key
			.as_deref()
			.ok_or(ReconcileError::MissingOwnerKey)?;

		let contracts = self.store.find_by_owner(session.network, owner_key).await?;
		let mut tracker = CycleTracker::new(contracts.len());

		let candidates: Vec<(ContractId, Contract)> = contracts
			.into_iter()
			.filter_map(|contract| {
				let Some(id) = contract.identity() else {
					tracker.record_missing_txid();
					return None;
				};
				if contract.state().is_terminal() {
					tracker.record_terminal();
					return None;
				}
				Some((id, contract))
			})
			.collect();

		if candidates.is_empty() {
			debug!("No open contracts to reconcile on {}", session.network);
			return Ok(tracker.finish());
		}

		let coins: HashSet<ContractId> = self
			.wallet
			.list_coins(session.network)
			.await?
			.iter()
			.map(|coin| coin.outpoint())
			.collect();

		let observed_at = Utc::now();
		let decisions: Vec<(ContractId, Result<Decision, IndexerError>)> = stream::iter(candidates)
			.map(|(id, contract)| {
				let in_coin_set = coins.contains(&id);
				async move {
					let decision = self.evaluate(&id, contract, in_coin_set, observed_at).await;
					(id, decision)
				}
			})
			.buffer_unordered(self.max_concurrent_queries)
			.collect()
			.await;

		let mut updates = Vec::new();
		for (id, decision) in decisions {
			match decision? {
				Decision::Unchanged => tracker.record_unchanged(),
				Decision::MissingScript => tracker.record_missing_script(),
				Decision::Rejected => tracker.record_rejected(),
				Decision::Advanced { from, contract } => {
					info!("Contract {} moved {} -> {}", id, from, contract.state());
					tracker.record_transition(contract.state());
					updates.push(contract);
				}
			}
		}

		// held until the batch is written, so a session switch cannot slip in between
		let Some(_commit) = session.commit_guard().await else {
			info!(
				"Discarding {} updates from superseded session {}",
				updates.len(),
				session.generation()
			);
			return Err(ReconcileError::Cancelled);
		};
		if !updates.is_empty() {
			self.store.upsert_batch(updates).await?;
		}

		Ok(tracker.finish())
	}

	/// Gather evidence for one contract and run the state machine on it.
	async fn evaluate(
		&self,
		id: &ContractId,
		contract: Contract,
		in_coin_set: bool,
		observed_at: DateTime<Utc>,
	) -> Result<Decision, IndexerError> {
		let mut history = None;

		if contract.state() == ContractState::Unconfirmed {
			let Some(script) = Self::funding_script(&contract) else {
				warn!("Contract {} has no usable funding script, skipping", id);
				return Ok(Decision::MissingScript);
			};
			let fetched = self
				.chain
				.fetch_histories(&[script])
				.await?
				.into_iter()
				.next()
				.unwrap_or_default();

			if !state_machine::is_confirmed(&fetched) {
				debug!(
					"Contract {} still unconfirmed ({} history entries)",
					id,
					fetched.len()
				);
				return Ok(Decision::Unchanged);
			}
			history = Some(fetched);
		}

		let spend = self.chain.fetch_outspend(id).await?;
		let evidence = Evidence {
			history,
			spend,
			in_coin_set,
			observed_at,
		};

		match state_machine::advance(&contract, &evidence) {
			Ok(Outcome::Unchanged) => Ok(Decision::Unchanged),
			Ok(Outcome::Advanced(next)) => Ok(Decision::Advanced {
				from: contract.state(),
				contract: next,
			}),
			Err(e) => {
				warn!("Contract {}: {}", id, e);
				Ok(Decision::Rejected)
			}
		}
	}

	fn funding_script(contract: &Contract) -> Option<Vec<u8>> {
		let script_hex = contract.funding_script.as_deref()?;
		match hex::decode(script_hex) {
			Ok(script) => Some(script),
			Err(e) => {
				warn!("Invalid funding script hex: {}", e);
				None
			}
		}
	}
}
