//! Contract sync service and integration point for all sync components.
//!
//! This module defines the `ContractSyncService`, which owns the active session and coordinates
//! every component involved in keeping contract state current: wallet adoption, reconciliation
//! cycles, the oracle list and the wallet event gate. Consumers never talk to those components
//! directly; they observe a [`ContractsSnapshot`] published over a `watch` channel and call the
//! service's operations.
//!
//! The service is responsible for:
//! - Starting a session in a fixed order: wallet sync, first cycle, oracle fetch, event gate
//! - Tearing the previous session down when the network or owner key changes
//! - Running further cycles one at a time through the coalescing scheduler
//! - Publishing contracts, activities and the loading flag as one consistent snapshot

use crate::contract::{Activity, Contract, Network, derive_activities};
use crate::indexer::ChainSource;
use crate::oracle::{Oracle, OracleRegistry};
use crate::store::ContractRepository;
use crate::sync::events::{DEFAULT_GUARD_WINDOW, EventGate, GateHandle};
use crate::sync::progress_tracker::CycleReport;
use crate::sync::reconciler::ReconciliationEngine;
use crate::sync::scheduler::{CycleScheduler, CycleTrigger, TriggerHandle};
use crate::sync::session::{SessionContext, SessionRegistry};
use crate::sync::types::ReconcileError;
use crate::wallet::{WalletBridge, WalletContractSync};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

/// Everything a consumer sees, published atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContractsSnapshot {
	pub network: Option<Network>,
	pub contracts: Vec<Contract>,
	pub activities: Vec<Activity>,
	/// True while a reconciliation cycle is running.
	pub loading: bool,
	pub oracles: Vec<Oracle>,
	/// Contract being created or topped up.
	pub new_contract: Option<Contract>,
	/// Contract being replaced by a topup.
	pub old_contract: Option<Contract>,
	pub last_report: Option<CycleReport>,
}

/// Tunables for the sync service
#[derive(Debug, Clone)]
pub struct SyncSettings {
	/// Wallet account whose covenant coins trigger cycles.
	pub account_id: String,
	/// Events within this long after session start are ignored.
	pub guard_window: Duration,
	/// Upper bound on concurrent indexer queries within one cycle.
	pub max_concurrent_queries: usize,
}

impl Default for SyncSettings {
	fn default() -> Self {
		Self {
			account_id: "fuji".to_string(),
			guard_window: DEFAULT_GUARD_WINDOW,
			max_concurrent_queries: 4,
		}
	}
}

struct ServiceInner {
	engine: ReconciliationEngine,
	wallet_sync: WalletContractSync,
	wallet: Arc<dyn WalletBridge>,
	store: Arc<dyn ContractRepository>,
	oracles: Arc<dyn OracleRegistry>,
	settings: SyncSettings,
	snapshot: watch::Sender<ContractsSnapshot>,
	sessions: SessionRegistry,
	/// Held for the length of a cycle, startup included.
	cycle_lock: Mutex<()>,
}

/// Per-session resources. Dropping them stops the session's background work,
/// including a startup that has not finished yet.
struct ActiveSession {
	context: SessionContext,
	scheduler: CycleScheduler,
	startup: AbortHandle,
	gate: Option<GateHandle>,
}

impl Drop for ActiveSession {
	fn drop(&mut self) {
		self.startup.abort();
	}
}

/// Main entry point for consumers of contract state.
#[derive(Clone)]
pub struct ContractSyncService {
	inner: Arc<ServiceInner>,
	active: Arc<Mutex<Option<ActiveSession>>>,
}

impl ContractSyncService {
	pub fn new(
		chain: Arc<dyn ChainSource>,
		wallet: Arc<dyn WalletBridge>,
		store: Arc<dyn ContractRepository>,
		oracles: Arc<dyn OracleRegistry>,
		settings: SyncSettings,
	) -> Self {
		let engine = ReconciliationEngine::new(
			chain,
			wallet.clone(),
			store.clone(),
			settings.max_concurrent_queries,
		);
		let wallet_sync = WalletContractSync::new(wallet.clone(), store.clone());
		let (snapshot, _) = watch::channel(ContractsSnapshot::default());

		Self {
			inner: Arc::new(ServiceInner {
				engine,
				wallet_sync,
				wallet,
				store,
				oracles,
				settings,
				snapshot,
				sessions: SessionRegistry::new(),
				cycle_lock: Mutex::new(()),
			}),
			active: Arc::new(Mutex::new(None)),
		}
	}

	/// Observe snapshots as they are published.
	pub fn subscribe(&self) -> watch::Receiver<ContractsSnapshot> {
		self.inner.snapshot.subscribe()
	}

	pub fn snapshot(&self) -> ContractsSnapshot {
		self.inner.snapshot.borrow().clone()
	}

	/// Tear down the current session and start one for `(network, owner_key)`.
	///
	/// The previous session is invalidated before anything else happens, so an
	/// in-flight cycle of it can no longer persist results, and its unfinished
	/// startup is aborted. Returns once the new session's startup has finished or
	/// a later switch has superseded it.
	pub async fn switch_session(&self, network: Network, owner_key: Option<String>) {
		let context =
			self.inner
				.sessions
				.begin(network, owner_key, self.inner.settings.account_id.clone());

		let previous = self.active.lock().await.take();
		if let Some(previous) = previous {
			info!(
				"Closing session {} on {}",
				previous.context.generation(),
				previous.context.network
			);
		}
		self.inner.sessions.settle().await;
		if !context.is_current() {
			debug!("Session {} superseded before it started", context.generation());
			return;
		}

		info!(
			"Starting session {} on {} (owner key {})",
			context.generation(),
			network,
			if context.owner_key.is_some() { "set" } else { "missing" }
		);
		self.inner.snapshot.send_replace(ContractsSnapshot {
			network: Some(network),
			..Default::default()
		});

		let scheduler = self.inner.spawn_scheduler(context.clone());
		let startup = tokio::spawn({
			let service = self.clone();
			let context = context.clone();
			let trigger = scheduler.handle();
			async move { service.start_session(context, trigger).await }
		});

		{
			let mut active = self.active.lock().await;
			if !context.is_current() {
				startup.abort();
				return;
			}
			*active = Some(ActiveSession {
				context: context.clone(),
				scheduler,
				startup: startup.abort_handle(),
				gate: None,
			});
		}

		match startup.await {
			Ok(()) => debug!("Session {} started", context.generation()),
			Err(e) if e.is_cancelled() => {
				debug!("Startup of session {} cancelled", context.generation())
			}
			Err(e) => error!("Startup of session {} failed: {}", context.generation(), e),
		}
	}

	/// Startup sequence, then the event gate is attached to the active session.
	async fn start_session(&self, context: SessionContext, trigger: TriggerHandle) {
		self.inner.start_session(&context).await;

		let Some(gate) = self.inner.open_gate(&context, trigger).await else {
			return;
		};
		match self.active.lock().await.as_mut() {
			Some(session) if session.context.generation() == context.generation() => {
				session.gate = Some(gate);
			}
			_ => debug!(
				"Session {} closed before its event gate opened",
				context.generation()
			),
		}
	}

	/// Request a reconciliation cycle. Returns `false` if none could be queued,
	/// either because one is already pending or no session is active.
	pub async fn reload_contracts(&self) -> bool {
		match self.active.lock().await.as_ref() {
			Some(session) => session.scheduler.request(CycleTrigger::Explicit),
			None => {
				debug!("No active session, ignoring reload");
				false
			}
		}
	}

	pub fn set_new_contract(&self, contract: Contract) {
		self.inner
			.snapshot
			.send_modify(|snapshot| snapshot.new_contract = Some(contract));
	}

	pub fn set_old_contract(&self, contract: Contract) {
		self.inner
			.snapshot
			.send_modify(|snapshot| snapshot.old_contract = Some(contract));
	}

	/// Clear both selections.
	pub fn reset_selection(&self) {
		self.inner.snapshot.send_modify(|snapshot| {
			snapshot.new_contract = None;
			snapshot.old_contract = None;
		});
	}

	/// Stop the active session, cancelling any in-flight cycle.
	pub async fn shutdown(&self) {
		self.inner.sessions.end_current();
		if let Some(session) = self.active.lock().await.take() {
			session.scheduler.stop();
			if let Some(gate) = &session.gate {
				gate.cancel();
			}
			info!("Session {} shut down", session.context.generation());
		}
		self.inner
			.snapshot
			.send_modify(|snapshot| snapshot.loading = false);
	}
}

impl ServiceInner {
	/// Wallet sync, first cycle and oracle fetch, in that order.
	async fn start_session(&self, session: &SessionContext) {
		if let Some(owner_key) = session.owner_key.as_deref() {
			match self.wallet_sync.sync(session.network, owner_key).await {
				Ok(report) if !report.adopted.is_empty() => {
					info!("Adopted {} contracts from the wallet", report.adopted.len())
				}
				Ok(_) => debug!("Local store already has every wallet contract"),
				Err(e) => warn!("Wallet sync failed: {}", e),
			}
			self.refresh_contracts(session).await;
			self.run_cycle(session, CycleTrigger::Startup).await;
		}

		if !session.is_current() {
			return;
		}
		match self.oracles.fetch_oracles(session.network).await {
			Ok(oracles) => {
				if session.is_current() {
					self.snapshot.send_modify(|snapshot| snapshot.oracles = oracles);
				}
			}
			Err(e) => warn!("Failed to fetch oracles for {}: {}", session.network, e),
		}
	}

	fn spawn_scheduler(self: &Arc<Self>, session: SessionContext) -> CycleScheduler {
		let inner = self.clone();
		CycleScheduler::spawn(move |trigger| {
			let inner = inner.clone();
			let session = session.clone();
			async move {
				inner.run_cycle(&session, trigger).await;
			}
		})
	}

	async fn open_gate(
		&self,
		session: &SessionContext,
		trigger: TriggerHandle,
	) -> Option<GateHandle> {
		if session.owner_key.is_none() || !session.is_current() {
			return None;
		}
		let gate = EventGate::new(session, self.settings.guard_window);
		match gate
			.subscribe(&*self.wallet, session.clone(), trigger)
			.await
		{
			Ok(handle) => Some(handle),
			Err(e) => {
				warn!("Coin event subscription failed, only explicit reloads will run: {}", e);
				None
			}
		}
	}

	async fn run_cycle(&self, session: &SessionContext, trigger: CycleTrigger) {
		let _cycle = self.cycle_lock.lock().await;
		if !session.is_current() {
			return;
		}
		self.snapshot.send_modify(|snapshot| snapshot.loading = true);
		info!(
			"Reconciliation cycle started ({:?}) on {}",
			trigger, session.network
		);

		match self.engine.run_cycle(session).await {
			Ok(report) => {
				info!("{}", report.summary());
				self.refresh_contracts(session).await;
				if session.is_current() {
					self.snapshot
						.send_modify(|snapshot| snapshot.last_report = Some(report));
				}
			}
			Err(ReconcileError::Cancelled) => {
				info!("Cycle results discarded, session changed");
			}
			Err(ReconcileError::MissingOwnerKey) => {
				debug!("No owner key, nothing to reconcile");
			}
			Err(e) if e.is_network() => {
				warn!("Cycle ended without changes: {}", e);
			}
			Err(e) => {
				error!("Cycle failed: {}", e);
			}
		}

		if session.is_current() {
			self.snapshot.send_modify(|snapshot| snapshot.loading = false);
		}
	}

	/// Publish the session's contracts and activities from the store.
	async fn refresh_contracts(&self, session: &SessionContext) {
		let Some(owner_key) = session.owner_key.as_deref() else {
			return;
		};
		let contracts = match self.store.find_by_owner(session.network, owner_key).await {
			Ok(contracts) => contracts,
			Err(e) => {
				error!("Failed to load contracts: {}", e);
				return;
			}
		};
		let activities = derive_activities(&contracts);

		if session.is_current() {
			self.snapshot.send_modify(|snapshot| {
				snapshot.contracts = contracts;
				snapshot.activities = activities;
			});
		}
	}
}
