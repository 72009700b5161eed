//! Wallet coin-event gate.
//!
//! After a subscription opens, the wallet replays its backlog of coin events. The
//! gate ignores everything that arrives within a guard window measured from the
//! start of the session, then turns each qualifying event (a covenant coin of the
//! tracked account, new or spent) into a cycle request. Bursts coalesce in the
//! scheduler, so the gate does no debouncing of its own.

use crate::sync::scheduler::{CycleTrigger, TriggerHandle};
use crate::sync::session::SessionContext;
use crate::wallet::{CoinEvent, WalletBridge, WalletBridgeError};

use futures_util::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default length of the replay guard.
pub const DEFAULT_GUARD_WINDOW: Duration = Duration::from_secs(30);

/// Filters coin events for one session.
#[derive(Debug, Clone)]
pub struct EventGate {
	account_id: String,
	started_at: Instant,
	guard_window: Duration,
}

impl EventGate {
	pub fn new(session: &SessionContext, guard_window: Duration) -> Self {
		Self {
			account_id: session.account_id.clone(),
			started_at: session.started_at,
			guard_window,
		}
	}

	/// A new or spent covenant coin belonging to the tracked account.
	pub fn is_qualifying(&self, event: &CoinEvent) -> bool {
		event
			.utxo()
			.and_then(|utxo| utxo.covenant_account())
			.is_some_and(|account| account == self.account_id)
	}

	pub fn in_guard_window(&self, now: Instant) -> bool {
		now.saturating_duration_since(self.started_at) <= self.guard_window
	}

	pub fn should_trigger(&self, event: &CoinEvent, now: Instant) -> bool {
		self.is_qualifying(event) && !self.in_guard_window(now)
	}

	/// Open the wallet subscription and forward qualifying events to `trigger`
	/// until the session is superseded or the returned handle is dropped.
	pub async fn subscribe(
		self,
		wallet: &dyn WalletBridge,
		session: SessionContext,
		trigger: TriggerHandle,
	) -> Result<GateHandle, WalletBridgeError> {
		let mut events = wallet.subscribe_coin_events(&self.account_id).await?;

		let task = tokio::spawn(async move {
			while let Some(event) = events.next().await {
				if !session.is_current() {
					debug!("Session {} superseded, closing event gate", session.generation());
					break;
				}
				match event {
					Ok(event) if self.should_trigger(&event, Instant::now()) => {
						debug!("Coin event triggers reconciliation: {:?}", event);
						trigger.request(CycleTrigger::WalletEvent);
					}
					Ok(event) => {
						debug!("Suppressed coin event: {:?}", event);
					}
					Err(e) => {
						warn!("Coin event stream error: {}", e);
					}
				}
			}
			info!("Coin event subscription for {} ended", self.account_id);
		});

		Ok(GateHandle { task })
	}
}

/// Keeps a gate subscription alive. Dropping it closes the subscription.
#[derive(Debug)]
pub struct GateHandle {
	task: JoinHandle<()>,
}

impl GateHandle {
	pub fn cancel(&self) {
		self.task.abort();
	}

	pub fn is_finished(&self) -> bool {
		self.task.is_finished()
	}
}

impl Drop for GateHandle {
	fn drop(&mut self) {
		self.task.abort();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::contract::Network;
	use crate::sync::scheduler::CycleScheduler;
	use crate::sync::session::SessionRegistry;
	use crate::testing::FakeWalletBridge;
	use crate::wallet::{ScriptDetails, Utxo};
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	fn covenant_coin(account: &str) -> CoinEvent {
		CoinEvent::NewUtxo(Some(Utxo {
			txid: "aa".into(),
			vout: 0,
			script_details: Some(ScriptDetails::Covenant {
				account_name: account.into(),
			}),
		}))
	}

	fn plain_coin() -> CoinEvent {
		CoinEvent::SpentUtxo(Some(Utxo {
			txid: "bb".into(),
			vout: 1,
			script_details: Some(ScriptDetails::Other),
		}))
	}

	#[tokio::test(start_paused = true)]
	async fn guard_window_suppresses_replay() {
		let registry = SessionRegistry::new();
		let session = registry.begin(Network::Testnet, Some("xpub".into()), "fuji");
		let gate = EventGate::new(&session, DEFAULT_GUARD_WINDOW);
		let event = covenant_coin("fuji");

		assert!(!gate.should_trigger(&event, Instant::now()));
		tokio::time::advance(Duration::from_secs(30)).await;
		assert!(!gate.should_trigger(&event, Instant::now()));
		tokio::time::advance(Duration::from_millis(1)).await;
		assert!(gate.should_trigger(&event, Instant::now()));
	}

	#[tokio::test]
	async fn only_covenant_coins_of_the_account_qualify() {
		let registry = SessionRegistry::new();
		let session = registry.begin(Network::Testnet, Some("xpub".into()), "fuji");
		let gate = EventGate::new(&session, Duration::ZERO);

		assert!(gate.is_qualifying(&covenant_coin("fuji")));
		assert!(!gate.is_qualifying(&covenant_coin("mainAccount")));
		assert!(!gate.is_qualifying(&plain_coin()));
		assert!(!gate.is_qualifying(&CoinEvent::NewUtxo(None)));
	}

	#[tokio::test(start_paused = true)]
	async fn forwards_events_after_the_guard() {
		let wallet = FakeWalletBridge::default();
		let registry = SessionRegistry::new();
		let session = registry.begin(Network::Testnet, Some("xpub".into()), "fuji");

		let runs = Arc::new(AtomicUsize::new(0));
		let scheduler = CycleScheduler::spawn({
			let runs = runs.clone();
			move |_| {
				let runs = runs.clone();
				async move {
					runs.fetch_add(1, Ordering::SeqCst);
				}
			}
		});

		let gate = EventGate::new(&session, DEFAULT_GUARD_WINDOW);
		let _handle = gate
			.subscribe(&wallet, session, scheduler.handle())
			.await
			.unwrap();
		assert_eq!(wallet.subscribed_accounts(), vec!["fuji".to_string()]);

		wallet.push_event(covenant_coin("fuji"));
		tokio::time::sleep(Duration::from_secs(1)).await;
		assert_eq!(runs.load(Ordering::SeqCst), 0);

		tokio::time::sleep(Duration::from_secs(30)).await;
		wallet.push_event(plain_coin());
		wallet.push_event(covenant_coin("fuji"));
		tokio::time::sleep(Duration::from_secs(1)).await;
		assert_eq!(runs.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn dropping_the_handle_unsubscribes() {
		let wallet = FakeWalletBridge::default();
		let registry = SessionRegistry::new();
		let session = registry.begin(Network::Testnet, Some("xpub".into()), "fuji");
		let scheduler = CycleScheduler::spawn(|_| async {});

		let handle = EventGate::new(&session, DEFAULT_GUARD_WINDOW)
			.subscribe(&wallet, session, scheduler.handle())
			.await
			.unwrap();
		assert_eq!(wallet.live_subscriptions(), 1);

		drop(handle);
		tokio::time::sleep(Duration::from_millis(1)).await;
		assert_eq!(wallet.live_subscriptions(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn superseded_session_stops_forwarding() {
		let wallet = FakeWalletBridge::default();
		let registry = SessionRegistry::new();
		let session = registry.begin(Network::Testnet, Some("xpub".into()), "fuji");
		let scheduler = CycleScheduler::spawn(|_| async {});

		let handle = EventGate::new(&session, Duration::ZERO)
			.subscribe(&wallet, session, scheduler.handle())
			.await
			.unwrap();

		registry.begin(Network::Liquid, Some("xpub".into()), "fuji");
		wallet.push_event(covenant_coin("fuji"));
		tokio::time::sleep(Duration::from_millis(1)).await;
		assert!(handle.is_finished());
	}
}
