//! Session context for one `(network, owner key)` pair.
//!
//! A session is created whenever the active network or owner key changes. Every
//! task working on behalf of a session holds a [`SessionContext`]; once a newer
//! session starts, [`SessionContext::is_current`] turns false and results from the
//! old one are discarded instead of persisted.
//!
//! Writes made for a session hold its commit guard, which is only granted while
//! the session is current. [`SessionRegistry::settle`] waits for any write still
//! holding a guard, so after a switch has settled no older session can persist.

use crate::contract::Network;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

/// Hands out session generations. One per service.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
	current: Arc<AtomicU64>,
	commits: Arc<Mutex<()>>,
}

impl SessionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Start a new session, superseding whichever one was current.
	pub fn begin(
		&self,
		network: Network,
		owner_key: Option<String>,
		account_id: impl Into<String>,
	) -> SessionContext {
		let generation = self.current.fetch_add(1, Ordering::SeqCst) + 1;
		SessionContext {
			network,
			owner_key,
			account_id: account_id.into(),
			started_at: Instant::now(),
			generation,
			current: self.current.clone(),
			commits: self.commits.clone(),
		}
	}

	/// Wait until no write of any session is in progress.
	pub async fn settle(&self) {
		let _idle = self.commits.lock().await;
	}

	/// Invalidate the current session without starting another.
	pub fn end_current(&self) {
		self.current.fetch_add(1, Ordering::SeqCst);
	}
}

#[derive(Debug, Clone)]
pub struct SessionContext {
	pub network: Network,
	/// Extended public key of the active account; `None` until the wallet provides it.
	pub owner_key: Option<String>,
	/// Wallet account whose covenant coins are tracked.
	pub account_id: String,
	pub started_at: Instant,
	generation: u64,
	current: Arc<AtomicU64>,
	commits: Arc<Mutex<()>>,
}

impl SessionContext {
	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub fn is_current(&self) -> bool {
		self.current.load(Ordering::SeqCst) == self.generation
	}

	/// Guard to hold while persisting for this session, or `None` once superseded.
	pub async fn commit_guard(&self) -> Option<OwnedMutexGuard<()>> {
		let guard = self.commits.clone().lock_owned().await;
		self.is_current().then_some(guard)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[test]
	fn newer_session_supersedes_older() {
		let registry = SessionRegistry::new();
		let first = registry.begin(Network::Testnet, Some("a".into()), "fuji");
		assert!(first.is_current());

		let second = registry.begin(Network::Liquid, Some("a".into()), "fuji");
		assert!(!first.is_current());
		assert!(second.is_current());
		assert!(second.generation() > first.generation());

		registry.end_current();
		assert!(!second.is_current());
	}

	#[tokio::test(start_paused = true)]
	async fn settle_waits_for_an_in_flight_commit() {
		let registry = SessionRegistry::new();
		let old = registry.begin(Network::Testnet, Some("a".into()), "fuji");
		let guard = old.commit_guard().await.unwrap();
		let writer = tokio::spawn(async move {
			tokio::time::sleep(Duration::from_secs(5)).await;
			drop(guard);
		});

		let fresh = registry.begin(Network::Liquid, Some("a".into()), "fuji");
		let started = Instant::now();
		registry.settle().await;
		assert!(started.elapsed() >= Duration::from_secs(5));
		writer.await.unwrap();

		assert!(old.commit_guard().await.is_none());
		assert!(fresh.commit_guard().await.is_some());
	}
}
