//! Coalescing cycle scheduler.
//!
//! At most one reconciliation cycle runs at a time per session. Requests that
//! arrive while a cycle is in flight collapse into a single follow-up cycle; any
//! further requests before that follow-up starts are dropped, since the follow-up
//! will observe their effects anyway.

use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Why a cycle was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger {
	Startup,
	WalletEvent,
	Explicit,
}

/// Cheap, clonable handle for requesting cycles.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
	pending: mpsc::Sender<CycleTrigger>,
}

impl TriggerHandle {
	/// Request a cycle. Returns `false` when the request was coalesced into one
	/// already pending, or the scheduler has stopped.
	pub fn request(&self, trigger: CycleTrigger) -> bool {
		match self.pending.try_send(trigger) {
			Ok(()) => true,
			Err(mpsc::error::TrySendError::Full(_)) => {
				debug!("Cycle already pending, coalescing {:?} request", trigger);
				false
			}
			Err(mpsc::error::TrySendError::Closed(_)) => {
				debug!("Scheduler stopped, dropping {:?} request", trigger);
				false
			}
		}
	}
}

/// Owns the worker task that runs cycles one after another.
///
/// Dropping the scheduler aborts the worker, cancelling an in-flight cycle.
pub struct CycleScheduler {
	handle: TriggerHandle,
	worker: JoinHandle<()>,
}

impl CycleScheduler {
	pub fn spawn<F, Fut>(run_cycle: F) -> Self
	where
		F: Fn(CycleTrigger) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		// one slot: the follow-up cycle
		let (pending, mut requests) = mpsc::channel(1);
		let worker = tokio::spawn(async move {
			while let Some(trigger) = requests.recv().await {
				debug!("Starting cycle ({:?})", trigger);
				run_cycle(trigger).await;
			}
		});

		Self {
			handle: TriggerHandle { pending },
			worker,
		}
	}

	pub fn handle(&self) -> TriggerHandle {
		self.handle.clone()
	}

	pub fn request(&self, trigger: CycleTrigger) -> bool {
		self.handle.request(trigger)
	}

	pub fn stop(&self) {
		self.worker.abort();
	}
}

impl Drop for CycleScheduler {
	fn drop(&mut self) {
		self.worker.abort();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	fn counting_scheduler(
		cycle_time: Duration,
	) -> (CycleScheduler, Arc<AtomicUsize>, Arc<AtomicUsize>) {
		let runs = Arc::new(AtomicUsize::new(0));
		let running = Arc::new(AtomicUsize::new(0));
		let max_parallel = Arc::new(AtomicUsize::new(0));
		let scheduler = CycleScheduler::spawn({
			let runs = runs.clone();
			let max_parallel = max_parallel.clone();
			move |_| {
				let runs = runs.clone();
				let running = running.clone();
				let max_parallel = max_parallel.clone();
				async move {
					let now = running.fetch_add(1, Ordering::SeqCst) + 1;
					max_parallel.fetch_max(now, Ordering::SeqCst);
					tokio::time::sleep(cycle_time).await;
					running.fetch_sub(1, Ordering::SeqCst);
					runs.fetch_add(1, Ordering::SeqCst);
				}
			}
		});
		(scheduler, runs, max_parallel)
	}

	#[tokio::test(start_paused = true)]
	async fn requests_during_a_cycle_collapse_into_one_follow_up() {
		let (scheduler, runs, max_parallel) = counting_scheduler(Duration::from_secs(5));

		assert!(scheduler.request(CycleTrigger::Startup));
		// let the worker pick up the first request
		tokio::time::sleep(Duration::from_millis(1)).await;

		assert!(scheduler.request(CycleTrigger::WalletEvent));
		assert!(!scheduler.request(CycleTrigger::WalletEvent));
		assert!(!scheduler.handle().request(CycleTrigger::Explicit));

		tokio::time::sleep(Duration::from_secs(30)).await;
		assert_eq!(runs.load(Ordering::SeqCst), 2);
		assert_eq!(max_parallel.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn idle_scheduler_runs_each_request() {
		let (scheduler, runs, _) = counting_scheduler(Duration::from_millis(10));

		for _ in 0..3 {
			assert!(scheduler.request(CycleTrigger::Explicit));
			tokio::time::sleep(Duration::from_secs(1)).await;
		}
		assert_eq!(runs.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn dropping_the_scheduler_cancels_the_cycle() {
		let (scheduler, runs, _) = counting_scheduler(Duration::from_secs(5));
		let handle = scheduler.handle();
		scheduler.request(CycleTrigger::Startup);
		tokio::time::sleep(Duration::from_millis(1)).await;

		drop(scheduler);
		tokio::time::sleep(Duration::from_secs(10)).await;

		assert_eq!(runs.load(Ordering::SeqCst), 0);
		assert!(!handle.request(CycleTrigger::Explicit));
	}
}
