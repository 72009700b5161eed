//! Contract Synchronization Module
//!
//! This module provides the logic and services that keep locally stored contracts in step with
//! the chain and the connected wallet. It is composed of several submodules:
//!
//! - `orchestrator`: The consumer-facing `ContractSyncService`. It owns the active session and wires together every other component.
//! - `reconciler`: Runs one reconciliation cycle: gathers evidence, advances contracts, persists the batch.
//! - `scheduler`: Runs cycles one at a time and coalesces requests that arrive while one is in flight.
//! - `events`: Gates wallet coin events into cycle requests, ignoring the replay burst after a session starts.
//! - `session`: Session generations used to discard results of superseded sessions.
//! - `progress_tracker`: Per-cycle counters and the resulting `CycleReport`.
//!
//! A session starts with wallet adoption and a first cycle, then fetches oracles and opens the event gate.

/// Wallet coin-event gate
pub mod events;
/// Consumer-facing service and session lifecycle
pub mod orchestrator;
/// Per-cycle statistics
pub mod progress_tracker;
/// Reconciliation cycle
pub mod reconciler;
/// Coalescing cycle scheduler
pub mod scheduler;
/// Session generations
pub mod session;
/// Cycle error types
pub mod types;

pub use orchestrator::*;
pub use types::ReconcileError;
