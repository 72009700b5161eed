//! Contract domain: data model, leaf classification and the lifecycle state machine.

/// Activity feed derived from contracts
pub mod activity;
/// Spending-leaf fingerprinting
pub mod classifier;
/// Pure transition function
pub mod state_machine;
/// Contract data model
pub mod types;

pub use activity::{Activity, ActivityKind, derive_activities};
pub use types::*;
