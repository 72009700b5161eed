//! Progress tracking for reconciliation cycles.
//!
//! This module provides the `CycleTracker`, which counts what happened to each
//! contract during one cycle (skipped, unchanged, transitioned, rejected) and turns
//! the counts into a `CycleReport` that is logged when the cycle ends.

use crate::contract::ContractState;

use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// Counts outcomes while a cycle runs.
#[derive(Debug, Clone)]
pub struct CycleTracker {
    started: Instant,
    scanned: usize,
    skipped_missing_txid: usize,
    skipped_terminal: usize,
    skipped_missing_script: usize,
    unchanged: usize,
    rejected: usize,
    transitions: BTreeMap<ContractState, usize>,
}

impl CycleTracker {
    pub fn new(scanned: usize) -> Self {
        Self {
            started: Instant::now(),
            scanned,
            skipped_missing_txid: 0,
            skipped_terminal: 0,
            skipped_missing_script: 0,
            unchanged: 0,
            rejected: 0,
            transitions: BTreeMap::new(),
        }
    }

    pub fn record_missing_txid(&mut self) {
        self.skipped_missing_txid += 1;
    }

    pub fn record_terminal(&mut self) {
        self.skipped_terminal += 1;
    }

    pub fn record_missing_script(&mut self) {
        self.skipped_missing_script += 1;
    }

    pub fn record_unchanged(&mut self) {
        self.unchanged += 1;
    }

    /// A transition the state machine refused.
    pub fn record_rejected(&mut self) {
        self.rejected += 1;
    }

    pub fn record_transition(&mut self, to: ContractState) {
        *self.transitions.entry(to).or_default() += 1;
    }

    pub fn finish(self) -> CycleReport {
        CycleReport {
            scanned: self.scanned,
            skipped_missing_txid: self.skipped_missing_txid,
            skipped_terminal: self.skipped_terminal,
            skipped_missing_script: self.skipped_missing_script,
            unchanged: self.unchanged,
            rejected: self.rejected,
            transitions: self.transitions,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Statistics about one reconciliation cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub scanned: usize,
    pub skipped_missing_txid: usize,
    pub skipped_terminal: usize,
    pub skipped_missing_script: usize,
    pub unchanged: usize,
    pub rejected: usize,
    /// Number of contracts that moved into each state.
    pub transitions: BTreeMap<ContractState, usize>,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn transitioned(&self) -> usize {
        self.transitions.values().sum()
    }

    pub fn transitions_to(&self, state: ContractState) -> usize {
        self.transitions.get(&state).copied().unwrap_or(0)
    }

    /// Get a human-readable summary of the cycle
    pub fn summary(&self) -> String {
        let skipped =
            self.skipped_missing_txid + self.skipped_terminal + self.skipped_missing_script;
        let moves = self
            .transitions
            .iter()
            .map(|(state, count)| format!("{}={}", state, count))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Cycle over {} contracts in {:?}: {} transitioned{}, {} unchanged, {} skipped{}",
            self.scanned,
            self.elapsed,
            self.transitioned(),
            if moves.is_empty() {
                String::new()
            } else {
                format!(" ({})", moves)
            },
            self.unchanged,
            skipped,
            if self.rejected == 0 {
                String::new()
            } else {
                format!(", {} rejected", self.rejected)
            }
        )
    }
}
