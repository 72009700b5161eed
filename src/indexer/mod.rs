//! Chain indexer integration module
//!
//! This module provides the query boundary and types for interacting with the chain
//! indexing service. The indexer answers two questions for reconciliation: which
//! transactions touched a covenant script, and whether (and how) a funding output
//! was spent.

/// REST client and the `ChainSource` boundary trait
mod client;
/// Type definitions for indexer data structures
mod types;

pub use client::{ChainSource, EsploraIndexerClient};
pub use types::*;
