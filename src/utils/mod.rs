//!
//! Utility module for contract state sync.
//!
//! Re-exports decoding and time helpers used by the wallet and indexer layers.
/// Hex and timestamp helpers
pub mod index;

pub use index::{Hex64Error, hex64_le_to_u64, unix_seconds_to_datetime};
