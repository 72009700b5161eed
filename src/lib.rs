//! Keeps collateralized synthetic-asset contracts in step with the chain and the
//! connected wallet, and publishes them to consumers as one consistent snapshot.
//!
//! [`sync::ContractSyncService`] is the entry point. The binary wires it to the
//! Esplora indexer, the wallet bridge, the oracle registry and a JSON store.

pub mod config;
pub mod contract;
pub mod indexer;
pub mod oracle;
pub mod store;
pub mod sync;
#[cfg(test)]
mod testing;
pub mod utils;
pub mod wallet;
