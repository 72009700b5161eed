//! Wallet bridge integration.
//!
//! `bridge` talks to the connected wallet, `sync` adopts wallet-known contracts
//! into local storage, `types` holds the wallet's wire types and errors.

pub mod bridge;
pub mod sync;
pub mod types;

pub use bridge::{CoinEventStream, WalletBridge, WalletBridgeClient};
pub use sync::{AdoptionReport, WalletContractSync};
pub use types::*;
