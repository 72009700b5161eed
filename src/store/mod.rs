//! Contract persistence.
//!
//! The engine treats storage as a capability: read contracts for an owner, read
//! everything, upsert records. [`FileContractRepository`] keeps them in a JSON
//! document; [`InMemoryContractRepository`] backs tests and ephemeral sessions.

/// Repository trait and implementations
pub mod repositories;

pub use repositories::*;
