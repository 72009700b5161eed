//! Types for the chain indexer integration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One transaction touching a script, as seen by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub txid: String,
    /// Block height, `0` while the transaction is only in the mempool.
    pub height: u32,
}

/// Ordered-by-arrival history of a script. Empty means no on-chain activity seen.
pub type History = Vec<HistoryEntry>;

/// Spend of a funding output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendStatus {
    /// The transaction spending the funding output.
    pub spent_txid: String,
    /// Input index of the spend inside `spent_txid`.
    pub vin: u32,
    /// Witness stack of that input.
    pub witness: Vec<Vec<u8>>,
    /// Block time of the spend, or the observation time while unconfirmed.
    pub timestamp: DateTime<Utc>,
}

/// Confirmation status of a transaction as returned by the indexer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxStatus {
    pub confirmed: bool,
    pub block_height: Option<u32>,
    pub block_time: Option<i64>,
}

/// Transaction summary returned by the script history endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerTransaction {
    pub txid: String,
    #[serde(default)]
    pub status: TxStatus,
    #[serde(default)]
    pub vin: Vec<IndexerInput>,
}

impl IndexerTransaction {
    pub fn history_entry(&self) -> HistoryEntry {
        let height = if self.status.confirmed {
            self.status.block_height.unwrap_or(0)
        } else {
            0
        };
        HistoryEntry {
            txid: self.txid.clone(),
            height,
        }
    }
}

/// Transaction input with its hex-encoded witness stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerInput {
    pub txid: Option<String>,
    pub vout: Option<u32>,
    #[serde(default)]
    pub witness: Vec<String>,
}

/// Spend status of a single output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outspend {
    pub spent: bool,
    pub txid: Option<String>,
    pub vin: Option<u32>,
    pub status: Option<TxStatus>,
}

/// Error types for indexer operations
///
/// Every variant is transient from the caller's point of view: the query did not
/// produce an answer and must not be read as "no history" or "unspent".
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    StatusError {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid witness encoding: {0}")]
    WitnessError(#[from] hex::FromHexError),

    #[error("Indexer reports {txid}:{vout} spent but names no spending input")]
    IncompleteOutspend { txid: String, vout: u32 },

    #[error("Spending transaction {txid} has no input {vin}")]
    MissingInput { txid: String, vin: u32 },

    #[error("Indexer returned {got} histories for {expected} scripts")]
    HistoryMismatch { expected: usize, got: usize },
}
