use crate::indexer::IndexerError;
use crate::store::StoreError;
use crate::wallet::WalletBridgeError;

/// Why a reconciliation cycle ended without persisting results.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
	#[error("Indexer unavailable: {0}")]
	IndexerError(#[from] IndexerError),

	#[error("Wallet bridge unavailable: {0}")]
	WalletBridgeError(#[from] WalletBridgeError),

	#[error("Storage error: {0}")]
	StorageError(#[from] StoreError),

	#[error("Owner key not available yet")]
	MissingOwnerKey,

	#[error("Session superseded before results were persisted")]
	Cancelled,
}

impl ReconcileError {
	/// Network failures are transient: the next trigger runs a fresh cycle.
	pub fn is_network(&self) -> bool {
		matches!(
			self,
			ReconcileError::IndexerError(_) | ReconcileError::WalletBridgeError(_)
		)
	}
}
