use crate::contract::{Contract, ContractId, Network};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Error types for contract persistence
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	SerializationError(#[from] serde_json::Error),
}

/// Storage capability for contract records.
///
/// Records are keyed by `(network, txid, vout)`; an upsert replaces the record
/// with the same key. Records without a funding txid are kept as well, matched by
/// network, owner and parameters until that position is stored with a txid.
/// Nothing else ever removes a record.
#[async_trait]
pub trait ContractRepository: Send + Sync {
	async fn find_by_owner(
		&self,
		network: Network,
		owner_key: &str,
	) -> Result<Vec<Contract>, StoreError>;

	async fn find_all(&self) -> Result<Vec<Contract>, StoreError>;

	async fn upsert(&self, contract: Contract) -> Result<(), StoreError> {
		self.upsert_batch(vec![contract]).await
	}

	/// Upsert every contract or none of them.
	async fn upsert_batch(&self, contracts: Vec<Contract>) -> Result<(), StoreError>;
}

type RecordKey = (Network, ContractId);

/// Same position, before its funding txid is known.
fn same_position(a: &Contract, b: &Contract) -> bool {
	a.network == b.network && a.owner_key == b.owner_key && a.params() == b.params()
}

/// Every stored record: addressable ones by key, txid-less ones in arrival order.
#[derive(Debug, Clone, Default)]
struct RecordSet {
	keyed: BTreeMap<RecordKey, Contract>,
	pending: Vec<Contract>,
}

impl RecordSet {
	fn from_contracts(contracts: Vec<Contract>) -> Self {
		let mut records = Self::default();
		for contract in contracts {
			match contract.identity() {
				Some(id) => {
					records.keyed.insert((contract.network, id), contract);
				}
				None => records.pending.push(contract),
			}
		}
		records
	}

	fn extend(&mut self, contracts: Vec<Contract>) {
		for contract in contracts {
			match contract.identity() {
				Some(id) => {
					let key = (contract.network, id);
					if !self.keyed.contains_key(&key) {
						// the position just got its txid: drop the pending copy
						self.pending.retain(|p| !same_position(p, &contract));
					}
					self.keyed.insert(key, contract);
				}
				None => match self.pending.iter_mut().find(|p| same_position(p, &contract)) {
					Some(existing) => *existing = contract,
					None => self.pending.push(contract),
				},
			}
		}
	}

	fn len(&self) -> usize {
		self.keyed.len() + self.pending.len()
	}

	fn iter(&self) -> impl Iterator<Item = &Contract> {
		self.keyed.values().chain(self.pending.iter())
	}

	fn into_contracts(self) -> Vec<Contract> {
		self.keyed.into_values().chain(self.pending).collect()
	}
}

/// In-memory implementation of ContractRepository
#[derive(Default)]
pub struct InMemoryContractRepository {
	records: RwLock<RecordSet>,
}

impl InMemoryContractRepository {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl ContractRepository for InMemoryContractRepository {
	async fn find_by_owner(
		&self,
		network: Network,
		owner_key: &str,
	) -> Result<Vec<Contract>, StoreError> {
		let records = self.records.read().await;
		Ok(records
			.iter()
			.filter(|c| c.is_owned_by(network, owner_key))
			.cloned()
			.collect())
	}

	async fn find_all(&self) -> Result<Vec<Contract>, StoreError> {
		Ok(self.records.read().await.iter().cloned().collect())
	}

	async fn upsert_batch(&self, contracts: Vec<Contract>) -> Result<(), StoreError> {
		self.records.write().await.extend(contracts);
		Ok(())
	}
}

/// On-disk document holding every contract record.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ContractDocument {
	updated_at: Option<String>,
	contracts: Vec<Contract>,
}

/// File-based implementation of ContractRepository
///
/// The whole record set lives in one JSON document. Writes go to a temporary
/// file that is renamed over the document, so readers see either the old or the
/// new record set.
pub struct FileContractRepository {
	path: PathBuf,
	write_lock: Mutex<()>,
}

impl FileContractRepository {
	pub fn new(path: PathBuf) -> Self {
		Self {
			path,
			write_lock: Mutex::new(()),
		}
	}

	fn temp_path(&self) -> PathBuf {
		self.path.with_extension("json.tmp")
	}

	async fn load(&self) -> Result<RecordSet, StoreError> {
		let content = match tokio::fs::read_to_string(&self.path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				debug!("No contract store at {:?} yet", self.path);
				return Ok(RecordSet::default());
			}
			Err(e) => return Err(e.into()),
		};

		let document: ContractDocument = serde_json::from_str(&content)?;
		Ok(RecordSet::from_contracts(document.contracts))
	}

	async fn save(&self, records: RecordSet) -> Result<(), StoreError> {
		let count = records.len();
		let document = ContractDocument {
			updated_at: Some(chrono::Utc::now().to_rfc3339()),
			contracts: records.into_contracts(),
		};
		let content = serde_json::to_string_pretty(&document)?;

		if let Some(parent) = self.path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		let temp_path = self.temp_path();
		tokio::fs::write(&temp_path, content).await?;
		tokio::fs::rename(&temp_path, &self.path).await?;

		info!("Saved {} contracts to {:?}", count, self.path);
		Ok(())
	}
}

#[async_trait]
impl ContractRepository for FileContractRepository {
	async fn find_by_owner(
		&self,
		network: Network,
		owner_key: &str,
	) -> Result<Vec<Contract>, StoreError> {
		Ok(self
			.load()
			.await?
			.into_contracts()
			.into_iter()
			.filter(|c| c.is_owned_by(network, owner_key))
			.collect())
	}

	async fn find_all(&self) -> Result<Vec<Contract>, StoreError> {
		Ok(self.load().await?.into_contracts())
	}

	async fn upsert_batch(&self, contracts: Vec<Contract>) -> Result<(), StoreError> {
		if contracts.is_empty() {
			return Ok(());
		}
		let _guard = self.write_lock.lock().await;
		let mut records = self.load().await?;
		records.extend(contracts);
		self.save(records).await
	}
}
