//! Adoption of wallet-known contracts into local storage.
//!
//! The wallet can know about covenants that local storage does not, e.g. when the
//! same account is used from more than one device. Sync pulls the wallet's list,
//! diffs it by funding outpoint against every locally stored record for the
//! network, and stores the missing ones tagged with the session's owner key.
//! Sync only ever adds records.

use crate::contract::{Contract, ContractId, ContractParams, Network};
use crate::store::ContractRepository;
use crate::utils::{hex64_le_to_u64, unix_seconds_to_datetime};
use crate::wallet::{WalletBridge, WalletContract, WalletSyncError};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one wallet sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdoptionReport {
	pub reported: usize,
	pub already_known: usize,
	pub adopted: Vec<ContractId>,
}

pub struct WalletContractSync {
	wallet: Arc<dyn WalletBridge>,
	store: Arc<dyn ContractRepository>,
}

impl WalletContractSync {
	pub fn new(wallet: Arc<dyn WalletBridge>, store: Arc<dyn ContractRepository>) -> Self {
		Self { wallet, store }
	}

	/// Adopt every contract the wallet reports on `network` that is missing locally.
	pub async fn sync(
		&self,
		network: Network,
		owner_key: &str,
	) -> Result<AdoptionReport, WalletSyncError> {
		let wallet_contracts = self.wallet.list_contracts(network).await?;
		let known: HashSet<ContractId> = self
			.store
			.find_all()
			.await?
			.iter()
			.filter(|c| c.network == network)
			.filter_map(Contract::identity)
			.collect();

		let mut report = AdoptionReport {
			reported: wallet_contracts.len(),
			..Default::default()
		};

		let mut adopted = Vec::new();
		for (id, wallet_contract) in wallet_contracts
			.into_iter()
			.filter_map(|wc| wc.identity().map(|id| (id, wc)))
			.unique_by(|(id, _)| id.clone())
		{
			if known.contains(&id) {
				report.already_known += 1;
				continue;
			}
			debug!("Adopting wallet contract {}", id);
			adopted.push(Self::adopt(wallet_contract, network, owner_key));
			report.adopted.push(id);
		}

		if !adopted.is_empty() {
			self.store.upsert_batch(adopted).await?;
			info!(
				"Adopted {} of {} wallet contracts on {}",
				report.adopted.len(),
				report.reported,
				network
			);
		}

		Ok(report)
	}

	fn adopt(wallet_contract: WalletContract, network: Network, owner_key: &str) -> Contract {
		let setup_timestamp = wallet_contract
			.contract_params
			.as_ref()
			.and_then(|p| p.setup_timestamp.as_deref())
			.and_then(|hex| Self::decode_setup_timestamp(hex));

		let params = ContractParams {
			collateral_asset: wallet_contract.collateral_asset,
			collateral_amount: wallet_contract.collateral_amount,
			synthetic_asset: wallet_contract.synthetic_asset,
			synthetic_amount: wallet_contract.synthetic_amount,
			ratio: wallet_contract.ratio,
			oracle_id: wallet_contract.oracle_id,
			setup_timestamp,
		};

		let contract = Contract::new(wallet_contract.txid, wallet_contract.vout, network, params)
			.with_owner_key(owner_key);
		match wallet_contract.funding_script {
			Some(script) => contract.with_funding_script(script),
			None => contract,
		}
	}

	fn decode_setup_timestamp(hex: &str) -> Option<DateTime<Utc>> {
		match hex64_le_to_u64(hex) {
			Ok(seconds) => i64::try_from(seconds)
				.ok()
				.and_then(unix_seconds_to_datetime),
			Err(e) => {
				warn!("Ignoring malformed setup timestamp {:?}: {}", hex, e);
				None
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::InMemoryContractRepository;
	use crate::testing::FakeWalletBridge;
	use crate::wallet::WalletContractParams;

	fn wallet_contract(txid: &str, setup: Option<&str>) -> WalletContract {
		WalletContract {
			txid: Some(txid.to_string()),
			vout: 0,
			collateral_asset: "lbtc".into(),
			collateral_amount: 200_000,
			synthetic_asset: "fusd".into(),
			synthetic_amount: 50,
			ratio: 150,
			oracle_id: Some("id0".into()),
			funding_script: Some("5120".to_string() + &"ab".repeat(32)),
			contract_params: setup.map(|s| WalletContractParams {
				setup_timestamp: Some(s.to_string()),
			}),
		}
	}

	fn fixture(
		contracts: Vec<WalletContract>,
	) -> (Arc<FakeWalletBridge>, Arc<InMemoryContractRepository>, WalletContractSync) {
		let wallet = Arc::new(FakeWalletBridge::default());
		wallet.set_contracts(contracts);
		let store = Arc::new(InMemoryContractRepository::new());
		let sync = WalletContractSync::new(wallet.clone(), store.clone());
		(wallet, store, sync)
	}

	#[tokio::test]
	async fn adopts_missing_contracts_with_owner_key() {
		let (_, store, sync) = fixture(vec![
			wallet_contract("aa", Some("0097f16200000000")),
			wallet_contract("bb", None),
		]);

		let report = sync.sync(Network::Testnet, "xpub-me").await.unwrap();
		assert_eq!(report.adopted.len(), 2);

		let mine = store.find_by_owner(Network::Testnet, "xpub-me").await.unwrap();
		assert_eq!(mine.len(), 2);
		let aa = mine.iter().find(|c| c.txid.as_deref() == Some("aa")).unwrap();
		assert_eq!(
			aa.params().setup_timestamp,
			DateTime::from_timestamp(1_660_000_000, 0)
		);
		assert!(aa.funding_script.is_some());
		let bb = mine.iter().find(|c| c.txid.as_deref() == Some("bb")).unwrap();
		assert_eq!(bb.params().setup_timestamp, None);
	}

	#[tokio::test]
	async fn second_sync_adds_no_duplicates() {
		let (_, store, sync) = fixture(vec![
			wallet_contract("aa", None),
			wallet_contract("aa", None),
		]);

		sync.sync(Network::Testnet, "xpub-me").await.unwrap();
		let again = sync.sync(Network::Testnet, "xpub-me").await.unwrap();

		assert!(again.adopted.is_empty());
		assert_eq!(again.already_known, 1);
		assert_eq!(store.find_all().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn never_removes_local_contracts() {
		let (wallet, store, sync) = fixture(vec![wallet_contract("aa", None)]);
		sync.sync(Network::Testnet, "xpub-me").await.unwrap();

		wallet.set_contracts(vec![]);
		sync.sync(Network::Testnet, "xpub-me").await.unwrap();

		assert_eq!(store.find_all().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn malformed_setup_time_is_left_unset() {
		let (_, store, sync) = fixture(vec![wallet_contract("aa", Some("beef"))]);
		sync.sync(Network::Testnet, "xpub-me").await.unwrap();

		let all = store.find_all().await.unwrap();
		assert_eq!(all[0].params().setup_timestamp, None);
	}

	#[tokio::test]
	async fn contracts_known_on_another_network_are_adopted_separately() {
		let (_, store, sync) = fixture(vec![wallet_contract("aa", None)]);
		sync.sync(Network::Liquid, "xpub-me").await.unwrap();
		sync.sync(Network::Testnet, "xpub-me").await.unwrap();

		assert_eq!(store.find_all().await.unwrap().len(), 2);
	}
}
