//! In-crate fakes for the service boundaries, shared by unit tests.

use crate::contract::{Contract, ContractId, Network};
use crate::indexer::{ChainSource, History, IndexerError, SpendStatus};
use crate::oracle::{Oracle, OracleError, OracleRegistry};
use crate::store::{ContractRepository, InMemoryContractRepository, StoreError};
use crate::wallet::{
	Coin, CoinEvent, CoinEventStream, WalletBridge, WalletBridgeError, WalletContract,
};

use async_trait::async_trait;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

/// Chain source answering from canned histories and spends.
#[derive(Default)]
pub struct FakeChainSource {
	histories: Mutex<HashMap<String, History>>,
	outspends: Mutex<HashMap<String, SpendStatus>>,
	failing_outspends: Mutex<HashSet<String>>,
	incomplete_outspends: Mutex<HashSet<String>>,
	outspend_calls: Mutex<HashMap<String, usize>>,
	history_calls: Mutex<usize>,
	delay: Mutex<Option<Duration>>,
}

impl FakeChainSource {
	pub fn set_history(&self, script_hex: &str, history: History) {
		self.histories
			.lock()
			.unwrap()
			.insert(script_hex.to_lowercase(), history);
	}

	/// Spend of output 0 of `txid`.
	pub fn set_outspend(&self, txid: &str, spend: SpendStatus) {
		self.outspends
			.lock()
			.unwrap()
			.insert(txid.to_string(), spend);
	}

	pub fn fail_outspend(&self, txid: &str) {
		self.failing_outspends
			.lock()
			.unwrap()
			.insert(txid.to_string());
	}

	/// Answer "spent" for `txid` without naming the spending input.
	pub fn report_incomplete_outspend(&self, txid: &str) {
		self.incomplete_outspends
			.lock()
			.unwrap()
			.insert(txid.to_string());
	}

	/// Make every outspend query sleep first.
	pub fn set_delay(&self, delay: Duration) {
		*self.delay.lock().unwrap() = Some(delay);
	}

	pub fn outspend_calls(&self, txid: &str) -> usize {
		self.outspend_calls
			.lock()
			.unwrap()
			.get(txid)
			.copied()
			.unwrap_or(0)
	}

	pub fn total_outspend_calls(&self) -> usize {
		self.outspend_calls.lock().unwrap().values().sum()
	}

	pub fn history_calls(&self) -> usize {
		*self.history_calls.lock().unwrap()
	}
}

#[async_trait]
impl ChainSource for FakeChainSource {
	async fn fetch_histories(&self, scripts: &[Vec<u8>]) -> Result<Vec<History>, IndexerError> {
		*self.history_calls.lock().unwrap() += 1;
		let histories = self.histories.lock().unwrap();
		Ok(scripts
			.iter()
			.map(|script| histories.get(&hex::encode(script)).cloned().unwrap_or_default())
			.collect())
	}

	async fn fetch_outspend(
		&self,
		contract: &ContractId,
	) -> Result<Option<SpendStatus>, IndexerError> {
		*self
			.outspend_calls
			.lock()
			.unwrap()
			.entry(contract.txid.clone())
			.or_default() += 1;

		let delay = *self.delay.lock().unwrap();
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}

		if self.failing_outspends.lock().unwrap().contains(&contract.txid) {
			let url = format!("fake://tx/{}/outspend/{}", contract.txid, contract.vout);
			return Err(IndexerError::StatusError {
				status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
				url,
			});
		}
		if self.incomplete_outspends.lock().unwrap().contains(&contract.txid) {
			return Err(IndexerError::IncompleteOutspend {
				txid: contract.txid.clone(),
				vout: contract.vout,
			});
		}
		Ok(self.outspends.lock().unwrap().get(&contract.txid).cloned())
	}
}

/// Wallet bridge with settable contract and coin lists and a push channel.
#[derive(Default)]
pub struct FakeWalletBridge {
	contracts: Mutex<Vec<WalletContract>>,
	coins: Mutex<Vec<Coin>>,
	fail_coins: Mutex<bool>,
	subscribers: Mutex<Vec<UnboundedSender<Result<CoinEvent, WalletBridgeError>>>>,
	subscribed_accounts: Mutex<Vec<String>>,
	list_contract_calls: Mutex<usize>,
}

impl FakeWalletBridge {
	pub fn set_contracts(&self, contracts: Vec<WalletContract>) {
		*self.contracts.lock().unwrap() = contracts;
	}

	pub fn set_coins(&self, coins: Vec<Coin>) {
		*self.coins.lock().unwrap() = coins;
	}

	pub fn fail_coins(&self, fail: bool) {
		*self.fail_coins.lock().unwrap() = fail;
	}

	/// Deliver `event` to every live subscription.
	pub fn push_event(&self, event: CoinEvent) {
		self.subscribers
			.lock()
			.unwrap()
			.retain(|tx| tx.unbounded_send(Ok(event.clone())).is_ok());
	}

	/// Number of subscriptions whose stream has not been dropped.
	pub fn live_subscriptions(&self) -> usize {
		let mut subscribers = self.subscribers.lock().unwrap();
		subscribers.retain(|tx| !tx.is_closed());
		subscribers.len()
	}

	pub fn subscribed_accounts(&self) -> Vec<String> {
		self.subscribed_accounts.lock().unwrap().clone()
	}

	pub fn list_contract_calls(&self) -> usize {
		*self.list_contract_calls.lock().unwrap()
	}
}

#[async_trait]
impl WalletBridge for FakeWalletBridge {
	async fn list_contracts(
		&self,
		_network: Network,
	) -> Result<Vec<WalletContract>, WalletBridgeError> {
		*self.list_contract_calls.lock().unwrap() += 1;
		Ok(self.contracts.lock().unwrap().clone())
	}

	async fn list_coins(&self, _network: Network) -> Result<Vec<Coin>, WalletBridgeError> {
		if *self.fail_coins.lock().unwrap() {
			let url = "fake://coins".to_string();
			return Err(WalletBridgeError::StatusError {
				status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
				url,
			});
		}
		Ok(self.coins.lock().unwrap().clone())
	}

	async fn subscribe_coin_events(
		&self,
		account_id: &str,
	) -> Result<CoinEventStream, WalletBridgeError> {
		let (tx, rx) = unbounded();
		self.subscribers.lock().unwrap().push(tx);
		self.subscribed_accounts
			.lock()
			.unwrap()
			.push(account_id.to_string());
		Ok(rx.boxed())
	}
}

/// Oracle registry returning a fixed list, or failing.
#[derive(Default)]
pub struct FakeOracleRegistry {
	oracles: Mutex<Vec<Oracle>>,
	fail: Mutex<bool>,
}

impl FakeOracleRegistry {
	pub fn set_oracles(&self, oracles: Vec<Oracle>) {
		*self.oracles.lock().unwrap() = oracles;
	}

	pub fn fail(&self, fail: bool) {
		*self.fail.lock().unwrap() = fail;
	}
}

#[async_trait]
impl OracleRegistry for FakeOracleRegistry {
	async fn fetch_oracles(&self, _network: Network) -> Result<Vec<Oracle>, OracleError> {
		if *self.fail.lock().unwrap() {
			let url = "fake://oracles".to_string();
			return Err(OracleError::StatusError {
				status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
				url,
			});
		}
		Ok(self.oracles.lock().unwrap().clone())
	}
}

/// In-memory store whose writes can be made to fail or stall.
#[derive(Default)]
pub struct FakeContractRepository {
	records: InMemoryContractRepository,
	fail_writes: Mutex<bool>,
	write_delay: Mutex<Option<Duration>>,
}

impl FakeContractRepository {
	pub fn fail_writes(&self, fail: bool) {
		*self.fail_writes.lock().unwrap() = fail;
	}

	/// Make every batch write sleep before it lands.
	pub fn set_write_delay(&self, delay: Duration) {
		*self.write_delay.lock().unwrap() = Some(delay);
	}
}

#[async_trait]
impl ContractRepository for FakeContractRepository {
	async fn find_by_owner(
		&self,
		network: Network,
		owner_key: &str,
	) -> Result<Vec<Contract>, StoreError> {
		self.records.find_by_owner(network, owner_key).await
	}

	async fn find_all(&self) -> Result<Vec<Contract>, StoreError> {
		self.records.find_all().await
	}

	async fn upsert_batch(&self, contracts: Vec<Contract>) -> Result<(), StoreError> {
		let delay = *self.write_delay.lock().unwrap();
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
		if *self.fail_writes.lock().unwrap() {
			return Err(StoreError::IoError(std::io::Error::other("disk full")));
		}
		self.records.upsert_batch(contracts).await
	}
}
