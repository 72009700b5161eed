use crate::contract::ContractId;
use crate::store::StoreError;

use serde::{Deserialize, Serialize};

/// Script details tag the wallet uses for covenant outputs.
pub const COVENANT_SCRIPT_TYPE: &str = "ionio-artifact";

/// An output currently controlled by the wallet account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
	pub txid: String,
	pub vout: u32,
	#[serde(default)]
	pub asset: Option<String>,
	#[serde(default)]
	pub value: Option<u64>,
}

impl Coin {
	pub fn outpoint(&self) -> ContractId {
		ContractId::new(self.txid.clone(), self.vout)
	}
}

/// Extra parameters the wallet keeps for a covenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletContractParams {
	/// Little-endian u64 seconds, hex encoded.
	#[serde(default)]
	pub setup_timestamp: Option<String>,
}

/// A contract as reported by the wallet bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletContract {
	pub txid: Option<String>,
	#[serde(default)]
	pub vout: u32,
	pub collateral_asset: String,
	#[serde(default)]
	pub collateral_amount: u64,
	pub synthetic_asset: String,
	#[serde(default)]
	pub synthetic_amount: u64,
	#[serde(default)]
	pub ratio: u32,
	#[serde(default)]
	pub oracle_id: Option<String>,
	#[serde(default)]
	pub funding_script: Option<String>,
	#[serde(default)]
	pub contract_params: Option<WalletContractParams>,
}

impl WalletContract {
	pub fn identity(&self) -> Option<ContractId> {
		self.txid
			.as_ref()
			.map(|txid| ContractId::new(txid.clone(), self.vout))
	}
}

/// How the wallet describes the script of an output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScriptDetails {
	#[serde(rename = "ionio-artifact")]
	Covenant {
		#[serde(rename = "accountName")]
		account_name: String,
	},
	#[serde(other)]
	Other,
}

/// Output referenced by a coin event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utxo {
	pub txid: String,
	pub vout: u32,
	#[serde(default)]
	pub script_details: Option<ScriptDetails>,
}

impl Utxo {
	/// Account name when the output belongs to a covenant.
	pub fn covenant_account(&self) -> Option<&str> {
		match &self.script_details {
			Some(ScriptDetails::Covenant { account_name }) => Some(account_name),
			_ => None,
		}
	}
}

/// Coin-change notification pushed by the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoinEvent {
	NewUtxo(Option<Utxo>),
	SpentUtxo(Option<Utxo>),
}

impl CoinEvent {
	pub fn utxo(&self) -> Option<&Utxo> {
		match self {
			CoinEvent::NewUtxo(utxo) | CoinEvent::SpentUtxo(utxo) => utxo.as_ref(),
		}
	}
}

/// Error types for the wallet bridge
#[derive(Debug, thiserror::Error)]
pub enum WalletBridgeError {
	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("Unexpected status {status} from {url}")]
	StatusError {
		url: String,
		status: reqwest::StatusCode,
	},

	#[error("WebSocket error: {0}")]
	WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("Subscription error: {0}")]
	SubscriptionError(String),
}

/// Error types for adopting wallet-known contracts
#[derive(Debug, thiserror::Error)]
pub enum WalletSyncError {
	#[error("Wallet bridge error: {0}")]
	BridgeError(#[from] WalletBridgeError),

	#[error("Store error: {0}")]
	StoreError(#[from] StoreError),
}
