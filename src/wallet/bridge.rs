//!
//! Client for the wallet bridge.
//!
//! The bridge exposes the wallet's view of the account: the covenants it knows
//! about, its current coin set, and a push channel of coin-change events. Listing
//! goes over HTTP; events arrive over a WebSocket subscription scoped to one
//! account. All methods are async and designed for use with Tokio.

use super::types::*;
use crate::contract::Network;

use async_trait::async_trait;
use futures_util::{SinkExt, Stream, StreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::pin::Pin;
use std::time::Duration;
use tokio_tungstenite::{
	connect_async,
	tungstenite::{Message, client::IntoClientRequest},
};
use tracing::{debug, error, info};

/// Stream of coin events for one subscription. Dropping it unsubscribes.
pub type CoinEventStream = Pin<Box<dyn Stream<Item = Result<CoinEvent, WalletBridgeError>> + Send>>;

/// Boundary to the connected wallet.
#[async_trait]
pub trait WalletBridge: Send + Sync {
	/// Contracts the wallet knows about on `network`.
	async fn list_contracts(&self, network: Network)
	-> Result<Vec<WalletContract>, WalletBridgeError>;

	/// Outputs currently controlled by the wallet on `network`.
	async fn list_coins(&self, network: Network) -> Result<Vec<Coin>, WalletBridgeError>;

	/// Subscribe to new/spent coin notifications for `account_id`.
	async fn subscribe_coin_events(
		&self,
		account_id: &str,
	) -> Result<CoinEventStream, WalletBridgeError>;
}

/// HTTP + WebSocket wallet bridge client
#[derive(Clone)]
pub struct WalletBridgeClient {
	http_client: Client,
	/// Base URL for listing endpoints.
	bridge_url: String,
	/// WebSocket URL for coin event subscriptions.
	events_url: String,
}

impl WalletBridgeClient {
	/// Create a new wallet bridge client.
	///
	/// # Arguments
	/// * `bridge_url` - HTTP endpoint serving `/contracts` and `/coins`.
	/// * `events_url` - WebSocket endpoint pushing coin events.
	/// * `request_timeout` - Timeout for a single HTTP request.
	pub fn new(
		bridge_url: impl Into<String>,
		events_url: impl Into<String>,
		request_timeout: Duration,
	) -> Result<Self, WalletBridgeError> {
		let http_client = Client::builder().timeout(request_timeout).build()?;

		Ok(Self {
			http_client,
			bridge_url: bridge_url.into().trim_end_matches('/').to_string(),
			events_url: events_url.into(),
		})
	}

	async fn get_json<T: DeserializeOwned>(
		&self,
		path: &str,
		network: Network,
	) -> Result<T, WalletBridgeError> {
		let url = format!("{}/{}", self.bridge_url, path);
		let response = self
			.http_client
			.get(&url)
			.query(&[("network", network.as_str())])
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(WalletBridgeError::StatusError {
				url,
				status: response.status(),
			});
		}

		let body = response.text().await?;
		Ok(serde_json::from_str(&body)?)
	}

	/// Translate one pushed message into a coin event, `None` for messages to skip.
	fn parse_event_message(text: &str) -> Option<Result<CoinEvent, WalletBridgeError>> {
		let parsed: serde_json::Value = match serde_json::from_str(text) {
			Ok(parsed) => parsed,
			Err(e) => return Some(Err(WalletBridgeError::JsonError(e))),
		};

		let Some(msg_type) = parsed.get("type").and_then(|t| t.as_str()) else {
			return Some(Err(WalletBridgeError::SubscriptionError(
				"Message missing type field".to_string(),
			)));
		};

		let utxo = || -> Result<Option<Utxo>, WalletBridgeError> {
			match parsed.get("data") {
				Some(data) if !data.is_null() => Ok(Some(serde_json::from_value(data.clone())?)),
				_ => Ok(None),
			}
		};

		match msg_type {
			"NEW_UTXO" => Some(utxo().map(CoinEvent::NewUtxo)),
			"SPENT_UTXO" => Some(utxo().map(CoinEvent::SpentUtxo)),
			"error" => {
				let error_msg = parsed
					.get("message")
					.and_then(|m| m.as_str())
					.unwrap_or("Unknown subscription error");
				Some(Err(WalletBridgeError::SubscriptionError(
					error_msg.to_string(),
				)))
			}
			_ => {
				debug!("Ignoring wallet message type: {}", msg_type);
				None
			}
		}
	}
}

#[async_trait]
impl WalletBridge for WalletBridgeClient {
	async fn list_contracts(
		&self,
		network: Network,
	) -> Result<Vec<WalletContract>, WalletBridgeError> {
		self.get_json("contracts", network).await
	}

	async fn list_coins(&self, network: Network) -> Result<Vec<Coin>, WalletBridgeError> {
		self.get_json("coins", network).await
	}

	async fn subscribe_coin_events(
		&self,
		account_id: &str,
	) -> Result<CoinEventStream, WalletBridgeError> {
		debug!("Attempting WebSocket connection to: {}", self.events_url);

		let request = self.events_url.clone().into_client_request()?;
		let (ws_stream, response) = connect_async(request).await?;
		debug!(
			"WebSocket connection established, response status: {}",
			response.status()
		);
		let (mut ws_sender, mut ws_receiver) = ws_stream.split();

		let subscribe_message = json!({
			"type": "subscribe",
			"events": ["NEW_UTXO", "SPENT_UTXO"],
			"accountId": account_id,
		});
		ws_sender
			.send(Message::Text(subscribe_message.to_string()))
			.await?;

		// Wait for subscription ack
		match ws_receiver.next().await {
			Some(msg) => match msg? {
				Message::Text(text) => {
					let parsed: serde_json::Value = serde_json::from_str(&text)?;
					if parsed.get("type") != Some(&serde_json::Value::String("subscribed".to_string()))
					{
						return Err(WalletBridgeError::SubscriptionError(
							"Subscription not acknowledged".to_string(),
						));
					}
				}
				_ => {
					return Err(WalletBridgeError::SubscriptionError(
						"Unexpected message type during handshake".to_string(),
					));
				}
			},
			None => {
				return Err(WalletBridgeError::SubscriptionError(
					"Connection closed during handshake".to_string(),
				));
			}
		}

		info!("Subscribed to coin events for account {}", account_id);

		// the sender half rides along so the socket lives exactly as long as the stream
		let stream = ws_receiver
			.filter_map(|msg| async move {
				match msg {
					Ok(Message::Text(text)) => Self::parse_event_message(&text),
					Ok(Message::Close(_)) => {
						debug!("Wallet event socket closed by peer");
						None
					}
					Ok(_) => None,
					Err(e) => {
						error!("Wallet event socket error: {}", e);
						Some(Err(WalletBridgeError::WebSocketError(e)))
					}
				}
			})
			.map(move |event| {
				let _keepalive = &ws_sender;
				event
			});

		Ok(Box::pin(stream))
	}
}
