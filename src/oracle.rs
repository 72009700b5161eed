//! Oracle registry.
//!
//! Oracles sign the price feeds contracts are liquidated against. The service only
//! lists them per network so consumers can show which ones are usable; an empty
//! `pubkey` means the oracle has no key on that network.

use crate::contract::Network;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oracle {
	pub id: String,
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub pubkey: String,
	#[serde(default)]
	pub disabled: bool,
}

impl Oracle {
	/// Enabled and keyed on the network it was fetched for.
	pub fn is_usable(&self) -> bool {
		!self.disabled && !self.pubkey.is_empty()
	}
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("Unexpected status {status} from {url}")]
	StatusError {
		url: String,
		status: reqwest::StatusCode,
	},
}

#[async_trait]
pub trait OracleRegistry: Send + Sync {
	async fn fetch_oracles(&self, network: Network) -> Result<Vec<Oracle>, OracleError>;
}

/// Oracle list served over HTTP at `{base}/oracles?network=`.
#[derive(Clone)]
pub struct HttpOracleRegistry {
	http_client: Client,
	base_url: String,
}

impl HttpOracleRegistry {
	pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, OracleError> {
		Ok(Self {
			http_client: Client::builder().timeout(request_timeout).build()?,
			base_url: base_url.into().trim_end_matches('/').to_string(),
		})
	}
}

#[async_trait]
impl OracleRegistry for HttpOracleRegistry {
	async fn fetch_oracles(&self, network: Network) -> Result<Vec<Oracle>, OracleError> {
		let url = format!("{}/oracles", self.base_url);
		let response = self
			.http_client
			.get(&url)
			.query(&[("network", network.as_str())])
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(OracleError::StatusError {
				url,
				status: response.status(),
			});
		}

		let oracles: Vec<Oracle> = response.json().await?;
		debug!("Fetched {} oracles for {}", oracles.len(), network);
		Ok(oracles)
	}
}
