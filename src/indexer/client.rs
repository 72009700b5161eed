//!
//! HTTP client for an Esplora-style chain indexer.
//!
//! This module provides the [`ChainSource`] boundary used by reconciliation and an
//! async implementation backed by the indexer's REST API. Script histories are
//! looked up by the sha256 of the output script; spends are looked up per outpoint
//! and resolved to the witness of the spending input. All methods are async and
//! designed for use with Tokio.

use super::types::*;
use crate::contract::ContractId;
use crate::utils::unix_seconds_to_datetime;

use async_trait::async_trait;
use backoff::{ExponentialBackoffBuilder, future::retry};
use chrono::Utc;
use futures::future::try_join_all;
use reqwest::Client;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

/// Query boundary over the chain indexing service.
#[async_trait]
pub trait ChainSource: Send + Sync {
	/// One history per input script, in the same order as `scripts`.
	async fn fetch_histories(&self, scripts: &[Vec<u8>]) -> Result<Vec<History>, IndexerError>;

	/// Spend of the funding output, `None` while it is unspent.
	async fn fetch_outspend(
		&self,
		contract: &ContractId,
	) -> Result<Option<SpendStatus>, IndexerError>;
}

/// Esplora REST indexer client
#[derive(Clone)]
pub struct EsploraIndexerClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL of the indexer API, without trailing slash.
	base_url: String,
	/// Upper bound on time spent retrying one request.
	max_retry_elapsed: Duration,
}

impl EsploraIndexerClient {
	/// Create a new indexer client.
	///
	/// # Arguments
	/// * `base_url` - The REST endpoint, e.g. `https://blockstream.info/liquidtestnet/api`.
	/// * `request_timeout` - Timeout for a single HTTP request.
	/// * `max_retry_elapsed` - Upper bound on retries of a request failing at transport level.
	pub fn new(
		base_url: impl Into<String>,
		request_timeout: Duration,
		max_retry_elapsed: Duration,
	) -> Result<Self, IndexerError> {
		let http_client = Client::builder().timeout(request_timeout).build()?;

		Ok(Self {
			http_client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			max_retry_elapsed,
		})
	}

	/// Electrum-style script hash as used by Esplora: hex of sha256(script).
	pub fn script_hash(script: &[u8]) -> String {
		hex::encode(Sha256::digest(script))
	}

	/// GET a JSON document, retrying transport failures with exponential backoff.
	/// The input spending `contract`, if it is spent. A spent output without a
	/// spending input is an incomplete answer, not an unspent one.
	fn spending_input(
		contract: &ContractId,
		outspend: Outspend,
	) -> Result<Option<(String, u32)>, IndexerError> {
		if !outspend.spent {
			return Ok(None);
		}
		match (outspend.txid, outspend.vin) {
			(Some(txid), Some(vin)) => Ok(Some((txid, vin))),
			_ => Err(IndexerError::IncompleteOutspend {
				txid: contract.txid.clone(),
				vout: contract.vout,
			}),
		}
	}

	async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, IndexerError> {
		let url = format!("{}/{}", self.base_url, path);
		let policy = ExponentialBackoffBuilder::new()
			.with_max_elapsed_time(Some(self.max_retry_elapsed))
			.build();

		let response = retry(policy, || {
			let client = self.http_client.clone();
			let url = url.clone();
			async move {
				client.get(&url).send().await.map_err(|e| {
					if e.is_connect() || e.is_timeout() {
						debug!("Transient indexer failure for {}: {}", url, e);
						backoff::Error::transient(e)
					} else {
						backoff::Error::permanent(e)
					}
				})
			}
		})
		.await?;

		if !response.status().is_success() {
			return Err(IndexerError::StatusError {
				url,
				status: response.status(),
			});
		}

		let body = response.text().await?;
		Ok(serde_json::from_str(&body)?)
	}

	async fn fetch_history(&self, script: &[u8]) -> Result<History, IndexerError> {
		let hash = Self::script_hash(script);
		let transactions: Vec<IndexerTransaction> =
			self.get_json(&format!("scripthash/{}/txs", hash)).await?;

		// the indexer lists newest first, mempool entries on top
		let history: History = transactions
			.iter()
			.rev()
			.map(IndexerTransaction::history_entry)
			.collect();

		debug!("Script {} has {} history entries", hash, history.len());
		Ok(history)
	}
}

#[async_trait]
impl ChainSource for EsploraIndexerClient {
	async fn fetch_histories(&self, scripts: &[Vec<u8>]) -> Result<Vec<History>, IndexerError> {
		let histories =
			try_join_all(scripts.iter().map(|script| self.fetch_history(script))).await?;

		if histories.len() != scripts.len() {
			return Err(IndexerError::HistoryMismatch {
				expected: scripts.len(),
				got: histories.len(),
			});
		}
		Ok(histories)
	}

	async fn fetch_outspend(
		&self,
		contract: &ContractId,
	) -> Result<Option<SpendStatus>, IndexerError> {
		let outspend: Outspend = self
			.get_json(&format!("tx/{}/outspend/{}", contract.txid, contract.vout))
			.await?;

		let Some((spent_txid, vin)) = Self::spending_input(contract, outspend)? else {
			return Ok(None);
		};

		let spending_tx: IndexerTransaction = self.get_json(&format!("tx/{}", spent_txid)).await?;
		let input = spending_tx
			.vin
			.get(vin as usize)
			.ok_or_else(|| IndexerError::MissingInput {
				txid: spent_txid.clone(),
				vin,
			})?;

		let witness = input
			.witness
			.iter()
			.map(hex::decode)
			.collect::<Result<Vec<_>, _>>()?;

		let timestamp = spending_tx
			.status
			.block_time
			.filter(|_| spending_tx.status.confirmed)
			.and_then(unix_seconds_to_datetime)
			.unwrap_or_else(Utc::now);

		debug!(
			"Funding output {} spent by {}:{} ({} witness items)",
			contract,
			spent_txid,
			vin,
			witness.len()
		);

		Ok(Some(SpendStatus {
			spent_txid,
			vin,
			witness,
			timestamp,
		}))
	}
}
