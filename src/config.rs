//! Service configuration.
//!
//! Settings come from an optional JSON file named by `CONTRACT_SYNC_CONFIG`; any
//! field left out keeps its default. A few values can be overridden directly from
//! the environment.

use crate::contract::Network;
use crate::sync::SyncSettings;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_VAR: &str = "CONTRACT_SYNC_CONFIG";
pub const INDEXER_URL_VAR: &str = "CONTRACT_SYNC_INDEXER_URL";
pub const OWNER_KEY_VAR: &str = "CONTRACT_SYNC_OWNER_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("Failed to read config file {path}: {source}")]
	IoError {
		path: PathBuf,
		source: std::io::Error,
	},

	#[error("Invalid config file {path}: {source}")]
	ParseError {
		path: PathBuf,
		source: serde_json::Error,
	},

	#[error("Invalid config value: {0}")]
	InvalidValue(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
	pub network: Network,
	/// Esplora REST endpoint.
	pub indexer_url: String,
	/// HTTP endpoint of the wallet bridge.
	pub wallet_bridge_url: String,
	/// WebSocket endpoint pushing wallet coin events.
	pub wallet_events_url: String,
	pub oracle_url: String,
	/// JSON document holding stored contracts.
	pub store_path: PathBuf,
	pub account_id: String,
	pub owner_key: Option<String>,
	pub guard_window_secs: u64,
	pub max_concurrent_queries: usize,
	pub request_timeout_secs: u64,
	pub max_retry_elapsed_secs: u64,
}

impl Default for ServiceConfig {
	fn default() -> Self {
		Self {
			network: Network::Testnet,
			indexer_url: "https://blockstream.info/liquidtestnet/api".to_string(),
			wallet_bridge_url: "http://localhost:8090".to_string(),
			wallet_events_url: "ws://localhost:8090/events".to_string(),
			oracle_url: "http://localhost:8090".to_string(),
			store_path: PathBuf::from("contracts.json"),
			account_id: "fuji".to_string(),
			owner_key: None,
			guard_window_secs: 30,
			max_concurrent_queries: 4,
			request_timeout_secs: 30,
			max_retry_elapsed_secs: 10,
		}
	}
}

impl ServiceConfig {
	/// Load from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::load(|name| std::env::var(name).ok())
	}

	/// Load using `lookup` to resolve environment variables.
	pub fn load(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let mut config = match lookup(CONFIG_PATH_VAR) {
			Some(path) => Self::from_file(Path::new(&path))?,
			None => Self::default(),
		};

		if let Some(url) = lookup(INDEXER_URL_VAR) {
			config.indexer_url = url;
		}
		if let Some(key) = lookup(OWNER_KEY_VAR).filter(|k| !k.is_empty()) {
			config.owner_key = Some(key);
		}

		config.validate()?;
		Ok(config)
	}

	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
			path: path.to_path_buf(),
			source,
		})?;
		serde_json::from_str(&text).map_err(|source| ConfigError::ParseError {
			path: path.to_path_buf(),
			source,
		})
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.max_concurrent_queries == 0 {
			return Err(ConfigError::InvalidValue(
				"max_concurrent_queries must be at least 1".to_string(),
			));
		}
		if self.account_id.is_empty() {
			return Err(ConfigError::InvalidValue("account_id is empty".to_string()));
		}
		Ok(())
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	pub fn max_retry_elapsed(&self) -> Duration {
		Duration::from_secs(self.max_retry_elapsed_secs)
	}

	pub fn sync_settings(&self) -> SyncSettings {
		SyncSettings {
			account_id: self.account_id.clone(),
			guard_window: Duration::from_secs(self.guard_window_secs),
			max_concurrent_queries: self.max_concurrent_queries,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |name| vars.get(name).cloned()
	}

	#[test]
	fn defaults_without_config_file() {
		let config = ServiceConfig::load(env(&[])).unwrap();
		assert_eq!(config, ServiceConfig::default());
		assert_eq!(config.sync_settings().guard_window, Duration::from_secs(30));
	}

	#[test]
	fn partial_file_keeps_other_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(
			&path,
			r#"{"network":"liquid","account_id":"mainFuji","max_concurrent_queries":8}"#,
		)
		.unwrap();

		let config = ServiceConfig::load(env(&[
			(CONFIG_PATH_VAR, path.to_str().unwrap()),
			(OWNER_KEY_VAR, "xpub-env"),
		]))
		.unwrap();

		assert_eq!(config.network, Network::Liquid);
		assert_eq!(config.account_id, "mainFuji");
		assert_eq!(config.max_concurrent_queries, 8);
		assert_eq!(config.owner_key.as_deref(), Some("xpub-env"));
		assert_eq!(config.guard_window_secs, 30);
	}

	#[test]
	fn rejects_zero_concurrency_and_bad_files() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(&path, r#"{"max_concurrent_queries":0}"#).unwrap();
		assert!(matches!(
			ServiceConfig::load(env(&[(CONFIG_PATH_VAR, path.to_str().unwrap())])),
			Err(ConfigError::InvalidValue(_))
		));

		std::fs::write(&path, "{not json").unwrap();
		assert!(matches!(
			ServiceConfig::load(env(&[(CONFIG_PATH_VAR, path.to_str().unwrap())])),
			Err(ConfigError::ParseError { .. })
		));

		let missing = dir.path().join("missing.json");
		assert!(matches!(
			ServiceConfig::load(env(&[(CONFIG_PATH_VAR, missing.to_str().unwrap())])),
			Err(ConfigError::IoError { .. })
		));
	}
}
