use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing::{error, info, warn};

use contract_state_sync::config::ServiceConfig;
use contract_state_sync::indexer::EsploraIndexerClient;
use contract_state_sync::oracle::HttpOracleRegistry;
use contract_state_sync::store::FileContractRepository;
use contract_state_sync::sync::ContractSyncService;
use contract_state_sync::wallet::WalletBridgeClient;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	// Default to info, with debug output for this crate
	let filter = tracing_subscriber::EnvFilter::from_default_env()
		.add_directive(tracing::Level::INFO.into());
	let filter = match "contract_state_sync=debug".parse() {
		Ok(directive) => filter.add_directive(directive),
		Err(_) => filter,
	};
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting contract state sync service");

	let config = match ServiceConfig::from_env() {
		Ok(config) => config,
		Err(e) => {
			error!("Failed to load configuration: {}", e);
			return ExitCode::FAILURE;
		}
	};

	let service = match build_service(&config) {
		Ok(service) => service,
		Err(e) => {
			error!("Failed to create clients: {}", e);
			return ExitCode::FAILURE;
		}
	};

	info!("Created sync service for account {}", config.account_id);

	let mut updates = service.subscribe();
	let reporter = tokio::spawn(async move {
		while updates.changed().await.is_ok() {
			let snapshot = updates.borrow_and_update().clone();
			if snapshot.loading {
				continue;
			}
			info!(
				"{} contracts, {} activities, {} usable oracles",
				snapshot.contracts.len(),
				snapshot.activities.len(),
				snapshot.oracles.iter().filter(|o| o.is_usable()).count()
			);
		}
	});

	service
		.switch_session(config.network, config.owner_key.clone())
		.await;

	// SIGHUP requests a reconciliation cycle
	let mut hangup = match signal(SignalKind::hangup()) {
		Ok(hangup) => Some(hangup),
		Err(e) => {
			warn!("Failed to listen for SIGHUP, reloads disabled: {}", e);
			None
		}
	};

	loop {
		tokio::select! {
			result = tokio::signal::ctrl_c() => {
				if let Err(e) = result {
					error!("Failed to listen for shutdown signal: {}", e);
				}
				break;
			}
			_ = next_hangup(&mut hangup) => {
				if service.reload_contracts().await {
					info!("Reload requested");
				} else {
					info!("Reload not queued, one is already pending or no session is active");
				}
			}
		}
	}

	info!("Shutting down");
	service.shutdown().await;
	reporter.abort();
	ExitCode::SUCCESS
}

fn build_service(config: &ServiceConfig) -> Result<ContractSyncService, Box<dyn std::error::Error>> {
	let chain = EsploraIndexerClient::new(
		config.indexer_url.clone(),
		config.request_timeout(),
		config.max_retry_elapsed(),
	)?;
	let wallet = WalletBridgeClient::new(
		config.wallet_bridge_url.clone(),
		config.wallet_events_url.clone(),
		config.request_timeout(),
	)?;
	let oracles = HttpOracleRegistry::new(config.oracle_url.clone(), config.request_timeout())?;
	let store = FileContractRepository::new(config.store_path.clone());

	Ok(ContractSyncService::new(
		Arc::new(chain),
		Arc::new(wallet),
		Arc::new(store),
		Arc::new(oracles),
		config.sync_settings(),
	))
}

/// Resolves on the next SIGHUP. Never resolves once the listener is gone.
async fn next_hangup(hangup: &mut Option<Signal>) {
	if let Some(stream) = hangup {
		if stream.recv().await.is_some() {
			return;
		}
	}
	*hangup = None;
	std::future::pending::<()>().await
}
