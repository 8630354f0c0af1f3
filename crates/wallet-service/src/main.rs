//! Main entry point for the wallet session service.
//!
//! Wires the chain gateway, persistent store, session manager, consumption
//! workflow and faucet together and exposes them as a small CLI: a
//! long-running `run` mode that keeps the session fresh until Ctrl-C, plus
//! one-shot commands for login, status, consumption and token top-ups.
//!
//! # Usage
//!
//! ```bash
//! wallet-service --config config.toml login --method generated
//! wallet-service --config config.toml consume --did did:op:…
//! wallet-service --config config.toml run
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use wallet_config::Config;
use wallet_consume::ConsumeWorkflow;
use wallet_faucet::{FaucetService, TokenKind};
use wallet_gateway::{ChainGateway, EvmGateway, GatewayContracts};
use wallet_session::SessionManager;
use wallet_store::{FileStore, StateStore};
use wallet_types::format_token_amount;

/// Command-line arguments for the wallet service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to the TOML configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Restore the persisted session and keep it fresh until Ctrl-C
	Run,
	/// Restore the persisted session and print one snapshot
	Status,
	/// Log in and persist the method for later restores
	Login {
		/// Login method (injected, generated)
		#[arg(long)]
		method: String,
	},
	/// Resolve an asset and run one consumption attempt
	Consume {
		/// DID of the asset to consume
		#[arg(long)]
		did: String,
	},
	/// Request a token top-up for the session account
	Faucet {
		/// Token to request (native, service)
		#[arg(long)]
		token: String,
	},
}

/// Everything the commands operate on, built once from configuration.
struct Services {
	session: SessionManager,
	consume: ConsumeWorkflow,
	faucet: FaucetService,
}

impl Services {
	fn build(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
		let contracts = GatewayContracts::new(
			&config.contracts.agreement_store,
			&config.contracts.access_template,
			&config.contracts.access_condition,
			&config.contracts.lock_payment_condition,
			&config.contracts.service_token,
		)?;
		let gateway: Arc<dyn ChainGateway> = Arc::new(EvmGateway::new(
			&config.node.http_url,
			&config.metadata.base_url,
			contracts,
		)?);
		let store: Arc<dyn StateStore> = Arc::new(FileStore::new(&config.storage.path));

		let session = SessionManager::new(gateway.clone(), store, config);
		let consume = ConsumeWorkflow::new(gateway.clone(), session.clone(), config);
		let faucet = FaucetService::new(gateway, session.clone(), config)?;

		Ok(Self {
			session,
			consume,
			faucet,
		})
	}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt().with_env_filter(env_filter).with_target(true).init();

	let config = Config::from_file(&args.config).await?;
	tracing::info!(path = %args.config.display(), "Loaded configuration");

	let services = Services::build(&config)?;

	match args.command {
		Command::Run => run(services).await,
		Command::Status => status(services).await,
		Command::Login { method } => login(services, &method).await,
		Command::Consume { did } => consume(services, &did).await,
		Command::Faucet { token } => faucet(services, &token).await,
	}
}

/// Keeps the session fresh and logs every published snapshot until Ctrl-C.
async fn run(services: Services) -> Result<(), Box<dyn std::error::Error>> {
	let mut sessions = services.session.subscribe();

	services.session.bootstrap().await;
	services.session.start().await?;
	tracing::info!("Session service running; press Ctrl-C to stop");

	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => {
				tracing::info!("Shutting down");
				break;
			}
			changed = sessions.changed() => {
				if changed.is_err() {
					break;
				}
				let session = sessions.borrow_and_update().clone();
				tracing::info!(
					login_state = ?session.login_state,
					account = ?session.account,
					network = %session.network.name,
					"Session: {}",
					session.status_message
				);
			}
		}
	}

	services.session.shutdown().await;
	tracing::info!("Stopped");
	Ok(())
}

/// Restores the session once and prints the resulting snapshot.
async fn status(services: Services) -> Result<(), Box<dyn std::error::Error>> {
	services.session.bootstrap().await;
	let session = services.session.session();

	println!("Login state:   {:?}", session.login_state);
	println!("Wallet kind:   {}", session.wallet_kind.as_str());
	println!(
		"Account:       {}",
		session
			.account
			.map(|account| account.to_string())
			.unwrap_or_else(|| "-".to_string())
	);
	println!(
		"Network:       {} ({})",
		session.network.name,
		if session.network.recognized {
			"recognized"
		} else {
			"unrecognized"
		}
	);
	println!(
		"Native:        {}",
		format_token_amount(&session.balance.native.to_string(), 18)
	);
	println!(
		"Service token: {}",
		format_token_amount(&session.balance.service_token.to_string(), 18)
	);
	println!("Status:        {}", session.status_message);
	Ok(())
}

/// Performs one login flow; the chosen method is persisted for restores.
async fn login(services: Services, method: &str) -> Result<(), Box<dyn std::error::Error>> {
	match method {
		"injected" => services.session.login_injected().await?,
		"generated" | "generated_key" => services.session.login_generated().await?,
		other => {
			return Err(format!(
				"Unknown login method: {other} (expected injected or generated)"
			)
			.into())
		}
	}

	let session = services.session.session();
	tracing::info!(
		account = ?session.account,
		kind = session.wallet_kind.as_str(),
		"Login complete"
	);
	Ok(())
}

/// Runs one consumption attempt, streaming authorization progress.
async fn consume(services: Services, did: &str) -> Result<(), Box<dyn std::error::Error>> {
	services.session.bootstrap().await;

	services.consume.resolve(did).await?;
	if let Some(price) = services.consume.gating().price_display {
		tracing::info!(%price, "Asset price");
	}

	let mut progress = services.consume.subscribe_progress();
	let reporter = tokio::spawn(async move {
		while let Ok(step) = progress.recv().await {
			tracing::info!(step = step.step_index(), "{}", step.message());
		}
	});

	let result = services.consume.consume(did).await;
	reporter.abort();

	let path = result?;
	tracing::info!(path = %path.display(), "Content downloaded");
	Ok(())
}

/// Requests a token top-up for the restored session account.
async fn faucet(services: Services, token: &str) -> Result<(), Box<dyn std::error::Error>> {
	services.session.bootstrap().await;

	let kind: TokenKind = token.parse()?;
	let outcome = services.faucet.request_tokens(kind).await?;
	tracing::info!(
		success = outcome.success,
		tx_hash = ?outcome.tx_hash,
		"Faucet: {}",
		outcome.message
	);
	Ok(())
}
