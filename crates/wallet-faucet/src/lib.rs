//! Token top-up for the wallet service.
//!
//! Both faucet paths report the same [`FaucetOutcome`] shape: the native
//! token comes from an HTTP faucet deployment, the service token from the
//! on-chain dispenser through the gateway. Neither path blocks on the
//! requested funds arriving; the session poller picks up the new balances
//! on its regular cadence.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U256;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use wallet_config::{Config, FaucetConfig};
use wallet_gateway::ChainGateway;
use wallet_session::SessionManager;

/// Errors surfaced by token requests.
#[derive(Debug, Error)]
pub enum FaucetError {
	/// Top-ups go to the session account, so one must be logged in.
	#[error("Not logged in")]
	NotLoggedIn,
	/// No native faucet endpoint is configured.
	#[error("No native-token faucet is configured")]
	NotConfigured,
	/// The faucet endpoint could not be reached or refused the request.
	#[error("Faucet request failed: {0}")]
	Request(String),
	/// The faucet answered with something other than the expected shape.
	#[error("Faucet response could not be parsed: {0}")]
	InvalidResponse(String),
	/// The on-chain token request failed.
	#[error("Service-token request failed: {0}")]
	Chain(String),
}

/// Which token a top-up request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
	/// Chain-native token, paid out by an HTTP faucet.
	Native,
	/// ERC-20 service token, paid out by the on-chain dispenser.
	Service,
}

impl TokenKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			TokenKind::Native => "native",
			TokenKind::Service => "service",
		}
	}
}

impl std::str::FromStr for TokenKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"native" => Ok(TokenKind::Native),
			"service" => Ok(TokenKind::Service),
			other => Err(format!("Unknown token kind: {}", other)),
		}
	}
}

/// Uniform result of a top-up request, whichever path served it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaucetOutcome {
	/// Whether the faucet accepted the request.
	pub success: bool,
	/// Human-readable report from the serving path.
	pub message: String,
	/// Dispensing transaction hash, when one is known.
	pub tx_hash: Option<String>,
}

/// Request body the native faucet expects.
#[derive(Debug, Serialize)]
struct FaucetRequest {
	address: String,
	agent: String,
}

/// Response body the native faucet sends back.
#[derive(Debug, Deserialize)]
struct FaucetResponse {
	success: bool,
	#[serde(default)]
	message: String,
	#[serde(default, rename = "trxHash")]
	trx_hash: Option<String>,
}

/// Runs top-up requests against the configured faucets.
pub struct FaucetService {
	client: Client,
	gateway: Arc<dyn ChainGateway>,
	session: SessionManager,
	config: FaucetConfig,
}

impl FaucetService {
	pub fn new(
		gateway: Arc<dyn ChainGateway>,
		session: SessionManager,
		config: &Config,
	) -> Result<Self, FaucetError> {
		let mut headers = HeaderMap::new();
		headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

		let client = Client::builder()
			.default_headers(headers)
			.user_agent("wallet-session-service/0.1")
			.timeout(Duration::from_secs(30))
			.build()
			.map_err(|e| FaucetError::Request(format!("Failed to create HTTP client: {e}")))?;

		Ok(Self {
			client,
			gateway,
			session,
			config: config.faucet.clone(),
		})
	}

	/// Requests a top-up of the given token for the session account.
	pub async fn request_tokens(&self, kind: TokenKind) -> Result<FaucetOutcome, FaucetError> {
		match kind {
			TokenKind::Native => self.request_native().await,
			TokenKind::Service => self.request_service().await,
		}
	}

	async fn request_native(&self) -> Result<FaucetOutcome, FaucetError> {
		let url = self
			.config
			.url
			.clone()
			.ok_or(FaucetError::NotConfigured)?;
		let account = self
			.session
			.session()
			.account
			.ok_or(FaucetError::NotLoggedIn)?;

		info!(address = %account, "Requesting native tokens from the faucet");
		let request = FaucetRequest {
			address: account.to_string(),
			agent: self.config.agent.clone(),
		};
		let response = self
			.client
			.post(&url)
			.json(&request)
			.send()
			.await
			.map_err(|e| FaucetError::Request(e.to_string()))?;

		if !response.status().is_success() {
			return Err(FaucetError::Request(format!(
				"Faucet returned status {}",
				response.status()
			)));
		}

		let raw: FaucetResponse = response
			.json()
			.await
			.map_err(|e| FaucetError::InvalidResponse(e.to_string()))?;
		info!(success = raw.success, "Faucet responded: {}", raw.message);

		Ok(FaucetOutcome {
			success: raw.success,
			message: raw.message,
			tx_hash: raw.trx_hash,
		})
	}

	async fn request_service(&self) -> Result<FaucetOutcome, FaucetError> {
		// The on-chain dispenser needs an active signer behind the gateway.
		if !self.session.session().is_logged_in() {
			return Err(FaucetError::NotLoggedIn);
		}

		let tokens = self.config.service_top_up_tokens;
		let amount = U256::from(tokens) * U256::from(10u64).pow(U256::from(18));
		info!(tokens, "Requesting service tokens from the on-chain dispenser");

		let tx_hash = self
			.gateway
			.request_service_tokens(amount)
			.await
			.map_err(|e| FaucetError::Chain(e.to_string()))?;

		Ok(FaucetOutcome {
			success: true,
			message: format!("Requested {} service tokens", tokens),
			tx_hash: Some(tx_hash.to_string()),
		})
	}
}
