//! Configuration module for the wallet session service.
//!
//! This module provides structures and utilities for loading service
//! configuration from TOML files. Values support `${VAR}` and
//! `${VAR:-default}` environment variable substitution, every section the
//! deployment does not override falls back to a documented default, and the
//! result is validated before any component starts.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use wallet_types::{deserialize_recognized, Address, RecognizedNetworks};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the wallet session service.
///
/// This structure contains all configuration sections required for the
/// service to operate: the Ethereum node endpoint, the metadata store used
/// for asset resolution, session polling cadence, the recognized network
/// table, contract addresses, consumption settings, persistence, and the
/// token faucet.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Ethereum node endpoint configuration.
	pub node: NodeConfig,
	/// Metadata store endpoint used to resolve asset descriptors.
	pub metadata: MetadataConfig,
	/// Session polling cadence.
	#[serde(default)]
	pub session: SessionConfig,
	/// Recognized chain id to network name mapping.
	#[serde(
		deserialize_with = "deserialize_recognized",
		default = "default_recognized_networks"
	)]
	pub networks: RecognizedNetworks,
	/// On-chain contract addresses the service interacts with.
	pub contracts: ContractsConfig,
	/// Consumption workflow settings.
	#[serde(default)]
	pub consume: ConsumeConfig,
	/// Local persistence settings.
	#[serde(default)]
	pub storage: StorageConfig,
	/// Token faucet settings.
	#[serde(default)]
	pub faucet: FaucetConfig,
}

/// Ethereum node endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
	/// HTTP JSON-RPC endpoint of the node.
	pub http_url: String,
}

/// Metadata store endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetadataConfig {
	/// Base URL of the metadata store serving asset descriptors.
	pub base_url: String,
}

/// Session polling cadence.
///
/// The account refresher runs every `account_poll_ms`; the network
/// refresher runs once per `network_poll_factor` account ticks.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
	/// Period of the account/balance refresher in milliseconds.
	#[serde(default = "default_account_poll_ms")]
	pub account_poll_ms: u64,
	/// Network refresher period as a multiple of the account period.
	#[serde(default = "default_network_poll_factor")]
	pub network_poll_factor: u64,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			account_poll_ms: default_account_poll_ms(),
			network_poll_factor: default_network_poll_factor(),
		}
	}
}

/// On-chain contract addresses the service interacts with.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractsConfig {
	/// Agreement store keeping agreement records and emitting creation events.
	pub agreement_store: Address,
	/// Service agreement template contract agreements are created through.
	pub access_template: Address,
	/// Condition contract granting content access, consulted for permission checks.
	pub access_condition: Address,
	/// Condition contract escrowing the payment for an agreement.
	pub lock_payment_condition: Address,
	/// ERC-20 token assets are priced in.
	pub service_token: Address,
}

/// Consumption workflow settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsumeConfig {
	/// Upper bound in seconds on waiting for agreement confirmation.
	#[serde(default = "default_confirmation_timeout_seconds")]
	pub confirmation_timeout_seconds: u64,
	/// Interval in seconds between confirmation checks.
	#[serde(default = "default_confirmation_poll_seconds")]
	pub confirmation_poll_seconds: u64,
	/// Directory downloaded content is written to.
	#[serde(default = "default_download_dir")]
	pub download_dir: PathBuf,
	/// Fixed filename downloaded content is stored under.
	#[serde(default = "default_download_filename")]
	pub download_filename: String,
	/// Provider party recorded on new agreements.
	/// Defaults to the consumer's own account when not set.
	#[serde(default)]
	pub provider_address: Option<Address>,
}

impl Default for ConsumeConfig {
	fn default() -> Self {
		Self {
			confirmation_timeout_seconds: default_confirmation_timeout_seconds(),
			confirmation_poll_seconds: default_confirmation_poll_seconds(),
			download_dir: default_download_dir(),
			download_filename: default_download_filename(),
			provider_address: None,
		}
	}
}

/// Local persistence settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Directory the key-value store keeps its entries in.
	#[serde(default = "default_storage_path")]
	pub path: PathBuf,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			path: default_storage_path(),
		}
	}
}

/// Token faucet settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FaucetConfig {
	/// HTTP endpoint of the native-token faucet, if one is deployed.
	#[serde(default)]
	pub url: Option<String>,
	/// Agent identifier sent with native faucet requests.
	#[serde(default = "default_faucet_agent")]
	pub agent: String,
	/// Whole service tokens requested per on-chain top-up.
	#[serde(default = "default_service_top_up_tokens")]
	pub service_top_up_tokens: u64,
}

impl Default for FaucetConfig {
	fn default() -> Self {
		Self {
			url: None,
			agent: default_faucet_agent(),
			service_top_up_tokens: default_service_top_up_tokens(),
		}
	}
}

/// Returns the default account poll period in milliseconds.
fn default_account_poll_ms() -> u64 {
	1000 // Refresh account and balances once per second
}

/// Returns the default network poll factor.
fn default_network_poll_factor() -> u64 {
	60 // Network identity changes rarely; check once a minute
}

/// Returns the default confirmation timeout in seconds.
fn default_confirmation_timeout_seconds() -> u64 {
	300 // Five minutes covers slow test networks
}

/// Returns the default confirmation poll interval in seconds.
fn default_confirmation_poll_seconds() -> u64 {
	3
}

/// Returns the default download directory.
fn default_download_dir() -> PathBuf {
	PathBuf::from("./downloads")
}

/// Returns the default downloaded content filename.
fn default_download_filename() -> String {
	"dataset.bin".to_string()
}

/// Returns the default key-value store directory.
fn default_storage_path() -> PathBuf {
	PathBuf::from("./state")
}

/// Returns the default faucet agent identifier.
fn default_faucet_agent() -> String {
	"commons".to_string()
}

/// Returns the default service-token top-up amount in whole tokens.
fn default_service_top_up_tokens() -> u64 {
	10
}

/// Returns the default recognized network table.
fn default_recognized_networks() -> RecognizedNetworks {
	[
		(8996, "Spree".to_string()),
		(8995, "Nile".to_string()),
		(2199, "Duero".to_string()),
		(846353, "Pacific".to_string()),
	]
	.into_iter()
	.collect()
}

/// Resolves environment variables in configuration content.
///
/// Supports `${VAR_NAME}` for required variables and
/// `${VAR_NAME:-default}` for variables with a fallback value.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	// Limit input size to prevent ReDoS attacks
	const MAX_INPUT_SIZE: usize = 1024 * 1024; // 1MB
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {e}")))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let full_match = cap.get(0).unwrap();
		let var_name = cap.get(1).unwrap().as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => {
				if let Some(default) = default_value {
					default.to_string()
				} else {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{var_name}' not found"
					)));
				}
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a TOML file.
	///
	/// Environment variable references in the file are resolved before
	/// parsing and the loaded configuration is validated.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let raw = tokio::fs::read_to_string(path.as_ref()).await?;
		Self::from_toml_str(&raw)
	}

	/// Parses and validates configuration from TOML content.
	pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
		let resolved = resolve_env_vars(raw)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}

	/// Validates the configuration to ensure all required fields are properly set.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.node.http_url.is_empty() {
			return Err(ConfigError::Validation(
				"Node HTTP URL cannot be empty".into(),
			));
		}
		if self.metadata.base_url.is_empty() {
			return Err(ConfigError::Validation(
				"Metadata base URL cannot be empty".into(),
			));
		}

		if self.networks.is_empty() {
			return Err(ConfigError::Validation(
				"Networks configuration cannot be empty".into(),
			));
		}

		if self.session.account_poll_ms == 0 {
			return Err(ConfigError::Validation(
				"Account poll period must be greater than zero".into(),
			));
		}
		if self.session.network_poll_factor == 0 {
			return Err(ConfigError::Validation(
				"Network poll factor must be greater than zero".into(),
			));
		}

		if self.consume.confirmation_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"Confirmation timeout must be greater than zero".into(),
			));
		}
		if self.consume.confirmation_poll_seconds > self.consume.confirmation_timeout_seconds {
			return Err(ConfigError::Validation(
				"Confirmation poll interval cannot exceed the confirmation timeout".into(),
			));
		}
		if self.consume.download_filename.is_empty() {
			return Err(ConfigError::Validation(
				"Download filename cannot be empty".into(),
			));
		}

		if self.faucet.service_top_up_tokens == 0 {
			return Err(ConfigError::Validation(
				"Service token top-up amount must be greater than zero".into(),
			));
		}

		Ok(())
	}

	/// Returns the network poll period derived from the account period.
	pub fn network_poll_ms(&self) -> u64 {
		self.session.account_poll_ms * self.session.network_poll_factor
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL_CONFIG: &str = r#"
[node]
http_url = "http://localhost:8545"

[metadata]
base_url = "http://localhost:5000"

[contracts]
agreement_store = "0x1111111111111111111111111111111111111111"
access_template = "0x2222222222222222222222222222222222222222"
access_condition = "0x3333333333333333333333333333333333333333"
lock_payment_condition = "0x4444444444444444444444444444444444444444"
service_token = "0x5555555555555555555555555555555555555555"
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("TEST_NODE_HOST", "localhost");
		std::env::set_var("TEST_NODE_PORT", "8545");

		let input = "http_url = \"http://${TEST_NODE_HOST}:${TEST_NODE_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "http_url = \"http://localhost:8545\"");

		std::env::remove_var("TEST_NODE_HOST");
		std::env::remove_var("TEST_NODE_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("MISSING_VAR"));
	}

	#[test]
	fn test_minimal_config_uses_defaults() {
		let config = Config::from_toml_str(MINIMAL_CONFIG).unwrap();

		assert_eq!(config.session.account_poll_ms, 1000);
		assert_eq!(config.session.network_poll_factor, 60);
		assert_eq!(config.network_poll_ms(), 60_000);

		assert_eq!(config.networks.get(&8996).map(String::as_str), Some("Spree"));
		assert_eq!(config.networks.get(&8995).map(String::as_str), Some("Nile"));
		assert_eq!(config.networks.get(&2199).map(String::as_str), Some("Duero"));
		assert_eq!(
			config.networks.get(&846353).map(String::as_str),
			Some("Pacific")
		);

		assert_eq!(config.consume.confirmation_timeout_seconds, 300);
		assert_eq!(config.consume.download_filename, "dataset.bin");
		assert!(config.consume.provider_address.is_none());

		assert_eq!(config.storage.path, PathBuf::from("./state"));
		assert_eq!(config.faucet.agent, "commons");
		assert_eq!(config.faucet.service_top_up_tokens, 10);
		assert!(config.faucet.url.is_none());
	}

	#[test]
	fn test_full_config_overrides() {
		let config_str = r#"
[node]
http_url = "http://node:8545"

[metadata]
base_url = "http://metadata:5000"

[session]
account_poll_ms = 500
network_poll_factor = 10

[networks]
8996 = "Spree"
12345 = "Testnet"

[contracts]
agreement_store = "0x1111111111111111111111111111111111111111"
access_template = "0x2222222222222222222222222222222222222222"
access_condition = "0x3333333333333333333333333333333333333333"
lock_payment_condition = "0x4444444444444444444444444444444444444444"
service_token = "0x5555555555555555555555555555555555555555"

[consume]
confirmation_timeout_seconds = 60
confirmation_poll_seconds = 1
download_dir = "/tmp/content"
download_filename = "asset.dat"
provider_address = "0x6666666666666666666666666666666666666666"

[storage]
path = "/var/lib/wallet"

[faucet]
url = "http://faucet:3001/faucet"
agent = "commons"
service_top_up_tokens = 25
"#;
		let config = Config::from_toml_str(config_str).unwrap();

		assert_eq!(config.node.http_url, "http://node:8545");
		assert_eq!(config.session.account_poll_ms, 500);
		assert_eq!(config.network_poll_ms(), 5000);
		assert_eq!(config.networks.len(), 2);
		assert_eq!(
			config.networks.get(&12345).map(String::as_str),
			Some("Testnet")
		);
		assert_eq!(config.consume.confirmation_timeout_seconds, 60);
		assert_eq!(config.consume.download_dir, PathBuf::from("/tmp/content"));
		assert!(config.consume.provider_address.is_some());
		assert_eq!(config.faucet.url.as_deref(), Some("http://faucet:3001/faucet"));
		assert_eq!(config.faucet.service_top_up_tokens, 25);
	}

	#[test]
	fn test_config_with_env_vars() {
		std::env::set_var("TEST_METADATA_URL", "http://metadata:5000");

		let config_str = r#"
[node]
http_url = "${TEST_NODE_URL:-http://localhost:8545}"

[metadata]
base_url = "${TEST_METADATA_URL}"

[contracts]
agreement_store = "0x1111111111111111111111111111111111111111"
access_template = "0x2222222222222222222222222222222222222222"
access_condition = "0x3333333333333333333333333333333333333333"
lock_payment_condition = "0x4444444444444444444444444444444444444444"
service_token = "0x5555555555555555555555555555555555555555"
"#;
		let config = Config::from_toml_str(config_str).unwrap();
		assert_eq!(config.node.http_url, "http://localhost:8545");
		assert_eq!(config.metadata.base_url, "http://metadata:5000");

		std::env::remove_var("TEST_METADATA_URL");
	}

	#[test]
	fn test_rejects_empty_node_url() {
		let config_str = MINIMAL_CONFIG.replace("http://localhost:8545", "");
		let err = Config::from_toml_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("Node HTTP URL"));
	}

	#[test]
	fn test_rejects_zero_poll_period() {
		let config_str = format!("{MINIMAL_CONFIG}\n[session]\naccount_poll_ms = 0\n");
		let err = Config::from_toml_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("Account poll period"));
	}

	#[test]
	fn test_rejects_poll_interval_longer_than_timeout() {
		let config_str = format!(
			"{MINIMAL_CONFIG}\n[consume]\nconfirmation_timeout_seconds = 5\nconfirmation_poll_seconds = 10\n"
		);
		let err = Config::from_toml_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("Confirmation poll interval"));
	}

	#[test]
	fn test_rejects_invalid_contract_address() {
		let config_str = MINIMAL_CONFIG.replace(
			"0x1111111111111111111111111111111111111111",
			"0x1111",
		);
		let result = Config::from_toml_str(&config_str);
		assert!(result.is_err());
	}

	#[test]
	fn test_rejects_invalid_chain_id_key() {
		let config_str = format!("{MINIMAL_CONFIG}\n[networks]\nnot_a_number = \"Bad\"\n");
		let result = Config::from_toml_str(&config_str);
		assert!(result.is_err());
	}

	#[tokio::test]
	async fn test_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("service.toml");
		tokio::fs::write(&path, MINIMAL_CONFIG).await.unwrap();

		let config = Config::from_file(&path).await.unwrap();
		assert_eq!(config.node.http_url, "http://localhost:8545");
	}

	#[tokio::test]
	async fn test_from_file_missing() {
		let result = Config::from_file("/nonexistent/service.toml").await;
		assert!(matches!(result, Err(ConfigError::Io(_))));
	}
}
