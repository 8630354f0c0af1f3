//! Chain gateway for the wallet session service.
//!
//! This module defines the `ChainGateway` trait, the single seam between the
//! session and consumption logic and the outside world: node RPC access,
//! service-agreement contract calls, agreement event watching, metadata store
//! resolution and signed content retrieval. Session polling, login flows and
//! the consumption workflow all talk to the chain exclusively through this
//! trait, so tests can swap the whole backend for a mock.
//!
//! The production implementation (`EvmGateway`) speaks JSON-RPC over HTTP to
//! an EVM node and plain HTTP to the metadata store.

use alloy_primitives::{B256, U256};
use async_trait::async_trait;
use thiserror::Error;
use wallet_provider::SigningHandle;
use wallet_types::{Address, Agreement, AgreementId, AssetDescriptor, Signature};

pub mod implementations {
	pub mod evm;
}
pub mod metadata;

pub use implementations::evm::{EvmGateway, GatewayContracts};
pub use metadata::MetadataClient;

/// Errors produced by gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
	/// Node RPC transport failure or rejected request.
	#[error("Network error: {0}")]
	Network(String),
	/// Metadata store unreachable or returned an unusable document.
	#[error("Metadata error: {0}")]
	Metadata(String),
	/// Contract call reverted or could not be submitted.
	#[error("Contract error: {0}")]
	Contract(String),
	/// Message signing failed or was refused.
	#[error("Signing error: {0}")]
	Signing(String),
	/// Content endpoint unreachable or returned an error status.
	#[error("Content error: {0}")]
	Content(String),
	/// Caller supplied a value the gateway cannot use.
	#[error("Invalid input: {0}")]
	InvalidInput(String),
}

/// Block cursor recorded before an agreement submission.
///
/// Armed ahead of the creation transaction so the watch window covers every
/// block the creation event could land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchPoint {
	/// First block the watch covers.
	pub from_block: u64,
}

/// Access to the chain, the metadata store and content endpoints.
///
/// Implementations must be cheap to share behind an `Arc`; the session
/// manager polls through the same instance the consumption workflow submits
/// through.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ChainGateway: Send + Sync {
	/// Lists the accounts the node currently exposes, without prompting.
	async fn available_accounts(&self) -> Result<Vec<Address>, GatewayError>;

	/// Requests account access for a login attempt.
	///
	/// An empty grant means the wallet denied access; that is a normal
	/// outcome, not an error.
	async fn request_accounts(&self) -> Result<Vec<Address>, GatewayError>;

	/// Returns the chain id the node reports.
	async fn chain_id(&self) -> Result<u64, GatewayError>;

	/// Returns the native balance of `account` in wei.
	async fn native_balance(&self, account: &Address) -> Result<U256, GatewayError>;

	/// Returns the service-token balance of `account` in base units.
	async fn token_balance(&self, account: &Address) -> Result<U256, GatewayError>;

	/// Installs the signer used for subsequent transaction submissions.
	async fn activate_signer(&self, handle: &SigningHandle) -> Result<(), GatewayError>;

	/// Drops the active signer; later submissions fail until a new one is
	/// activated.
	async fn deactivate_signer(&self);

	/// Signs an arbitrary message with the given handle.
	async fn sign_message(
		&self,
		handle: &SigningHandle,
		message: &[u8],
	) -> Result<Signature, GatewayError>;

	/// Resolves an asset document from the metadata store into a descriptor.
	async fn resolve_asset(&self, did: &str) -> Result<AssetDescriptor, GatewayError>;

	/// Checks whether `consumer` already holds access to the asset.
	async fn check_permission(
		&self,
		asset_id: B256,
		consumer: &Address,
	) -> Result<bool, GatewayError>;

	/// Records the block cursor an agreement watch starts from.
	///
	/// Must be called before the creation transaction is submitted, so the
	/// creation event cannot land in a block the watch never covers.
	async fn arm_agreement_watch(&self) -> Result<WatchPoint, GatewayError>;

	/// Submits the agreement creation transaction and returns its hash.
	///
	/// Returns once the node accepts the transaction; landing on chain is
	/// observed separately through [`ChainGateway::agreement_created_since`].
	async fn create_agreement(&self, agreement: &Agreement) -> Result<B256, GatewayError>;

	/// Checks whether the creation event for `agreement_id` has been emitted
	/// at or after the watch point.
	async fn agreement_created_since(
		&self,
		watch: &WatchPoint,
		agreement_id: &AgreementId,
	) -> Result<bool, GatewayError>;

	/// Approves and locks the payment for a confirmed agreement.
	///
	/// Returns the hash of the lock transaction after it is mined.
	async fn lock_payment(
		&self,
		agreement_id: &AgreementId,
		asset_id: B256,
		amount: U256,
	) -> Result<B256, GatewayError>;

	/// Requests service tokens from the on-chain dispenser.
	async fn request_service_tokens(&self, amount: U256) -> Result<B256, GatewayError>;

	/// Fetches signed content from the given URL.
	async fn fetch_content(&self, url: &str) -> Result<Vec<u8>, GatewayError>;
}
