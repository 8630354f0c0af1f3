//! EVM implementation of the chain gateway.
//!
//! Talks JSON-RPC to a single node over HTTP using the Alloy library and
//! drives the service-agreement contracts: permission checks, agreement
//! creation, payment locking and the token dispenser. Metadata resolution
//! and content retrieval are delegated to [`MetadataClient`].
//!
//! Submission respects the active login: a node-managed account submits
//! through `eth_sendTransaction` and the node signs, while a locally held
//! key signs through an Alloy wallet layer. Either way the read path stays
//! on one shared retry-enabled provider.

use std::time::Duration;

use alloy_network::EthereumWallet;
use alloy_primitives::{
	Address as AlloyAddress, Bytes, Log as PrimLog, LogData, TxKind, B256, U256,
};
use alloy_provider::{
	fillers::{ChainIdFiller, GasFiller, NonceFiller, SimpleNonceManager},
	DynProvider, PendingTransactionConfig, Provider, ProviderBuilder,
};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types::{Filter, Log, TransactionRequest};
use alloy_signer::Signer;
use alloy_sol_types::{sol, SolCall, SolEvent};
use alloy_transport::layers::RetryBackoffLayer;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use wallet_provider::SigningHandle;
use wallet_types::{Address, Agreement, AgreementId, AssetDescriptor, Signature};

use crate::metadata::MetadataClient;
use crate::{ChainGateway, GatewayError, WatchPoint};

sol! {
	interface IAccessCondition {
		function checkPermissions(address grantee, bytes32 documentId) external view returns (bool);
	}

	interface IAccessTemplate {
		function createAgreement(bytes32 agreementId, bytes32 assetId, address consumer, address provider) external returns (bool);
	}

	interface ILockPaymentCondition {
		function lockPayment(bytes32 agreementId, bytes32 assetId, uint256 amount) external returns (bool);
	}

	interface IServiceToken {
		function balanceOf(address owner) external view returns (uint256);
		function approve(address spender, uint256 amount) external returns (bool);
		function requestTokens(uint256 amount) external returns (bool);
	}

	/// Emitted by the agreement store when an agreement record is written.
	event AgreementCreated(bytes32 indexed agreementId, bytes32 indexed assetId, address consumer, address provider);
}

/// How long a mined-transaction wait may take before giving up.
///
/// Applies to the approval and lock legs, which must land before the
/// workflow reports payment as locked. Agreement creation is watched
/// separately through events with its own configured deadline.
const MINED_WAIT: Duration = Duration::from_secs(60);

/// Addresses of the service-agreement contracts the gateway drives.
#[derive(Debug, Clone)]
pub struct GatewayContracts {
	/// Agreement store emitting `AgreementCreated`.
	pub agreement_store: AlloyAddress,
	/// Template contract agreements are created through.
	pub access_template: AlloyAddress,
	/// Condition contract answering permission checks.
	pub access_condition: AlloyAddress,
	/// Condition contract payments are locked against.
	pub lock_payment_condition: AlloyAddress,
	/// ERC-20 token assets are priced in, with a built-in dispenser.
	pub service_token: AlloyAddress,
}

impl GatewayContracts {
	/// Builds the contract set from service-level addresses.
	pub fn new(
		agreement_store: &Address,
		access_template: &Address,
		access_condition: &Address,
		lock_payment_condition: &Address,
		service_token: &Address,
	) -> Result<Self, GatewayError> {
		Ok(Self {
			agreement_store: AlloyAddress::try_from(agreement_store)
				.map_err(GatewayError::InvalidInput)?,
			access_template: AlloyAddress::try_from(access_template)
				.map_err(GatewayError::InvalidInput)?,
			access_condition: AlloyAddress::try_from(access_condition)
				.map_err(GatewayError::InvalidInput)?,
			lock_payment_condition: AlloyAddress::try_from(lock_payment_condition)
				.map_err(GatewayError::InvalidInput)?,
			service_token: AlloyAddress::try_from(service_token)
				.map_err(GatewayError::InvalidInput)?,
		})
	}
}

/// Provider used for submissions while a signer is active.
struct ActiveSubmitter {
	provider: DynProvider,
	/// Sender the node should sign for; `None` when a local wallet signs.
	from: Option<AlloyAddress>,
}

/// Alloy-based gateway to one EVM node and its metadata store.
pub struct EvmGateway {
	/// Retry-enabled provider for reads and event polling.
	provider: DynProvider,
	/// Submission provider installed by [`ChainGateway::activate_signer`].
	submitter: RwLock<Option<ActiveSubmitter>>,
	metadata: MetadataClient,
	/// Node RPC endpoint, kept to build submitters per signer.
	http_url: String,
	contracts: GatewayContracts,
}

impl EvmGateway {
	/// Creates a gateway against the node at `http_url` and the metadata
	/// store at `metadata_url`.
	pub fn new(
		http_url: &str,
		metadata_url: &str,
		contracts: GatewayContracts,
	) -> Result<Self, GatewayError> {
		let provider = build_read_provider(http_url)?;
		let metadata = MetadataClient::new(metadata_url)?;

		Ok(Self {
			provider,
			submitter: RwLock::new(None),
			metadata,
			http_url: http_url.to_string(),
			contracts,
		})
	}

	async fn node_chain_id(&self) -> Result<u64, GatewayError> {
		self.provider
			.get_chain_id()
			.await
			.map_err(|e| GatewayError::Network(format!("Failed to get chain id: {e}")))
	}

	/// Executes a read-only contract call and returns the raw return data.
	async fn view_call(&self, to: AlloyAddress, input: Vec<u8>) -> Result<Bytes, GatewayError> {
		let request = TransactionRequest {
			to: Some(TxKind::Call(to)),
			input: input.into(),
			..Default::default()
		};

		self.provider
			.call(request)
			.await
			.map_err(|e| GatewayError::Contract(format!("Contract call failed: {e}")))
	}

	/// Submits a state-changing call through the active signer.
	async fn submit(&self, to: AlloyAddress, input: Vec<u8>) -> Result<B256, GatewayError> {
		let guard = self.submitter.read().await;
		let active = guard
			.as_ref()
			.ok_or_else(|| GatewayError::Signing("No active signer".to_string()))?;

		let request = TransactionRequest {
			from: active.from,
			to: Some(TxKind::Call(to)),
			input: input.into(),
			..Default::default()
		};

		let pending_tx = active
			.provider
			.send_transaction(request)
			.await
			.map_err(|e| GatewayError::Network(format!("Failed to send transaction: {e}")))?;

		Ok(*pending_tx.tx_hash())
	}

	/// Submits a call and waits until it is mined with a successful status.
	async fn submit_and_mine(
		&self,
		to: AlloyAddress,
		input: Vec<u8>,
		label: &str,
	) -> Result<B256, GatewayError> {
		let tx_hash = self.submit(to, input).await?;
		debug!(%tx_hash, label, "Waiting for transaction to be mined");

		let config = PendingTransactionConfig::new(tx_hash)
			.with_required_confirmations(1)
			.with_timeout(Some(MINED_WAIT));

		let pending_tx = self
			.provider
			.watch_pending_transaction(config)
			.await
			.map_err(|e| GatewayError::Network(format!("Transaction watch failed: {e}")))?;

		let confirmed_hash = pending_tx
			.await
			.map_err(|e| GatewayError::Network(format!("Failed to confirm transaction: {e}")))?;

		let receipt = self
			.provider
			.get_transaction_receipt(confirmed_hash)
			.await
			.map_err(|e| GatewayError::Network(format!("Failed to fetch receipt: {e}")))?
			.ok_or_else(|| {
				GatewayError::Network(format!("No receipt for {label} transaction"))
			})?;

		if !receipt.status() {
			return Err(GatewayError::Contract(format!(
				"{label} transaction reverted"
			)));
		}

		Ok(tx_hash)
	}
}

/// Creates a retry-enabled HTTP provider for reads and event polling.
fn build_read_provider(http_url: &str) -> Result<DynProvider, GatewayError> {
	let url = http_url
		.parse()
		.map_err(|e| GatewayError::InvalidInput(format!("Invalid node URL: {e}")))?;

	// Retry transient failures: up to 5 attempts, 1s initial backoff,
	// 10 compute units per second for rate limiting.
	let retry_layer = RetryBackoffLayer::new(5, 1000, 10);
	let client = RpcClient::builder().layer(retry_layer).http(url);

	Ok(ProviderBuilder::new().on_client(client).erased())
}

/// Extracts the agreement id from an `AgreementCreated` log, if it is one.
fn agreement_created_id(log: &Log) -> Option<B256> {
	let prim_log = PrimLog {
		address: log.address(),
		data: LogData::new_unchecked(log.topics().to_vec(), log.data().data.clone()),
	};

	AgreementCreated::decode_log(&prim_log, true)
		.ok()
		.map(|event| event.agreementId)
}

#[async_trait]
impl ChainGateway for EvmGateway {
	async fn available_accounts(&self) -> Result<Vec<Address>, GatewayError> {
		let accounts = self
			.provider
			.get_accounts()
			.await
			.map_err(|e| GatewayError::Network(format!("Failed to list accounts: {e}")))?;

		Ok(accounts.into_iter().map(Address::from).collect())
	}

	async fn request_accounts(&self) -> Result<Vec<Address>, GatewayError> {
		// The node either grants its managed accounts or returns an empty
		// list; the caller treats empty as a denied login.
		let accounts = self
			.provider
			.get_accounts()
			.await
			.map_err(|e| GatewayError::Network(format!("Failed to request accounts: {e}")))?;

		debug!(count = accounts.len(), "Account access requested");
		Ok(accounts.into_iter().map(Address::from).collect())
	}

	async fn chain_id(&self) -> Result<u64, GatewayError> {
		self.node_chain_id().await
	}

	async fn native_balance(&self, account: &Address) -> Result<U256, GatewayError> {
		let address = AlloyAddress::try_from(account).map_err(GatewayError::InvalidInput)?;

		self.provider
			.get_balance(address)
			.await
			.map_err(|e| GatewayError::Network(format!("Failed to get balance: {e}")))
	}

	async fn token_balance(&self, account: &Address) -> Result<U256, GatewayError> {
		let owner = AlloyAddress::try_from(account).map_err(GatewayError::InvalidInput)?;
		let call_data = IServiceToken::balanceOfCall { owner };

		let result = self
			.view_call(self.contracts.service_token, call_data.abi_encode())
			.await?;

		if result.len() < 32 {
			return Err(GatewayError::Contract(
				"Token balance response too short".to_string(),
			));
		}

		Ok(U256::from_be_slice(&result[..32]))
	}

	async fn activate_signer(&self, handle: &SigningHandle) -> Result<(), GatewayError> {
		let submitter = match handle {
			SigningHandle::NodeManaged(address) => {
				// The node holds the key; submissions carry the sender and
				// the node signs through eth_sendTransaction.
				let from = AlloyAddress::try_from(address).map_err(GatewayError::InvalidInput)?;
				ActiveSubmitter {
					provider: build_read_provider(&self.http_url)?,
					from: Some(from),
				}
			},
			SigningHandle::Local(signer) => {
				let chain_id = self.node_chain_id().await?;
				let chain_signer = signer.clone().with_chain_id(Some(chain_id));
				let wallet = EthereumWallet::from(chain_signer);

				let url = self
					.http_url
					.parse()
					.map_err(|e| GatewayError::InvalidInput(format!("Invalid node URL: {e}")))?;
				let retry_layer = RetryBackoffLayer::new(5, 1000, 10);
				let client = RpcClient::builder().layer(retry_layer).http(url);

				let provider = ProviderBuilder::new()
					.filler(NonceFiller::new(SimpleNonceManager::default()))
					.filler(GasFiller)
					.filler(ChainIdFiller::default())
					.wallet(wallet)
					.on_client(client);

				ActiveSubmitter {
					provider: provider.erased(),
					from: None,
				}
			},
		};

		*self.submitter.write().await = Some(submitter);
		debug!("Signer activated");
		Ok(())
	}

	async fn deactivate_signer(&self) {
		*self.submitter.write().await = None;
		debug!("Signer deactivated");
	}

	async fn sign_message(
		&self,
		handle: &SigningHandle,
		message: &[u8],
	) -> Result<Signature, GatewayError> {
		match handle {
			SigningHandle::Local(signer) => {
				let signature = signer
					.sign_message(message)
					.await
					.map_err(|e| GatewayError::Signing(format!("Local signing failed: {e}")))?;
				Ok(Signature::from(signature))
			},
			SigningHandle::NodeManaged(address) => {
				let from = AlloyAddress::try_from(address).map_err(GatewayError::InvalidInput)?;
				let data = Bytes::from(message.to_vec());
				let signature: Bytes = self
					.provider
					.raw_request("eth_sign".into(), (from, data))
					.await
					.map_err(|e| GatewayError::Signing(format!("Node signing failed: {e}")))?;
				Ok(Signature(signature.to_vec()))
			},
		}
	}

	async fn resolve_asset(&self, did: &str) -> Result<AssetDescriptor, GatewayError> {
		self.metadata.resolve(did).await
	}

	async fn check_permission(
		&self,
		asset_id: B256,
		consumer: &Address,
	) -> Result<bool, GatewayError> {
		let grantee = AlloyAddress::try_from(consumer).map_err(GatewayError::InvalidInput)?;
		let call_data = IAccessCondition::checkPermissionsCall {
			grantee,
			documentId: asset_id,
		};

		let result = self
			.view_call(self.contracts.access_condition, call_data.abi_encode())
			.await?;

		Ok(result.len() >= 32 && result[31] != 0)
	}

	async fn arm_agreement_watch(&self) -> Result<WatchPoint, GatewayError> {
		let current_block = self
			.provider
			.get_block_number()
			.await
			.map_err(|e| GatewayError::Network(format!("Failed to get block number: {e}")))?;

		// Start from the current block so an event mined while arming is
		// still inside the window.
		Ok(WatchPoint {
			from_block: current_block,
		})
	}

	async fn create_agreement(&self, agreement: &Agreement) -> Result<B256, GatewayError> {
		let consumer =
			AlloyAddress::try_from(&agreement.consumer).map_err(GatewayError::InvalidInput)?;
		let provider_party =
			AlloyAddress::try_from(&agreement.provider).map_err(GatewayError::InvalidInput)?;

		let call_data = IAccessTemplate::createAgreementCall {
			agreementId: agreement.agreement_id.into(),
			assetId: agreement.asset_id,
			consumer,
			provider: provider_party,
		};

		let tx_hash = self
			.submit(self.contracts.access_template, call_data.abi_encode())
			.await?;

		debug!(agreement_id = %agreement.agreement_id, %tx_hash, "Agreement creation submitted");
		Ok(tx_hash)
	}

	async fn agreement_created_since(
		&self,
		watch: &WatchPoint,
		agreement_id: &AgreementId,
	) -> Result<bool, GatewayError> {
		let current_block = self
			.provider
			.get_block_number()
			.await
			.map_err(|e| GatewayError::Network(format!("Failed to get block number: {e}")))?;

		if current_block < watch.from_block {
			return Ok(false);
		}

		let filter = Filter::new()
			.address(vec![self.contracts.agreement_store])
			.event_signature(vec![AgreementCreated::SIGNATURE_HASH])
			.from_block(watch.from_block)
			.to_block(current_block);

		let logs = self
			.provider
			.get_logs(&filter)
			.await
			.map_err(|e| GatewayError::Network(format!("Failed to get logs: {e}")))?;

		let wanted: B256 = (*agreement_id).into();
		for log in &logs {
			match agreement_created_id(log) {
				Some(id) if id == wanted => return Ok(true),
				Some(_) => {},
				None => warn!("Skipping undecodable agreement store log"),
			}
		}

		Ok(false)
	}

	async fn lock_payment(
		&self,
		agreement_id: &AgreementId,
		asset_id: B256,
		amount: U256,
	) -> Result<B256, GatewayError> {
		// The condition contract pulls the payment, so the token allowance
		// must be in place before the lock itself.
		let approve_call = IServiceToken::approveCall {
			spender: self.contracts.lock_payment_condition,
			amount,
		};
		self.submit_and_mine(
			self.contracts.service_token,
			approve_call.abi_encode(),
			"token approval",
		)
		.await?;

		let lock_call = ILockPaymentCondition::lockPaymentCall {
			agreementId: (*agreement_id).into(),
			assetId: asset_id,
			amount,
		};
		let tx_hash = self
			.submit_and_mine(
				self.contracts.lock_payment_condition,
				lock_call.abi_encode(),
				"payment lock",
			)
			.await?;

		debug!(agreement_id = %agreement_id, %tx_hash, "Payment locked");
		Ok(tx_hash)
	}

	async fn request_service_tokens(&self, amount: U256) -> Result<B256, GatewayError> {
		let call_data = IServiceToken::requestTokensCall { amount };

		self.submit_and_mine(
			self.contracts.service_token,
			call_data.abi_encode(),
			"token request",
		)
		.await
	}

	async fn fetch_content(&self, url: &str) -> Result<Vec<u8>, GatewayError> {
		self.metadata.fetch(url).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_contracts() -> GatewayContracts {
		let address = Address(vec![0x11; 20]);
		GatewayContracts::new(&address, &address, &address, &address, &address).unwrap()
	}

	#[test]
	fn test_contracts_reject_bad_address_length() {
		let good = Address(vec![0x11; 20]);
		let bad = Address(vec![0x22; 19]);

		let result = GatewayContracts::new(&good, &bad, &good, &good, &good);
		assert!(matches!(result, Err(GatewayError::InvalidInput(_))));
	}

	#[test]
	fn test_gateway_rejects_invalid_node_url() {
		let result = EvmGateway::new("not a url", "http://metadata.example", test_contracts());
		assert!(matches!(result, Err(GatewayError::InvalidInput(_))));
	}

	#[test]
	fn test_agreement_created_id_extraction() {
		let event = AgreementCreated {
			agreementId: B256::from([0x11; 32]),
			assetId: B256::from([0x22; 32]),
			consumer: AlloyAddress::ZERO,
			provider: AlloyAddress::ZERO,
		};

		let log = Log {
			inner: PrimLog {
				address: AlloyAddress::ZERO,
				data: event.encode_log_data(),
			},
			..Default::default()
		};

		assert_eq!(agreement_created_id(&log), Some(B256::from([0x11; 32])));
	}

	#[test]
	fn test_agreement_created_id_ignores_foreign_log() {
		let log = Log {
			inner: PrimLog {
				address: AlloyAddress::ZERO,
				data: LogData::new_unchecked(vec![B256::from([0x99; 32])], Bytes::new()),
			},
			..Default::default()
		};

		assert_eq!(agreement_created_id(&log), None);
	}

	#[tokio::test]
	async fn test_submission_requires_active_signer() {
		let gateway = EvmGateway::new(
			"http://localhost:8545",
			"http://metadata.example",
			test_contracts(),
		)
		.unwrap();

		let agreement = Agreement {
			agreement_id: AgreementId([0x01; 32]),
			asset_id: B256::from([0x02; 32]),
			consumer: Address(vec![0x33; 20]),
			provider: Address(vec![0x44; 20]),
			status: wallet_types::AgreementStatus::Created,
		};

		let result = gateway.create_agreement(&agreement).await;
		assert!(matches!(result, Err(GatewayError::Signing(_))));
	}
}
