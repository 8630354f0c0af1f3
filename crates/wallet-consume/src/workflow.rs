//! The consumption workflow itself.
//!
//! One attempt at a time walks permission check, authorization and
//! download. Authorization only runs when the consumer does not already
//! hold on-chain access; either way the content request is authenticated
//! by signing a freshly generated agreement id with the active wallet.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{B256, U256};
use tokio::sync::{broadcast, watch, Semaphore};
use tracing::{debug, info, warn};

use wallet_config::{Config, ConsumeConfig};
use wallet_gateway::{ChainGateway, WatchPoint};
use wallet_session::SessionManager;
use wallet_types::{
	did_to_asset_id, format_price, parse_address, truncate_id, Address, Agreement, AgreementId,
	AgreementStatus, AssetDescriptor, AuthorizeProgress, ConsumeStage, ServiceRecord,
};

use crate::state::{is_valid_transition, ConsumeState};
use crate::ConsumeError;

/// Decimal places of the service token, for price display.
const TOKEN_DECIMALS: u8 = 18;

/// Capacity of the authorization progress channel.
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Contract name of the deployed access agreement template.
const ACCESS_TEMPLATE_NAME: &str = "EscrowAccessTemplate";

/// Everything a caller needs to decide whether to offer the consume
/// action, and what to show when it is withheld.
#[derive(Debug, Clone, PartialEq)]
pub struct GatingInfo {
	/// Asset price in token base units, when the asset is priced.
	pub price: Option<U256>,
	/// Display form of `price`, like "2.50".
	pub price_display: Option<String>,
	/// Service-token balance of the session account.
	pub balance: U256,
	pub logged_in: bool,
	pub network_recognized: bool,
	/// True only when every precondition holds: logged in, recognized
	/// network, resolved asset, and balance covering the price.
	pub can_consume: bool,
}

/// Drives consumption attempts and publishes their state.
///
/// The workflow owns a [`watch`] channel of [`ConsumeState`] snapshots
/// and a [`broadcast`] channel of [`AuthorizeProgress`] steps. A single
/// permit serializes attempts; a `consume` or `reset` call that cannot
/// take it returns [`ConsumeError::Busy`] instead of queueing.
pub struct ConsumeWorkflow {
	gateway: Arc<dyn ChainGateway>,
	session: SessionManager,
	consume: ConsumeConfig,
	template: Address,
	state_tx: watch::Sender<ConsumeState>,
	progress_tx: broadcast::Sender<AuthorizeProgress>,
	in_flight: Semaphore,
}

impl ConsumeWorkflow {
	pub fn new(gateway: Arc<dyn ChainGateway>, session: SessionManager, config: &Config) -> Self {
		let (state_tx, _) = watch::channel(ConsumeState::idle());
		let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);

		Self {
			gateway,
			session,
			consume: config.consume.clone(),
			template: config.contracts.access_template.clone(),
			state_tx,
			progress_tx,
			in_flight: Semaphore::new(1),
		}
	}

	/// Current workflow snapshot.
	pub fn state(&self) -> ConsumeState {
		self.state_tx.borrow().clone()
	}

	/// Watch channel delivering every published snapshot; new
	/// subscribers immediately see the latest one.
	pub fn subscribe(&self) -> watch::Receiver<ConsumeState> {
		self.state_tx.subscribe()
	}

	/// Step-by-step progress of authorization runs.
	pub fn subscribe_progress(&self) -> broadcast::Receiver<AuthorizeProgress> {
		self.progress_tx.subscribe()
	}

	/// Resolves an asset and caches its descriptor.
	///
	/// Resolution failure is not an attempt failure: the workflow still
	/// lands on `Ready`, with an empty descriptor and the failure
	/// message recorded, so the caller can retry or surface it. After a
	/// finished attempt, [`Self::reset`] must run before resolving
	/// again.
	pub async fn resolve(&self, did: &str) -> Result<AssetDescriptor, ConsumeError> {
		let _permit = self
			.in_flight
			.try_acquire()
			.map_err(|_| ConsumeError::Busy)?;

		self.resolve_and_publish(did).await
	}

	/// Runs one full consumption attempt and returns the path the
	/// content was written to.
	///
	/// Re-resolves only when no descriptor for `did` is cached. A call
	/// that arrives while another attempt is in flight is rejected with
	/// [`ConsumeError::Busy`], not queued. Precondition violations are
	/// rejections and leave the stage untouched; failures past the
	/// permission check land the attempt on `Failed`.
	pub async fn consume(&self, did: &str) -> Result<PathBuf, ConsumeError> {
		let _permit = self
			.in_flight
			.try_acquire()
			.map_err(|_| ConsumeError::Busy)?;

		let session = self.session.session();
		if !session.is_logged_in() {
			return Err(ConsumeError::NotLoggedIn);
		}
		if !session.network.recognized {
			return Err(ConsumeError::NetworkUnrecognized(session.network.name));
		}
		let account = session.account.ok_or(ConsumeError::NotLoggedIn)?;

		let cached = {
			let state = self.state_tx.borrow();
			state
				.descriptor
				.as_ref()
				.filter(|descriptor| descriptor.id == did)
				.cloned()
		};
		let descriptor = match cached {
			Some(descriptor) => descriptor,
			None => self.resolve_and_publish(did).await?,
		};
		if descriptor.is_empty() {
			return Err(ConsumeError::InvalidAsset(
				"Asset metadata could not be resolved".into(),
			));
		}

		let asset_id = did_to_asset_id(&descriptor.id).map_err(ConsumeError::InvalidAsset)?;
		let endpoint = descriptor
			.access_service()
			.and_then(|service| service.service_endpoint.clone())
			.ok_or_else(|| {
				ConsumeError::InvalidAsset("Asset has no Access service endpoint".into())
			})?;

		match self
			.run_attempt(&descriptor, asset_id, &endpoint, &account)
			.await
		{
			Ok(path) => Ok(path),
			Err(error) => {
				warn!(did = %truncate_id(did), "Consumption attempt failed: {}", error);
				self.fail(&error);
				Err(error)
			}
		}
	}

	/// Clears the last attempt's outcome, landing on `Ready` when a
	/// descriptor is cached and `Idle` otherwise. Never re-resolves.
	pub fn reset(&self) -> Result<(), ConsumeError> {
		let _permit = self
			.in_flight
			.try_acquire()
			.map_err(|_| ConsumeError::Busy)?;

		self.state_tx.send_if_modified(|state| {
			// The permit excludes in-flight stages, so this only moves
			// between resting stages.
			let target = if state.descriptor.is_some() {
				ConsumeStage::Ready
			} else {
				ConsumeStage::Idle
			};
			let changed = state.stage != target
				|| state.agreement_id.is_some()
				|| state.last_error.is_some()
				|| state.downloaded_to.is_some();

			state.stage = target;
			state.agreement_id = None;
			state.last_error = None;
			state.downloaded_to = None;
			changed
		});

		Ok(())
	}

	/// Snapshot of the consume-action preconditions.
	pub fn gating(&self) -> GatingInfo {
		let session = self.session.session();
		let state = self.state_tx.borrow();

		let price = state
			.descriptor
			.as_ref()
			.and_then(|descriptor| descriptor.base_price());
		let resolved = state
			.descriptor
			.as_ref()
			.map(|descriptor| !descriptor.is_empty())
			.unwrap_or(false);
		let balance = session.balance.service_token;
		let affordable = price.map(|price| balance >= price).unwrap_or(false);

		GatingInfo {
			price,
			price_display: price.map(|price| format_price(price, TOKEN_DECIMALS)),
			balance,
			logged_in: session.is_logged_in(),
			network_recognized: session.network.recognized,
			can_consume: session.is_eligible() && resolved && affordable,
		}
	}

	async fn resolve_and_publish(&self, did: &str) -> Result<AssetDescriptor, ConsumeError> {
		self.transition(ConsumeStage::Resolving)?;
		info!(did = %truncate_id(did), "Resolving asset");

		let (descriptor, failure) = match self.gateway.resolve_asset(did).await {
			Ok(descriptor) => (descriptor, None),
			Err(e) => {
				warn!(did = %truncate_id(did), "Asset resolution failed: {}", e);
				(AssetDescriptor::empty(did), Some(e.to_string()))
			}
		};

		let published = descriptor.clone();
		self.transition_with(ConsumeStage::Ready, |state| {
			state.price_display = published
				.base_price()
				.map(|price| format_price(price, TOKEN_DECIMALS));
			state.descriptor = Some(published);
			state.agreement_id = None;
			state.last_error = failure;
			state.downloaded_to = None;
		})?;

		Ok(descriptor)
	}

	async fn run_attempt(
		&self,
		descriptor: &AssetDescriptor,
		asset_id: B256,
		endpoint: &str,
		account: &Address,
	) -> Result<PathBuf, ConsumeError> {
		// Fresh id for every attempt; ids are never reused across retries.
		let agreement_id = AgreementId(rand::random());
		self.transition_with(ConsumeStage::CheckingPermission, |state| {
			state.agreement_id = Some(agreement_id);
			state.last_error = None;
			state.downloaded_to = None;
		})?;
		info!(
			did = %truncate_id(&descriptor.id),
			agreement_id = %agreement_id,
			"Starting consumption attempt"
		);

		let permitted = self
			.gateway
			.check_permission(asset_id, account)
			.await
			.map_err(|e| ConsumeError::PermissionCheckFailed(e.to_string()))?;

		if permitted {
			debug!(
				did = %truncate_id(&descriptor.id),
				"Access already granted, skipping authorization"
			);
		} else {
			self.authorize(descriptor, asset_id, account, agreement_id)
				.await?;
		}

		self.transition(ConsumeStage::Fetching)?;
		let wallet = self.session.wallet().await.ok_or(ConsumeError::NotLoggedIn)?;
		let signature = self
			.gateway
			.sign_message(&wallet.signing_handle(), agreement_id.to_hex().as_bytes())
			.await
			.map_err(|e| ConsumeError::SigningFailed(e.to_string()))?;

		let url = content_url(
			endpoint,
			&descriptor.id,
			account,
			&agreement_id,
			&signature.to_string(),
		);
		debug!(did = %truncate_id(&descriptor.id), "Requesting content from provider");
		let payload = self
			.gateway
			.fetch_content(&url)
			.await
			.map_err(|e| ConsumeError::ContentFetchFailed(e.to_string()))?;

		let path = self.persist(&payload).await?;
		let downloaded = path.clone();
		self.transition_with(ConsumeStage::Succeeded, |state| {
			state.downloaded_to = Some(downloaded);
			state.last_error = None;
		})?;
		info!(
			did = %truncate_id(&descriptor.id),
			path = %path.display(),
			"Consumption succeeded"
		);

		Ok(path)
	}

	/// On-chain authorization: create the agreement, wait for its
	/// confirmation event, lock the payment.
	///
	/// Progress steps go out strictly in order; observers can rely on
	/// submitted, confirmed, locked never skipping or reordering.
	async fn authorize(
		&self,
		descriptor: &AssetDescriptor,
		asset_id: B256,
		account: &Address,
		agreement_id: AgreementId,
	) -> Result<(), ConsumeError> {
		let price = descriptor
			.base_price()
			.ok_or_else(|| ConsumeError::InvalidAsset("Asset has no price".into()))?;
		let balance = self.session.session().balance.service_token;
		if balance < price {
			return Err(ConsumeError::InsufficientBalance {
				have: balance,
				need: price,
			});
		}

		let access = descriptor
			.access_service()
			.ok_or_else(|| ConsumeError::InvalidAsset("Asset has no Access service".into()))?;
		self.verify_template(access)?;

		self.transition(ConsumeStage::CreatingAgreement)?;
		info!(
			agreement_id = %agreement_id,
			did = %truncate_id(&descriptor.id),
			service = %access.service_definition_id,
			"Creating service agreement"
		);

		// The watch window must open before the submission goes out, or
		// a quickly mined creation event could land outside it.
		let watch_point = self
			.gateway
			.arm_agreement_watch()
			.await
			.map_err(|e| ConsumeError::AgreementCreationFailed(e.to_string()))?;

		let agreement = Agreement {
			agreement_id,
			asset_id,
			consumer: account.clone(),
			provider: self.provider_party(account),
			status: AgreementStatus::Created,
		};
		self.gateway
			.create_agreement(&agreement)
			.await
			.map_err(|e| ConsumeError::AgreementCreationFailed(e.to_string()))?;
		self.emit(AuthorizeProgress::AgreementSubmitted { agreement_id });

		self.transition(ConsumeStage::AwaitingConfirmation)?;
		self.await_confirmation(&watch_point, &agreement_id).await?;
		self.emit(AuthorizeProgress::AgreementConfirmed { agreement_id });

		self.transition(ConsumeStage::LockingPayment)?;
		self.gateway
			.lock_payment(&agreement_id, asset_id, price)
			.await
			.map_err(|e| ConsumeError::PaymentLockFailed {
				agreement_id: agreement_id.to_hex(),
				asset_id: asset_id.to_string(),
				reason: e.to_string(),
			})?;
		self.emit(AuthorizeProgress::PaymentLocked { agreement_id });
		self.transition(ConsumeStage::PaymentLocked)?;
		info!(agreement_id = %agreement_id, "Authorization complete");

		Ok(())
	}

	/// Checks the Access service's agreement template reference against
	/// the deployed template.
	///
	/// Documents pin the template they were published against either by
	/// contract name or by address; an absent reference means the
	/// deployment default. Any other template cannot be authorized here.
	fn verify_template(&self, access: &ServiceRecord) -> Result<(), ConsumeError> {
		let declared = match access.agreement_template.as_deref() {
			None => return Ok(()),
			Some(declared) => declared,
		};
		if declared == ACCESS_TEMPLATE_NAME {
			return Ok(());
		}
		match parse_address(declared) {
			Ok(address) if address == self.template => Ok(()),
			_ => Err(ConsumeError::InvalidAsset(format!(
				"Asset names an unknown agreement template: {declared}"
			))),
		}
	}

	/// Polls for the agreement-created event until the configured
	/// deadline passes.
	async fn await_confirmation(
		&self,
		watch_point: &WatchPoint,
		agreement_id: &AgreementId,
	) -> Result<(), ConsumeError> {
		let timeout = Duration::from_secs(self.consume.confirmation_timeout_seconds);
		let check_interval = Duration::from_secs(self.consume.confirmation_poll_seconds);
		let start_time = tokio::time::Instant::now();

		loop {
			if start_time.elapsed() > timeout {
				warn!(
					agreement_id = %agreement_id,
					"Gave up waiting for agreement confirmation"
				);
				return Err(ConsumeError::AgreementConfirmationTimeout(
					self.consume.confirmation_timeout_seconds,
				));
			}

			match self
				.gateway
				.agreement_created_since(watch_point, agreement_id)
				.await
			{
				Ok(true) => {
					debug!(agreement_id = %agreement_id, "Agreement confirmed on chain");
					return Ok(());
				}
				Ok(false) => {}
				// Transient node trouble; keep checking until the deadline.
				Err(e) => debug!("Agreement confirmation check failed: {}", e),
			}

			tokio::time::sleep(check_interval).await;
		}
	}

	async fn persist(&self, payload: &[u8]) -> Result<PathBuf, ConsumeError> {
		let dir = &self.consume.download_dir;
		tokio::fs::create_dir_all(dir).await.map_err(|e| {
			ConsumeError::PersistFailed(format!("Failed to create {}: {}", dir.display(), e))
		})?;

		// Temp file plus rename, so readers never observe partial content.
		let path = dir.join(&self.consume.download_filename);
		let temp_path = path.with_extension("tmp");
		tokio::fs::write(&temp_path, payload).await.map_err(|e| {
			ConsumeError::PersistFailed(format!("Failed to write {}: {}", temp_path.display(), e))
		})?;
		tokio::fs::rename(&temp_path, &path).await.map_err(|e| {
			ConsumeError::PersistFailed(format!(
				"Failed to move content into {}: {}",
				path.display(),
				e
			))
		})?;
		info!(path = %path.display(), bytes = payload.len(), "Content written");

		Ok(path)
	}

	/// Provider party recorded on new agreements; falls back to the
	/// consumer itself when none is configured.
	fn provider_party(&self, consumer: &Address) -> Address {
		self.consume
			.provider_address
			.clone()
			.unwrap_or_else(|| consumer.clone())
	}

	fn transition(&self, to: ConsumeStage) -> Result<(), ConsumeError> {
		self.transition_with(to, |_| {})
	}

	/// Validated stage change, applying `apply` within the same
	/// published snapshot.
	fn transition_with<F>(&self, to: ConsumeStage, apply: F) -> Result<(), ConsumeError>
	where
		F: FnOnce(&mut ConsumeState),
	{
		let mut rejected = None;
		self.state_tx.send_if_modified(|state| {
			if !is_valid_transition(state.stage, to) {
				rejected = Some(ConsumeError::InvalidTransition {
					from: state.stage,
					to,
				});
				return false;
			}
			debug!(from = %state.stage, to = %to, "Stage change");
			state.stage = to;
			apply(state);
			true
		});

		match rejected {
			Some(error) => Err(error),
			None => Ok(()),
		}
	}

	/// Lands the in-flight attempt on `Failed`, keeping the descriptor.
	/// A no-op for rejections raised before the attempt started.
	fn fail(&self, error: &ConsumeError) {
		self.state_tx.send_if_modified(|state| {
			if !is_valid_transition(state.stage, ConsumeStage::Failed) {
				return false;
			}
			state.stage = ConsumeStage::Failed;
			state.last_error = Some(error.to_string());
			true
		});
	}

	fn emit(&self, step: AuthorizeProgress) {
		debug!(step = step.step_index(), "{}", step.message());
		// Nobody listening is fine.
		let _ = self.progress_tx.send(step);
	}
}

/// Signed content URL. The provider authenticates the consumer by the
/// signature over the agreement id and the on-chain permission of the
/// consumer address.
fn content_url(
	endpoint: &str,
	did: &str,
	consumer: &Address,
	agreement_id: &AgreementId,
	signature: &str,
) -> String {
	format!(
		"{endpoint}?did={did}&consumerAddress={consumer}&agreementId={agreement}&agreementIdSignature={signature}",
		agreement = agreement_id.to_hex(),
	)
}

#[cfg(test)]
mod tests {
	use super::*;
	use wallet_gateway::{GatewayError, MockChainGateway};
	use wallet_store::MemoryStore;
	use wallet_types::{ServiceRecord, Signature, SERVICE_ACCESS, SERVICE_METADATA};

	const TEST_DID: &str =
		"did:op:aabbccddeeff00112233445566778899aabbccddeeff00112233445566778899";
	const TEST_ENDPOINT: &str = "http://provider.example/api/v1/services/consume";
	const PRICE: u64 = 2_500_000_000_000_000_000;

	fn test_config(download_dir: &std::path::Path, timeout_seconds: u64, poll_seconds: u64) -> Config {
		Config::from_toml_str(&format!(
			r#"
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

			[consume]
			confirmation_timeout_seconds = {timeout_seconds}
			confirmation_poll_seconds = {poll_seconds}
			download_dir = "{dir}"
			"#,
			dir = download_dir.display(),
		))
		.unwrap()
	}

	fn account(byte: u8) -> Address {
		Address(vec![byte; 20])
	}

	fn priced_descriptor() -> AssetDescriptor {
		AssetDescriptor {
			id: TEST_DID.to_string(),
			services: vec![
				ServiceRecord {
					service_type: SERVICE_METADATA.to_string(),
					service_definition_id: "0".to_string(),
					service_endpoint: None,
					agreement_template: None,
					base_price: Some(U256::from(PRICE)),
				},
				ServiceRecord {
					service_type: SERVICE_ACCESS.to_string(),
					service_definition_id: "1".to_string(),
					service_endpoint: Some(TEST_ENDPOINT.to_string()),
					agreement_template: None,
					base_price: None,
				},
			],
		}
	}

	/// [`priced_descriptor`] with the Access service pinning an
	/// agreement template reference.
	fn descriptor_with_template(reference: &str) -> AssetDescriptor {
		let mut descriptor = priced_descriptor();
		descriptor.services[1].agreement_template = Some(reference.to_string());
		descriptor
	}

	/// Gateway stub for a login on the given chain with the given
	/// service-token balance.
	fn gateway_on_chain(granted: Address, token_balance: u64, chain_id: u64) -> MockChainGateway {
		let mut gateway = MockChainGateway::new();
		let for_request = granted.clone();
		let for_available = granted;

		gateway
			.expect_request_accounts()
			.returning(move || Ok(vec![for_request.clone()]));
		gateway
			.expect_available_accounts()
			.returning(move || Ok(vec![for_available.clone()]));
		gateway.expect_activate_signer().returning(|_| Ok(()));
		gateway.expect_deactivate_signer().returning(|| ());
		gateway.expect_chain_id().returning(move || Ok(chain_id));
		gateway
			.expect_native_balance()
			.returning(|_| Ok(U256::from(5)));
		gateway
			.expect_token_balance()
			.returning(move |_| Ok(U256::from(token_balance)));
		gateway
	}

	fn funded_gateway(granted: Address) -> MockChainGateway {
		gateway_on_chain(granted, PRICE, 8996)
	}

	async fn logged_in_workflow(gateway: MockChainGateway, config: &Config) -> ConsumeWorkflow {
		let gateway: Arc<dyn ChainGateway> = Arc::new(gateway);
		let session =
			SessionManager::new(gateway.clone(), Arc::new(MemoryStore::new()), config);
		session.login_injected().await.unwrap();
		ConsumeWorkflow::new(gateway, session, config)
	}

	#[tokio::test]
	async fn test_resolve_caches_descriptor_and_price() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path(), 300, 0);
		let mut gateway = funded_gateway(account(0xaa));
		gateway
			.expect_resolve_asset()
			.returning(|_| Ok(priced_descriptor()));

		let workflow = logged_in_workflow(gateway, &config).await;
		let descriptor = workflow.resolve(TEST_DID).await.unwrap();

		assert!(!descriptor.is_empty());
		let state = workflow.state();
		assert_eq!(state.stage, ConsumeStage::Ready);
		assert_eq!(state.price_display.as_deref(), Some("2.50"));
		assert!(state.last_error.is_none());
	}

	#[tokio::test]
	async fn test_failed_resolution_still_lands_on_ready() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path(), 300, 0);
		let mut gateway = funded_gateway(account(0xaa));
		gateway
			.expect_resolve_asset()
			.returning(|_| Err(GatewayError::Metadata("aquarius is down".into())));

		let workflow = logged_in_workflow(gateway, &config).await;
		let descriptor = workflow.resolve(TEST_DID).await.unwrap();

		assert!(descriptor.is_empty());
		let state = workflow.state();
		assert_eq!(state.stage, ConsumeStage::Ready);
		assert!(state.descriptor.unwrap().is_empty());
		assert!(state.last_error.unwrap().contains("aquarius is down"));
	}

	#[tokio::test]
	async fn test_consume_requires_login() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path(), 300, 0);
		let mut gateway = MockChainGateway::new();
		gateway
			.expect_resolve_asset()
			.returning(|_| Ok(priced_descriptor()));

		let gateway: Arc<dyn ChainGateway> = Arc::new(gateway);
		let session =
			SessionManager::new(gateway.clone(), Arc::new(MemoryStore::new()), &config);
		let workflow = ConsumeWorkflow::new(gateway, session, &config);

		workflow.resolve(TEST_DID).await.unwrap();
		let error = workflow.consume(TEST_DID).await.unwrap_err();

		assert!(matches!(error, ConsumeError::NotLoggedIn));
		assert_eq!(workflow.state().stage, ConsumeStage::Ready);
	}

	#[tokio::test]
	async fn test_consume_requires_recognized_network() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path(), 300, 0);
		let mut gateway = gateway_on_chain(account(0xaa), PRICE, 1);
		gateway
			.expect_resolve_asset()
			.returning(|_| Ok(priced_descriptor()));

		let workflow = logged_in_workflow(gateway, &config).await;
		workflow.resolve(TEST_DID).await.unwrap();
		let error = workflow.consume(TEST_DID).await.unwrap_err();

		match error {
			ConsumeError::NetworkUnrecognized(name) => assert_eq!(name, "Chain 1"),
			other => panic!("Expected NetworkUnrecognized, got {other}"),
		}
		assert_eq!(workflow.state().stage, ConsumeStage::Ready);
	}

	#[tokio::test]
	async fn test_consume_rejects_unresolved_asset() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path(), 300, 0);
		let mut gateway = funded_gateway(account(0xaa));
		gateway
			.expect_resolve_asset()
			.returning(|_| Err(GatewayError::Metadata("aquarius is down".into())));

		let workflow = logged_in_workflow(gateway, &config).await;
		workflow.resolve(TEST_DID).await.unwrap();
		let error = workflow.consume(TEST_DID).await.unwrap_err();

		assert!(matches!(error, ConsumeError::InvalidAsset(_)));
		assert_eq!(workflow.state().stage, ConsumeStage::Ready);
	}

	#[tokio::test]
	async fn test_granted_access_goes_straight_to_fetch() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path(), 300, 0);
		let mut gateway = funded_gateway(account(0xaa));
		gateway
			.expect_resolve_asset()
			.returning(|_| Ok(priced_descriptor()));
		gateway.expect_check_permission().returning(|_, _| Ok(true));
		gateway
			.expect_sign_message()
			.returning(|_, _| Ok(Signature(vec![0xab; 65])));
		// No create_agreement or lock_payment expectations: the mock
		// panics if the workflow tries to authorize anyway.
		gateway
			.expect_fetch_content()
			.withf(|url: &str| {
				url.starts_with(TEST_ENDPOINT) && url.contains("agreementIdSignature=0xab")
			})
			.returning(|_| Ok(b"dataset bytes".to_vec()));

		let workflow = logged_in_workflow(gateway, &config).await;
		workflow.resolve(TEST_DID).await.unwrap();
		let path = workflow.consume(TEST_DID).await.unwrap();

		assert_eq!(path, dir.path().join("dataset.bin"));
		assert_eq!(std::fs::read(&path).unwrap(), b"dataset bytes");
		let state = workflow.state();
		assert_eq!(state.stage, ConsumeStage::Succeeded);
		assert_eq!(state.downloaded_to, Some(path));
	}

	#[tokio::test]
	async fn test_authorization_runs_all_steps_in_order() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path(), 300, 0);
		let mut gateway = funded_gateway(account(0xaa));
		gateway
			.expect_resolve_asset()
			.returning(|_| Ok(descriptor_with_template(ACCESS_TEMPLATE_NAME)));
		gateway
			.expect_check_permission()
			.returning(|_, _| Ok(false));

		// The watch must be armed before the creation goes out.
		let mut order = mockall::Sequence::new();
		gateway
			.expect_arm_agreement_watch()
			.times(1)
			.in_sequence(&mut order)
			.returning(|| Ok(WatchPoint { from_block: 10 }));
		gateway
			.expect_create_agreement()
			.times(1)
			.in_sequence(&mut order)
			.withf(|agreement| {
				agreement.status == AgreementStatus::Created
					&& agreement.consumer == account(0xaa)
					&& agreement.provider == account(0xaa)
			})
			.returning(|_| Ok(B256::ZERO));
		gateway
			.expect_agreement_created_since()
			.times(1)
			.in_sequence(&mut order)
			.returning(|_, _| Ok(true));
		gateway
			.expect_lock_payment()
			.times(1)
			.in_sequence(&mut order)
			.withf(|_, _, amount| *amount == U256::from(PRICE))
			.returning(|_, _, _| Ok(B256::ZERO));

		gateway
			.expect_sign_message()
			.returning(|_, _| Ok(Signature(vec![0xab; 65])));
		gateway
			.expect_fetch_content()
			.returning(|_| Ok(b"dataset bytes".to_vec()));

		let workflow = logged_in_workflow(gateway, &config).await;
		workflow.resolve(TEST_DID).await.unwrap();
		let mut progress = workflow.subscribe_progress();

		workflow.consume(TEST_DID).await.unwrap();

		let steps: Vec<u8> = [
			progress.try_recv().unwrap(),
			progress.try_recv().unwrap(),
			progress.try_recv().unwrap(),
		]
		.iter()
		.map(AuthorizeProgress::step_index)
		.collect();
		assert_eq!(steps, vec![0, 1, 2]);
		assert_eq!(workflow.state().stage, ConsumeStage::Succeeded);
	}

	#[tokio::test]
	async fn test_unconfirmed_agreement_times_out() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path(), 1, 1);
		let mut gateway = funded_gateway(account(0xaa));
		gateway
			.expect_resolve_asset()
			.returning(|_| Ok(priced_descriptor()));
		gateway
			.expect_check_permission()
			.returning(|_, _| Ok(false));
		gateway
			.expect_arm_agreement_watch()
			.returning(|| Ok(WatchPoint { from_block: 10 }));
		gateway
			.expect_create_agreement()
			.returning(|_| Ok(B256::ZERO));
		gateway
			.expect_agreement_created_since()
			.returning(|_, _| Ok(false));

		let workflow = logged_in_workflow(gateway, &config).await;
		workflow.resolve(TEST_DID).await.unwrap();
		let error = workflow.consume(TEST_DID).await.unwrap_err();

		assert!(matches!(
			error,
			ConsumeError::AgreementConfirmationTimeout(1)
		));
		let state = workflow.state();
		assert_eq!(state.stage, ConsumeStage::Failed);
		assert!(state.last_error.unwrap().contains("not confirmed"));
	}

	#[tokio::test]
	async fn test_underfunded_account_cannot_authorize() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path(), 300, 0);
		let mut gateway = gateway_on_chain(account(0xaa), 7, 8996);
		gateway
			.expect_resolve_asset()
			.returning(|_| Ok(priced_descriptor()));
		gateway
			.expect_check_permission()
			.returning(|_, _| Ok(false));
		// Nothing past the permission check may reach the chain.

		let workflow = logged_in_workflow(gateway, &config).await;
		workflow.resolve(TEST_DID).await.unwrap();
		let error = workflow.consume(TEST_DID).await.unwrap_err();

		match error {
			ConsumeError::InsufficientBalance { have, need } => {
				assert_eq!(have, U256::from(7));
				assert_eq!(need, U256::from(PRICE));
			}
			other => panic!("Expected InsufficientBalance, got {other}"),
		}
		assert_eq!(workflow.state().stage, ConsumeStage::Failed);
	}

	#[tokio::test]
	async fn test_foreign_template_cannot_be_authorized() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path(), 300, 0);
		let mut gateway = funded_gateway(account(0xaa));
		gateway.expect_resolve_asset().returning(|_| {
			Ok(descriptor_with_template(
				"0x9999999999999999999999999999999999999999",
			))
		});
		gateway
			.expect_check_permission()
			.returning(|_, _| Ok(false));
		// No agreement may be created against a template we do not run.

		let workflow = logged_in_workflow(gateway, &config).await;
		workflow.resolve(TEST_DID).await.unwrap();
		let error = workflow.consume(TEST_DID).await.unwrap_err();

		match error {
			ConsumeError::InvalidAsset(message) => {
				assert!(message.contains("unknown agreement template"));
			}
			other => panic!("Expected InvalidAsset, got {other}"),
		}
		assert_eq!(workflow.state().stage, ConsumeStage::Failed);
	}

	#[tokio::test]
	async fn test_payment_lock_failure_names_the_agreement() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path(), 300, 0);
		let mut gateway = funded_gateway(account(0xaa));
		// Address-form template reference, matching the configured one.
		gateway.expect_resolve_asset().returning(|_| {
			Ok(descriptor_with_template(
				"0x2222222222222222222222222222222222222222",
			))
		});
		gateway
			.expect_check_permission()
			.returning(|_, _| Ok(false));
		gateway
			.expect_arm_agreement_watch()
			.returning(|| Ok(WatchPoint { from_block: 10 }));
		gateway
			.expect_create_agreement()
			.returning(|_| Ok(B256::ZERO));
		gateway
			.expect_agreement_created_since()
			.returning(|_, _| Ok(true));
		gateway
			.expect_lock_payment()
			.returning(|_, _, _| Err(GatewayError::Contract("payment lock reverted".into())));

		let workflow = logged_in_workflow(gateway, &config).await;
		workflow.resolve(TEST_DID).await.unwrap();
		let error = workflow.consume(TEST_DID).await.unwrap_err();

		match error {
			ConsumeError::PaymentLockFailed {
				agreement_id,
				asset_id,
				reason,
			} => {
				assert!(agreement_id.starts_with("0x"));
				assert!(asset_id.starts_with("0x"));
				assert!(reason.contains("reverted"));
			}
			other => panic!("Expected PaymentLockFailed, got {other}"),
		}
		assert_eq!(workflow.state().stage, ConsumeStage::Failed);
	}

	#[tokio::test]
	async fn test_reset_keeps_the_descriptor() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path(), 300, 0);
		let mut gateway = gateway_on_chain(account(0xaa), 7, 8996);
		gateway
			.expect_resolve_asset()
			.returning(|_| Ok(priced_descriptor()));
		gateway
			.expect_check_permission()
			.returning(|_, _| Ok(false));

		let workflow = logged_in_workflow(gateway, &config).await;
		workflow.resolve(TEST_DID).await.unwrap();
		workflow.consume(TEST_DID).await.unwrap_err();
		assert_eq!(workflow.state().stage, ConsumeStage::Failed);

		workflow.reset().unwrap();

		let state = workflow.state();
		assert_eq!(state.stage, ConsumeStage::Ready);
		assert!(state.descriptor.is_some());
		assert!(state.agreement_id.is_none());
		assert!(state.last_error.is_none());
		assert!(state.downloaded_to.is_none());
	}

	#[tokio::test]
	async fn test_reset_without_descriptor_returns_to_idle() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path(), 300, 0);
		let workflow =
			logged_in_workflow(funded_gateway(account(0xaa)), &config).await;

		workflow.reset().unwrap();

		assert_eq!(workflow.state().stage, ConsumeStage::Idle);
	}

	#[tokio::test]
	async fn test_finished_attempt_requires_reset_before_retrying() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path(), 300, 0);
		let mut gateway = funded_gateway(account(0xaa));
		gateway
			.expect_resolve_asset()
			.returning(|_| Ok(priced_descriptor()));
		gateway.expect_check_permission().returning(|_, _| Ok(true));
		gateway
			.expect_sign_message()
			.returning(|_, _| Ok(Signature(vec![0xab; 65])));
		gateway
			.expect_fetch_content()
			.returning(|_| Ok(b"dataset bytes".to_vec()));

		let workflow = logged_in_workflow(gateway, &config).await;
		workflow.resolve(TEST_DID).await.unwrap();
		workflow.consume(TEST_DID).await.unwrap();
		assert_eq!(workflow.state().stage, ConsumeStage::Succeeded);

		let error = workflow.consume(TEST_DID).await.unwrap_err();
		assert!(matches!(error, ConsumeError::InvalidTransition { .. }));
		assert_eq!(workflow.state().stage, ConsumeStage::Succeeded);

		workflow.reset().unwrap();
		workflow.consume(TEST_DID).await.unwrap();
		assert_eq!(workflow.state().stage, ConsumeStage::Succeeded);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn test_in_flight_attempt_rejects_reentry() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path(), 300, 0);
		let mut gateway = funded_gateway(account(0xaa));
		gateway
			.expect_resolve_asset()
			.returning(|_| Ok(priced_descriptor()));
		gateway.expect_check_permission().returning(|_, _| Ok(true));
		gateway
			.expect_sign_message()
			.returning(|_, _| Ok(Signature(vec![0xab; 65])));
		gateway.expect_fetch_content().returning(|_| {
			std::thread::sleep(Duration::from_millis(300));
			Ok(b"dataset bytes".to_vec())
		});

		let workflow = Arc::new(logged_in_workflow(gateway, &config).await);
		workflow.resolve(TEST_DID).await.unwrap();

		let background = {
			let workflow = workflow.clone();
			tokio::spawn(async move { workflow.consume(TEST_DID).await })
		};

		// Give the background attempt time to take the slot.
		tokio::time::sleep(Duration::from_millis(100)).await;
		let error = workflow.consume(TEST_DID).await.unwrap_err();
		assert!(matches!(error, ConsumeError::Busy));
		assert!(matches!(
			workflow.reset().unwrap_err(),
			ConsumeError::Busy
		));

		background.await.unwrap().unwrap();
		assert_eq!(workflow.state().stage, ConsumeStage::Succeeded);
	}

	#[tokio::test]
	async fn test_consume_resolves_when_nothing_is_cached() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path(), 300, 0);
		let mut gateway = funded_gateway(account(0xaa));
		gateway
			.expect_resolve_asset()
			.returning(|_| Ok(priced_descriptor()));
		gateway.expect_check_permission().returning(|_, _| Ok(true));
		gateway
			.expect_sign_message()
			.returning(|_, _| Ok(Signature(vec![0xab; 65])));
		gateway
			.expect_fetch_content()
			.returning(|_| Ok(b"dataset bytes".to_vec()));

		let workflow = logged_in_workflow(gateway, &config).await;
		workflow.consume(TEST_DID).await.unwrap();

		let state = workflow.state();
		assert_eq!(state.stage, ConsumeStage::Succeeded);
		assert!(state.descriptor.is_some());
	}

	#[tokio::test]
	async fn test_gating_allows_funded_logged_in_session() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path(), 300, 0);
		let mut gateway = funded_gateway(account(0xaa));
		gateway
			.expect_resolve_asset()
			.returning(|_| Ok(priced_descriptor()));

		let workflow = logged_in_workflow(gateway, &config).await;
		workflow.resolve(TEST_DID).await.unwrap();
		let gating = workflow.gating();

		assert_eq!(gating.price, Some(U256::from(PRICE)));
		assert_eq!(gating.price_display.as_deref(), Some("2.50"));
		assert!(gating.logged_in);
		assert!(gating.network_recognized);
		assert!(gating.can_consume);
	}

	#[tokio::test]
	async fn test_gating_blocks_short_balance() {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(dir.path(), 300, 0);
		let mut gateway = gateway_on_chain(account(0xaa), 7, 8996);
		gateway
			.expect_resolve_asset()
			.returning(|_| Ok(priced_descriptor()));

		let workflow = logged_in_workflow(gateway, &config).await;
		assert!(!workflow.gating().can_consume);

		workflow.resolve(TEST_DID).await.unwrap();
		let gating = workflow.gating();

		assert_eq!(gating.balance, U256::from(7));
		assert_eq!(gating.price, Some(U256::from(PRICE)));
		assert!(gating.logged_in);
		assert!(!gating.can_consume);
	}

	#[test]
	fn test_content_url_carries_all_query_parameters() {
		let id = AgreementId([0x11; 32]);
		let url = content_url(TEST_ENDPOINT, TEST_DID, &account(0xaa), &id, "0xfeed");

		assert_eq!(
			url,
			format!(
				"{TEST_ENDPOINT}?did={TEST_DID}&consumerAddress=0x{}&agreementId={}&agreementIdSignature=0xfeed",
				"aa".repeat(20),
				id.to_hex(),
			)
		);
	}
}
