//! Session manager implementation.
//!
//! Owns the authoritative [`Session`] snapshot, the active wallet credential
//! and the background poller. All mutations funnel through one publish
//! helper; a snapshot is sent to watchers only when it actually changed.
//!
//! Polling runs on two tasks with independent cadences: the account task
//! refreshes the account and its balances every tick, and the network task
//! re-reads the network identity on its longer period. Both share one
//! single-flight gate; a tick that finds a refresh still in flight is
//! skipped instead of queued, so a slow node can never stack refreshes
//! behind itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wallet_config::Config;
use wallet_gateway::ChainGateway;
use wallet_provider::{GeneratedWallet, InjectedWallet, WalletProvider};
use wallet_store::{StateStore, StoreError};
use wallet_types::{
	Address, Balances, LoadState, LoginState, NetworkStatus, RecognizedNetworks, Session,
	StoreKey, WalletKind,
};

use crate::SessionError;

/// Running poller tasks plus their shared shutdown signal.
struct PollerHandle {
	stop_tx: broadcast::Sender<()>,
	handles: Vec<JoinHandle<()>>,
}

struct SessionInner {
	gateway: Arc<dyn ChainGateway>,
	store: Arc<dyn StateStore>,
	networks: RecognizedNetworks,
	account_poll: Duration,
	network_poll: Duration,
	/// Active wallet credential, present exactly while logged in.
	wallet: RwLock<Option<WalletProvider>>,
	/// Published snapshot; replaced wholesale, sent only on change.
	session_tx: watch::Sender<Session>,
	/// Single-flight gate so refresh passes never overlap.
	refresh_gate: Semaphore,
	poller: Mutex<Option<PollerHandle>>,
}

/// Owner of wallet session state.
///
/// Cheap to clone; all clones share the same underlying session.
#[derive(Clone)]
pub struct SessionManager {
	inner: Arc<SessionInner>,
}

impl SessionManager {
	/// Creates a manager over the given gateway and store.
	///
	/// The session starts in its bootstrapping state; call
	/// [`SessionManager::bootstrap`] to restore any persisted login and
	/// [`SessionManager::start`] to begin polling.
	pub fn new(
		gateway: Arc<dyn ChainGateway>,
		store: Arc<dyn StateStore>,
		config: &Config,
	) -> Self {
		let (session_tx, _) = watch::channel(Session::bootstrapping());

		Self {
			inner: Arc::new(SessionInner {
				gateway,
				store,
				networks: config.networks.clone(),
				account_poll: Duration::from_millis(config.session.account_poll_ms),
				network_poll: Duration::from_millis(config.network_poll_ms()),
				wallet: RwLock::new(None),
				session_tx,
				refresh_gate: Semaphore::new(1),
				poller: Mutex::new(None),
			}),
		}
	}

	/// Returns the current session snapshot.
	pub fn session(&self) -> Session {
		self.inner.session_tx.borrow().clone()
	}

	/// Subscribes to session snapshot updates.
	pub fn subscribe(&self) -> watch::Receiver<Session> {
		self.inner.session_tx.subscribe()
	}

	/// Returns the active wallet credential, if logged in.
	pub async fn wallet(&self) -> Option<WalletProvider> {
		self.inner.wallet.read().await.clone()
	}

	/// Restores the persisted login method and takes the initial readings.
	///
	/// Always completes: a wallet that cannot be restored leaves the session
	/// logged out instead of failing bootstrap.
	pub async fn bootstrap(&self) {
		self.inner.publish(|session| {
			session.status_message = "Restoring session".to_string();
		});

		match self.inner.persisted_kind().await {
			Some(WalletKind::Injected) => {
				if let Err(e) = self.inner.login_injected().await {
					info!("Persisted injected login not restored: {}", e);
				}
			},
			Some(WalletKind::GeneratedKey) => {
				if let Err(e) = self.inner.login_generated().await {
					info!("Persisted generated-key login not restored: {}", e);
				}
			},
			_ => {},
		}

		// Network identity is observable even while logged out.
		self.inner.refresh_now(true).await;

		self.inner.publish(|session| {
			session.load_state = LoadState::Ready;
			session.status_message = "Ready".to_string();
		});
	}

	/// Starts the background pollers.
	pub async fn start(&self) -> Result<(), SessionError> {
		let mut guard = self.inner.poller.lock().await;
		if guard.is_some() {
			return Err(SessionError::AlreadyRunning);
		}

		let (stop_tx, _) = broadcast::channel(1);
		let account_inner = self.inner.clone();
		let account_stop = stop_tx.subscribe();
		let account_task = tokio::spawn(async move {
			run_account_poller(account_inner, account_stop).await;
		});
		let network_inner = self.inner.clone();
		let network_stop = stop_tx.subscribe();
		let network_task = tokio::spawn(async move {
			run_network_poller(network_inner, network_stop).await;
		});

		*guard = Some(PollerHandle {
			stop_tx,
			handles: vec![account_task, network_task],
		});
		info!(
			account_poll_ms = self.inner.account_poll.as_millis() as u64,
			network_poll_ms = self.inner.network_poll.as_millis() as u64,
			"Session pollers started"
		);
		Ok(())
	}

	/// Stops the background pollers and waits for them to finish.
	pub async fn shutdown(&self) {
		if let Some(poller) = self.inner.poller.lock().await.take() {
			let _ = poller.stop_tx.send(());
			for handle in poller.handles {
				let _ = handle.await;
			}
		}
	}

	/// Logs in with node-managed accounts.
	pub async fn login_injected(&self) -> Result<(), SessionError> {
		self.inner.login_injected().await
	}

	/// Logs in with the locally generated key, creating one on first use.
	pub async fn login_generated(&self) -> Result<(), SessionError> {
		self.inner.login_generated().await
	}

	/// Retries the persisted login method, absorbing denial.
	///
	/// A wallet that stays locked is a normal outcome here; the session
	/// simply remains logged out.
	pub async fn unlock(&self) {
		match self.inner.persisted_kind().await {
			Some(WalletKind::Injected) => {
				if let Err(e) = self.inner.login_injected().await {
					debug!("Unlock attempt did not complete: {}", e);
				}
			},
			Some(WalletKind::GeneratedKey) => {
				if let Err(e) = self.inner.login_generated().await {
					debug!("Unlock attempt did not complete: {}", e);
				}
			},
			_ => debug!("No persisted login method to unlock"),
		}
	}

	/// Logs out and forgets the persisted login method.
	///
	/// The recovery phrase is kept so a later generated-key login restores
	/// the same account.
	pub async fn logout(&self) {
		if let Err(e) = self.inner.store.delete(StoreKey::LoginMethod.as_str()).await {
			warn!("Failed to clear persisted login method: {}", e);
		}
		self.inner.clear_login("Logged out").await;
	}
}

impl SessionInner {
	/// Applies a mutation to a copy of the current snapshot and publishes
	/// it if anything changed.
	fn publish<F>(&self, mutate: F)
	where
		F: FnOnce(&mut Session),
	{
		let mut next = { self.session_tx.borrow().clone() };
		mutate(&mut next);

		self.session_tx.send_if_modified(|current| {
			if *current == next {
				false
			} else {
				*current = next;
				true
			}
		});
	}

	/// Reads the persisted login method, if any.
	async fn persisted_kind(&self) -> Option<WalletKind> {
		match self.store.get_string(StoreKey::LoginMethod.as_str()).await {
			Ok(value) => match value.parse::<WalletKind>() {
				Ok(kind) => Some(kind),
				Err(e) => {
					warn!("Ignoring persisted login method: {}", e);
					None
				},
			},
			Err(StoreError::NotFound(_)) => None,
			Err(e) => {
				warn!("Failed to read persisted login method: {}", e);
				None
			},
		}
	}

	async fn login_injected(&self) -> Result<(), SessionError> {
		self.publish(|session| {
			session.login_state = LoginState::LoggingIn;
			session.status_message = "Requesting wallet access".to_string();
		});

		let accounts = match self.gateway.request_accounts().await {
			Ok(accounts) => accounts,
			Err(e) => {
				self.publish(|session| {
					session.login_state = LoginState::LoggedOut;
					session.status_message = "Wallet provider unavailable".to_string();
				});
				return Err(SessionError::ProviderUnavailable(e.to_string()));
			},
		};

		match self.bind_injected(accounts).await {
			Ok(()) => {
				self.refresh_now(true).await;
				Ok(())
			},
			Err(e) => {
				let message = match &e {
					SessionError::LoginDenied(_) => "Login denied",
					_ => "Login failed",
				};
				self.publish(|session| {
					session.login_state = LoginState::LoggedOut;
					session.status_message = message.to_string();
				});
				Err(e)
			},
		}
	}

	async fn login_generated(&self) -> Result<(), SessionError> {
		self.publish(|session| {
			session.login_state = LoginState::LoggingIn;
			session.status_message = "Preparing local key".to_string();
		});

		let result = match self.generated_wallet().await {
			Ok(wallet) => self.install(WalletProvider::GeneratedKey(wallet)).await,
			Err(e) => Err(e),
		};

		match result {
			Ok(()) => {
				self.refresh_now(true).await;
				Ok(())
			},
			Err(e) => {
				self.publish(|session| {
					session.login_state = LoginState::LoggedOut;
					session.status_message = "Login failed".to_string();
				});
				Err(e)
			},
		}
	}

	/// Restores the generated-key wallet, creating and persisting a fresh
	/// recovery phrase on first use.
	///
	/// An existing phrase that fails to parse is reported, never replaced;
	/// overwriting it would silently discard the account it derives.
	async fn generated_wallet(&self) -> Result<GeneratedWallet, SessionError> {
		match self.store.get_string(StoreKey::RecoveryPhrase.as_str()).await {
			Ok(phrase) => GeneratedWallet::from_phrase(&phrase)
				.map_err(|e| SessionError::Wallet(format!("Stored recovery phrase unusable: {e}"))),
			Err(StoreError::NotFound(_)) => {
				let wallet =
					GeneratedWallet::create().map_err(|e| SessionError::Wallet(e.to_string()))?;
				self.store
					.set_string(StoreKey::RecoveryPhrase.as_str(), wallet.phrase())
					.await?;
				info!("Generated a new recovery phrase");
				Ok(wallet)
			},
			Err(e) => Err(e.into()),
		}
	}

	/// Wraps a node-granted account list into an injected wallet login.
	async fn bind_injected(&self, accounts: Vec<Address>) -> Result<(), SessionError> {
		let wallet =
			InjectedWallet::new(accounts).map_err(|e| SessionError::LoginDenied(e.to_string()))?;
		self.install(WalletProvider::Injected(wallet)).await
	}

	/// Activates the wallet's signer, persists the login method and
	/// publishes the logged-in snapshot.
	async fn install(&self, provider: WalletProvider) -> Result<(), SessionError> {
		self.gateway
			.activate_signer(&provider.signing_handle())
			.await
			.map_err(|e| SessionError::ProviderUnavailable(e.to_string()))?;

		self.store
			.set_string(StoreKey::LoginMethod.as_str(), provider.kind().as_str())
			.await?;

		let kind = provider.kind();
		let account = provider.address();
		*self.wallet.write().await = Some(provider);

		info!(%account, wallet_kind = %kind, "Logged in");
		self.publish(|session| {
			session.wallet_kind = kind;
			session.login_state = LoginState::LoggedIn;
			session.account = Some(account);
			session.status_message = "Logged in".to_string();
		});

		Ok(())
	}

	/// Drops the active wallet and publishes a logged-out snapshot.
	async fn clear_login(&self, status: &str) {
		*self.wallet.write().await = None;
		self.gateway.deactivate_signer().await;

		let message = status.to_string();
		self.publish(|session| {
			session.wallet_kind = WalletKind::None;
			session.login_state = LoginState::LoggedOut;
			session.account = None;
			session.balance = Balances::default();
			session.status_message = message;
		});
	}

	/// Runs a refresh pass once any in-flight pass has finished.
	async fn refresh_now(&self, include_network: bool) {
		if let Ok(_permit) = self.refresh_gate.acquire().await {
			self.refresh(include_network).await;
		}
	}

	async fn refresh(&self, include_network: bool) {
		if include_network {
			self.refresh_network().await;
		}
		self.refresh_account().await;
	}

	/// Re-reads the network identity and classifies it against the
	/// recognized set. Failures keep the last-known identity.
	async fn refresh_network(&self) {
		match self.gateway.chain_id().await {
			Ok(id) => {
				let status = NetworkStatus::classify(id, &self.networks);
				self.publish(|session| session.network = status);
			},
			Err(e) => {
				debug!("Network refresh failed: {}", e);
			},
		}
	}

	/// Verifies the active account is still granted and refreshes balances.
	async fn refresh_account(&self) {
		let wallet = { self.wallet.read().await.clone() };
		let Some(wallet) = wallet else {
			return;
		};

		if wallet.kind() == WalletKind::Injected {
			let available = match self.gateway.available_accounts().await {
				Ok(accounts) => accounts,
				Err(e) => {
					debug!("Account refresh failed: {}", e);
					return;
				},
			};

			if available.is_empty() {
				info!("Node no longer exposes any account, locking session");
				self.clear_login("Wallet locked").await;
				return;
			}

			if !available.contains(&wallet.address()) {
				// The node switched account sets under us; follow it by
				// rebinding to the new grant.
				info!("Active account no longer granted, rebinding");
				if let Err(e) = self.bind_injected(available).await {
					warn!("Failed to rebind switched account: {}", e);
					self.clear_login("Wallet locked").await;
				}
				return;
			}
		}

		self.refresh_balances(&wallet.address()).await;
	}

	/// Re-reads both balances for the active account. Partial failures keep
	/// the previous pair; balances are only ever replaced together.
	async fn refresh_balances(&self, account: &Address) {
		let native = match self.gateway.native_balance(account).await {
			Ok(value) => value,
			Err(e) => {
				debug!("Native balance refresh failed: {}", e);
				return;
			},
		};

		let service_token = match self.gateway.token_balance(account).await {
			Ok(value) => value,
			Err(e) => {
				debug!("Token balance refresh failed: {}", e);
				return;
			},
		};

		self.publish(|session| {
			session.balance = Balances {
				native,
				service_token,
			};
		});
	}
}

/// Account poll loop: verifies the granted account and refreshes balances
/// once per period.
async fn run_account_poller(inner: Arc<SessionInner>, mut stop_rx: broadcast::Receiver<()>) {
	let mut interval = tokio::time::interval(inner.account_poll);

	// Skip missed ticks instead of bursting after a stall
	interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
	// The caller already took initial readings during bootstrap
	interval.tick().await;

	loop {
		tokio::select! {
			_ = interval.tick() => {
				let permit = match inner.refresh_gate.try_acquire() {
					Ok(permit) => permit,
					Err(_) => {
						debug!("Previous refresh still in flight, skipping account tick");
						continue;
					},
				};

				inner.refresh_account().await;
				drop(permit);
			}
			_ = stop_rx.recv() => {
				info!("Stopping account poller");
				break;
			}
		}
	}
}

/// Network poll loop: re-reads the chain identity on its longer period.
async fn run_network_poller(inner: Arc<SessionInner>, mut stop_rx: broadcast::Receiver<()>) {
	let mut interval = tokio::time::interval(inner.network_poll);

	interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
	interval.tick().await;

	loop {
		tokio::select! {
			_ = interval.tick() => {
				let permit = match inner.refresh_gate.try_acquire() {
					Ok(permit) => permit,
					Err(_) => {
						debug!("Previous refresh still in flight, skipping network tick");
						continue;
					},
				};

				inner.refresh_network().await;
				drop(permit);
			}
			_ = stop_rx.recv() => {
				info!("Stopping network poller");
				break;
			}
		}
	}
}
