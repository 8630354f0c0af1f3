//! Session state types published by the session manager.
//!
//! A [`Session`] is the single authoritative view of wallet state. The
//! session manager owns it exclusively and publishes read-only snapshots;
//! every update replaces the whole value, so consumers never observe a
//! half-updated session.

use crate::{Address, NetworkStatus};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which credential source the session is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletKind {
	/// No wallet selected.
	None,
	/// Node-managed accounts exposed by an injected wallet provider.
	Injected,
	/// Locally generated mnemonic-derived key.
	GeneratedKey,
}

impl WalletKind {
	/// Stable marker string used for persistence.
	pub fn as_str(&self) -> &'static str {
		match self {
			WalletKind::None => "none",
			WalletKind::Injected => "injected",
			WalletKind::GeneratedKey => "generated_key",
		}
	}
}

impl std::str::FromStr for WalletKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"none" => Ok(WalletKind::None),
			"injected" => Ok(WalletKind::Injected),
			"generated_key" => Ok(WalletKind::GeneratedKey),
			_ => Err(format!("Unknown wallet kind: {}", s)),
		}
	}
}

impl fmt::Display for WalletKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Login progression of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginState {
	LoggedOut,
	LoggingIn,
	LoggedIn,
}

/// Whether the session manager has finished its bootstrap sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadState {
	Bootstrapping,
	Ready,
}

/// Last-known balances for the active account, in 18-decimal base units.
///
/// Values may be stale between polls; they are only ever replaced wholesale
/// by a balance refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
	/// Native currency balance.
	pub native: U256,
	/// Service-token balance assets are priced in.
	pub service_token: U256,
}

/// Authoritative wallet session snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
	/// Credential source the session is bound to.
	pub wallet_kind: WalletKind,
	/// Login progression.
	pub login_state: LoginState,
	/// Active account, present exactly when logged in.
	pub account: Option<Address>,
	/// Network identity last observed on the wire.
	pub network: NetworkStatus,
	/// Last-known balances for the active account.
	pub balance: Balances,
	/// Bootstrap progression.
	pub load_state: LoadState,
	/// Human-readable progress message for the caller to display.
	pub status_message: String,
}

impl Session {
	/// The initial logged-out session, before bootstrap has run.
	pub fn bootstrapping() -> Self {
		Self {
			wallet_kind: WalletKind::None,
			login_state: LoginState::LoggedOut,
			account: None,
			network: NetworkStatus::unknown(),
			balance: Balances::default(),
			load_state: LoadState::Bootstrapping,
			status_message: "Starting up".to_string(),
		}
	}

	/// True when a login has completed and an account is bound.
	pub fn is_logged_in(&self) -> bool {
		self.login_state == LoginState::LoggedIn && self.account.is_some()
	}

	/// True when the session may attempt on-chain operations.
	pub fn is_eligible(&self) -> bool {
		self.is_logged_in() && self.network.recognized
	}
}

impl Default for Session {
	fn default() -> Self {
		Self::bootstrapping()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parse_address;
	use std::str::FromStr;

	#[test]
	fn test_wallet_kind_round_trip() {
		for kind in [WalletKind::None, WalletKind::Injected, WalletKind::GeneratedKey] {
			assert_eq!(WalletKind::from_str(kind.as_str()).unwrap(), kind);
		}
		assert!(WalletKind::from_str("metamask").is_err());
	}

	#[test]
	fn test_bootstrapping_session_is_logged_out() {
		let session = Session::bootstrapping();
		assert_eq!(session.wallet_kind, WalletKind::None);
		assert_eq!(session.login_state, LoginState::LoggedOut);
		assert!(session.account.is_none());
		assert!(!session.is_logged_in());
		assert!(!session.is_eligible());
	}

	#[test]
	fn test_logged_in_requires_account() {
		let mut session = Session::bootstrapping();
		session.login_state = LoginState::LoggedIn;
		// State claims logged in but no account is bound
		assert!(!session.is_logged_in());

		session.account =
			Some(parse_address("0xa0b86a33e6776fb78b3e1e6b2d0d2e8f0c1d2a3b").unwrap());
		assert!(session.is_logged_in());
	}

	#[test]
	fn test_eligibility_requires_recognized_network() {
		let mut session = Session::bootstrapping();
		session.login_state = LoginState::LoggedIn;
		session.account =
			Some(parse_address("0xa0b86a33e6776fb78b3e1e6b2d0d2e8f0c1d2a3b").unwrap());
		assert!(!session.is_eligible());

		session.network = NetworkStatus {
			id: 8996,
			name: "Spree".to_string(),
			recognized: true,
		};
		assert!(session.is_eligible());
	}

	#[test]
	fn test_session_equality_detects_balance_change() {
		let a = Session::bootstrapping();
		let mut b = a.clone();
		assert_eq!(a, b);

		b.balance.service_token = U256::from(1);
		assert_ne!(a, b);
	}
}
