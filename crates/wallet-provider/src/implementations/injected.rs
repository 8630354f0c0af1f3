//! Injected wallet whose accounts are managed by the node.
//!
//! The service never sees key material for this provider; it only learns
//! the account list granted at login time and routes signature requests
//! back through the node.

use crate::ProviderError;
use wallet_types::Address;

/// Wallet injected by the environment.
///
/// The first granted account is the active one, matching how injected
/// wallets expose a primary account.
#[derive(Debug, Clone)]
pub struct InjectedWallet {
	/// Accounts granted by the node, never empty.
	accounts: Vec<Address>,
}

impl InjectedWallet {
	/// Creates an injected wallet from the accounts granted by the node.
	///
	/// An empty grant means the user denied access.
	pub fn new(accounts: Vec<Address>) -> Result<Self, ProviderError> {
		if accounts.is_empty() {
			return Err(ProviderError::NoAccounts);
		}
		Ok(Self { accounts })
	}

	/// Returns the active account.
	pub fn selected(&self) -> &Address {
		&self.accounts[0]
	}

	/// Returns all granted accounts.
	pub fn accounts(&self) -> &[Address] {
		&self.accounts
	}
}
