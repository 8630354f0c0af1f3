//! Wallet provider module for the wallet session service.
//!
//! This module defines the closed set of wallet providers a session can be
//! backed by: an injected wallet whose accounts and keys live in the node,
//! and a generated key derived from a locally held recovery phrase. It also
//! provides the signing handle abstraction the gateway uses to produce
//! signatures without knowing which provider is active.

use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use thiserror::Error;
use wallet_types::{Address, WalletKind};

/// Re-export implementations
pub mod implementations {
	pub mod generated;
	pub mod injected;
}

pub use implementations::{generated::GeneratedWallet, injected::InjectedWallet};

/// Errors that can occur during wallet provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
	/// Error that occurs when a recovery phrase is invalid or key derivation fails.
	#[error("Invalid recovery phrase: {0}")]
	InvalidPhrase(String),
	/// Error that occurs when signing operations fail.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// Error that occurs when a wallet grants no accounts.
	#[error("No accounts granted")]
	NoAccounts,
}

/// Unified signing handle that wraps different signing backends.
///
/// This enum allows gateway code to request signatures for any provider
/// type without knowing the underlying implementation.
#[derive(Clone)]
pub enum SigningHandle {
	/// Account whose key is managed by the node; signatures go through RPC.
	NodeManaged(Address),
	/// Local signer derived from a recovery phrase.
	Local(PrivateKeySigner),
}

impl SigningHandle {
	/// Returns the address this handle signs for.
	pub fn address(&self) -> Address {
		match self {
			Self::NodeManaged(address) => address.clone(),
			Self::Local(signer) => Signer::address(signer).into(),
		}
	}
}

impl std::fmt::Debug for SigningHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::NodeManaged(address) => f
				.debug_tuple("SigningHandle::NodeManaged")
				.field(address)
				.finish(),
			Self::Local(_) => f
				.debug_struct("SigningHandle::Local")
				.finish_non_exhaustive(),
		}
	}
}

/// The closed set of wallet providers a session can be backed by.
#[derive(Clone)]
pub enum WalletProvider {
	/// Wallet injected by the environment; accounts are managed by the node.
	Injected(InjectedWallet),
	/// Wallet backed by a key generated from a recovery phrase.
	GeneratedKey(GeneratedWallet),
}

impl WalletProvider {
	/// Returns the kind tag for this provider.
	pub fn kind(&self) -> WalletKind {
		match self {
			Self::Injected(_) => WalletKind::Injected,
			Self::GeneratedKey(_) => WalletKind::GeneratedKey,
		}
	}

	/// Returns the active account address.
	pub fn address(&self) -> Address {
		match self {
			Self::Injected(wallet) => wallet.selected().clone(),
			Self::GeneratedKey(wallet) => wallet.address(),
		}
	}

	/// Returns a signing handle for the active account.
	pub fn signing_handle(&self) -> SigningHandle {
		match self {
			Self::Injected(wallet) => SigningHandle::NodeManaged(wallet.selected().clone()),
			Self::GeneratedKey(wallet) => SigningHandle::Local(wallet.signer().clone()),
		}
	}
}

impl std::fmt::Debug for WalletProvider {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		// Never include key material, only the kind and active address
		f.debug_struct("WalletProvider")
			.field("kind", &self.kind())
			.field("address", &self.address())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use wallet_types::parse_address;

	// Standard development phrase (FOR TESTING ONLY!)
	const TEST_PHRASE: &str =
		"test test test test test test test test test test test junk";

	#[test]
	fn test_injected_provider_kind_and_address() {
		let account = parse_address("0xa0b86a33e6776fb78b3e1e6b2d0d2e8f0c1d2a3b").unwrap();
		let wallet = InjectedWallet::new(vec![account.clone()]).unwrap();
		let provider = WalletProvider::Injected(wallet);

		assert_eq!(provider.kind(), WalletKind::Injected);
		assert_eq!(provider.address(), account);
		assert!(matches!(
			provider.signing_handle(),
			SigningHandle::NodeManaged(_)
		));
	}

	#[test]
	fn test_generated_provider_kind_and_address() {
		let wallet = GeneratedWallet::from_phrase(TEST_PHRASE).unwrap();
		let provider = WalletProvider::GeneratedKey(wallet);

		assert_eq!(provider.kind(), WalletKind::GeneratedKey);
		let handle = provider.signing_handle();
		assert!(matches!(handle, SigningHandle::Local(_)));
		assert_eq!(handle.address(), provider.address());
	}

	#[test]
	fn test_signing_handle_debug_redacts_key() {
		let wallet = GeneratedWallet::from_phrase(TEST_PHRASE).unwrap();
		let handle = SigningHandle::Local(wallet.signer().clone());
		let debug_str = format!("{:?}", handle);
		assert!(debug_str.contains("SigningHandle::Local"));
		assert!(!debug_str.contains("test"));
	}

	#[test]
	fn test_provider_debug_shows_address_only() {
		let wallet = GeneratedWallet::from_phrase(TEST_PHRASE).unwrap();
		let provider = WalletProvider::GeneratedKey(wallet);
		let debug_str = format!("{:?}", provider);
		assert!(debug_str.contains("GeneratedKey"));
		assert!(!debug_str.contains("junk"));
	}
}
