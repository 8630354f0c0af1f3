//! Generated-key wallet backed by a BIP-39 recovery phrase.
//!
//! Supports creating a wallet from a fresh random twelve-word phrase and
//! restoring one from a previously persisted phrase. Both paths derive the
//! first account of the standard derivation path, so a persisted phrase
//! always restores the same address.

use crate::ProviderError;
use alloy_signer::Signer;
use alloy_signer_local::{
	coins_bip39::{English, Mnemonic},
	MnemonicBuilder, PrivateKeySigner,
};
use wallet_types::Address;

/// Number of words in generated recovery phrases.
const PHRASE_WORDS: usize = 12;

/// Wallet backed by a locally held key derived from a recovery phrase.
#[derive(Clone)]
pub struct GeneratedWallet {
	/// The derived signer for account index zero.
	signer: PrivateKeySigner,
	/// The recovery phrase the signer was derived from.
	phrase: String,
}

impl GeneratedWallet {
	/// Creates a wallet from a fresh random recovery phrase.
	pub fn create() -> Result<Self, ProviderError> {
		let mnemonic = Mnemonic::<English>::new_with_count(&mut rand::thread_rng(), PHRASE_WORDS)
			.map_err(|e| ProviderError::InvalidPhrase(e.to_string()))?;
		Self::from_phrase(&mnemonic.to_phrase())
	}

	/// Restores a wallet from a previously persisted recovery phrase.
	pub fn from_phrase(phrase: &str) -> Result<Self, ProviderError> {
		let signer = MnemonicBuilder::<English>::default()
			.phrase(phrase)
			.index(0)
			.map_err(|e| ProviderError::InvalidPhrase(e.to_string()))?
			.build()
			.map_err(|e| ProviderError::InvalidPhrase(e.to_string()))?;

		Ok(Self {
			signer,
			phrase: phrase.to_string(),
		})
	}

	/// Returns the recovery phrase for persistence.
	pub fn phrase(&self) -> &str {
		&self.phrase
	}

	/// Returns the wallet's account address.
	pub fn address(&self) -> Address {
		Signer::address(&self.signer).into()
	}

	/// Returns the underlying signer.
	pub fn signer(&self) -> &PrivateKeySigner {
		&self.signer
	}
}
