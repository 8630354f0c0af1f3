//! Storage-related types for the data-wallet system.

use std::str::FromStr;

/// Keys for values the wallet persists across restarts.
///
/// This enum provides type safety for store operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
	/// The last login method the user chose.
	LoginMethod,
	/// Secret recovery phrase for the generated-key wallet.
	RecoveryPhrase,
}

impl StoreKey {
	/// Returns the string representation of the store key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StoreKey::LoginMethod => "login_method",
			StoreKey::RecoveryPhrase => "recovery_phrase",
		}
	}

	/// Returns an iterator over all StoreKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::LoginMethod, Self::RecoveryPhrase].into_iter()
	}

	/// Whether the value behind this key is a secret.
	///
	/// Secrets get owner-only file permissions and are never logged.
	pub fn is_secret(&self) -> bool {
		matches!(self, StoreKey::RecoveryPhrase)
	}
}

impl FromStr for StoreKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"login_method" => Ok(Self::LoginMethod),
			"recovery_phrase" => Ok(Self::RecoveryPhrase),
			_ => Err(()),
		}
	}
}

impl From<StoreKey> for &'static str {
	fn from(key: StoreKey) -> Self {
		key.as_str()
	}
}
