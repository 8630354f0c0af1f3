//! Account-related types for the data-wallet system.
//!
//! This module defines types for blockchain addresses and signatures that are
//! used throughout the wallet for session tracking and agreement signing.

use crate::with_0x_prefix;
use alloy_primitives::PrimitiveSignature;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Blockchain address representation.
///
/// Stores addresses as raw bytes to keep the session types independent of
/// any particular chain SDK type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(pub Vec<u8>);

/// Custom serialization for Address - serializes as hex string
impl Serialize for Address {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		// Serialize as hex string with 0x prefix
		serializer.serialize_str(&with_0x_prefix(&hex::encode(&self.0)))
	}
}

/// Custom deserialization for Address - accepts hex strings
impl<'de> Deserialize<'de> for Address {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		let hex_str = s.trim_start_matches("0x");
		let bytes = hex::decode(hex_str)
			.map_err(|e| serde::de::Error::custom(format!("Invalid hex address: {}", e)))?;

		// Validate address length (should be 20 bytes for Ethereum addresses)
		if bytes.len() != 20 {
			return Err(serde::de::Error::custom(format!(
				"Invalid address length: expected 20 bytes, got {}",
				bytes.len()
			)));
		}

		Ok(Address(bytes))
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		// Format as hex string with 0x prefix
		write!(f, "0x{}", hex::encode(&self.0))
	}
}

impl From<alloy_primitives::Address> for Address {
	fn from(address: alloy_primitives::Address) -> Self {
		Address(address.as_slice().to_vec())
	}
}

impl TryFrom<&Address> for alloy_primitives::Address {
	type Error = String;

	fn try_from(address: &Address) -> Result<Self, Self::Error> {
		if address.0.len() != 20 {
			return Err(format!(
				"Invalid address length: expected 20 bytes, got {}",
				address.0.len()
			));
		}
		Ok(alloy_primitives::Address::from_slice(&address.0))
	}
}

/// Cryptographic signature representation.
///
/// Stores signatures as raw bytes in the standard Ethereum format (r, s, v).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(pub Vec<u8>);

impl From<PrimitiveSignature> for Signature {
	fn from(sig: PrimitiveSignature) -> Self {
		// Convert to standard Ethereum signature format (r, s, v)
		let mut bytes = Vec::with_capacity(65);
		bytes.extend_from_slice(&sig.r().to_be_bytes::<32>());
		bytes.extend_from_slice(&sig.s().to_be_bytes::<32>());
		// For non-EIP-155 message signatures, v = 27 + y_parity
		let v = if sig.v() { 28 } else { 27 };
		bytes.push(v);
		Signature(bytes)
	}
}

impl fmt::Display for Signature {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		// Signed-URL query parameters carry the signature as prefixed hex
		write!(f, "0x{}", hex::encode(&self.0))
	}
}
