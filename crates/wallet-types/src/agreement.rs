//! Agreement types for one consumption attempt.
//!
//! An agreement exists only for the lifetime of a single attempt. Its id is
//! generated locally and never reused, so the on-chain confirmation event
//! can be filtered down to exactly the creation we submitted.

use crate::{with_0x_prefix, Address};
use alloy_primitives::B256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Locally generated 32-byte agreement identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgreementId(pub [u8; 32]);

impl AgreementId {
	/// The raw bytes signed and sent on-chain.
	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}

	/// Hex form with 0x prefix, used for signing and URL parameters.
	pub fn to_hex(&self) -> String {
		with_0x_prefix(&hex::encode(self.0))
	}
}

impl From<AgreementId> for B256 {
	fn from(id: AgreementId) -> Self {
		B256::from(id.0)
	}
}

impl fmt::Display for AgreementId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

impl Serialize for AgreementId {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> Deserialize<'de> for AgreementId {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		let hex_str = s.trim_start_matches("0x");
		let bytes = hex::decode(hex_str)
			.map_err(|e| serde::de::Error::custom(format!("Invalid hex agreement id: {}", e)))?;
		if bytes.len() != 32 {
			return Err(serde::de::Error::custom(format!(
				"Invalid agreement id length: expected 32 bytes, got {}",
				bytes.len()
			)));
		}
		let mut arr = [0u8; 32];
		arr.copy_from_slice(&bytes);
		Ok(AgreementId(arr))
	}
}

/// Where the agreement stands in its on-chain negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgreementStatus {
	Created,
	AwaitingConfirmation,
	PaymentLocked,
	Failed,
}

/// Ephemeral on-chain agreement record for one consumption attempt.
///
/// Destroyed when the attempt ends; never persisted across attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
	pub agreement_id: AgreementId,
	/// 32-byte asset identifier derived from the DID.
	pub asset_id: B256,
	pub consumer: Address,
	pub provider: Address,
	pub status: AgreementStatus,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_agreement_id_hex_round_trip() {
		let id = AgreementId([0xab; 32]);
		let json = serde_json::to_string(&id).unwrap();
		assert!(json.starts_with("\"0xabab"));

		let parsed: AgreementId = serde_json::from_str(&json).unwrap();
		assert_eq!(parsed, id);
	}

	#[test]
	fn test_agreement_id_rejects_short_hex() {
		let result: Result<AgreementId, _> = serde_json::from_str("\"0xabcd\"");
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("Invalid agreement id length"));
	}

	#[test]
	fn test_agreement_id_display_matches_to_hex() {
		let id = AgreementId([0x01; 32]);
		assert_eq!(format!("{}", id), id.to_hex());
	}

	#[test]
	fn test_agreement_id_into_b256() {
		let id = AgreementId([0x7f; 32]);
		let word: B256 = id.into();
		assert_eq!(word.0, [0x7f; 32]);
	}
}
