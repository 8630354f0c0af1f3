//! Conversion utilities for common data transformations.
//!
//! This module provides utility functions for converting between different
//! data formats used across the wallet, most notably between DIDs and the
//! 32-byte asset identifiers contracts work with.

use crate::Address;

use super::formatting::without_0x_prefix;
use alloy_primitives::B256;

/// Scheme prefix of a decentralized identifier.
pub const DID_PREFIX: &str = "did:op:";

/// Parse a hex string address to the wallet Address type.
///
/// This function parses a hex string (with or without "0x" prefix) into
/// a 20-byte Address type used throughout the wallet.
///
/// # Arguments
/// * `hex_str` - A hex string representing an Ethereum address
///
/// # Returns
/// * `Ok(Address)` if the string is a valid 20-byte address
/// * `Err(String)` with error description if parsing fails
pub fn parse_address(hex_str: &str) -> Result<Address, String> {
	let hex = without_0x_prefix(hex_str);
	hex::decode(hex)
		.map_err(|e| format!("Invalid hex: {}", e))
		.and_then(|bytes| {
			if bytes.len() != 20 {
				Err(format!(
					"Invalid address length: expected 20 bytes, got {}",
					bytes.len()
				))
			} else {
				Ok(Address(bytes))
			}
		})
}

/// Derives the 32-byte on-chain asset identifier from a DID.
///
/// Accepts both the full `did:op:<hex>` form and a bare hex identifier,
/// with or without a "0x" prefix.
///
/// # Arguments
/// * `did` - The decentralized identifier of the asset
///
/// # Returns
/// * `Ok(B256)` with the asset identifier
/// * `Err(String)` if the identifier part is not 32 bytes of hex
pub fn did_to_asset_id(did: &str) -> Result<B256, String> {
	let id_part = did.strip_prefix(DID_PREFIX).unwrap_or(did);
	let hex = without_0x_prefix(id_part);

	let bytes = hex::decode(hex).map_err(|e| format!("Invalid DID hex: {}", e))?;
	if bytes.len() != 32 {
		return Err(format!(
			"Invalid asset id length: expected 32 bytes, got {}",
			bytes.len()
		));
	}

	Ok(B256::from_slice(&bytes))
}

/// Formats a 32-byte asset identifier back into DID form.
pub fn asset_id_to_did(asset_id: B256) -> String {
	format!("{}{}", DID_PREFIX, hex::encode(asset_id.0))
}

#[cfg(test)]
mod tests {
	use super::*;

	const TEST_ID: &str = "aabbccddeeff00112233445566778899aabbccddeeff00112233445566778899";

	#[test]
	fn test_parse_address_valid() {
		let address = parse_address("0xa0b86a33e6776fb78b3e1e6b2d0d2e8f0c1d2a3b").unwrap();
		assert_eq!(address.0.len(), 20);

		// Without prefix
		let address = parse_address("a0b86a33e6776fb78b3e1e6b2d0d2e8f0c1d2a3b").unwrap();
		assert_eq!(address.0.len(), 20);
	}

	#[test]
	fn test_parse_address_invalid() {
		assert!(parse_address("0x1234").is_err());
		assert!(parse_address("not hex").is_err());
	}

	#[test]
	fn test_did_to_asset_id_accepts_all_forms() {
		let expected = B256::from_slice(&hex::decode(TEST_ID).unwrap());

		assert_eq!(
			did_to_asset_id(&format!("did:op:{}", TEST_ID)).unwrap(),
			expected
		);
		assert_eq!(did_to_asset_id(TEST_ID).unwrap(), expected);
		assert_eq!(
			did_to_asset_id(&format!("0x{}", TEST_ID)).unwrap(),
			expected
		);
	}

	#[test]
	fn test_did_to_asset_id_rejects_bad_input() {
		assert!(did_to_asset_id("did:op:1234").is_err());
		assert!(did_to_asset_id("did:op:zz").is_err());
	}

	#[test]
	fn test_did_round_trip() {
		let did = format!("did:op:{}", TEST_ID);
		let asset_id = did_to_asset_id(&did).unwrap();
		assert_eq!(asset_id_to_did(asset_id), did);
	}
}
