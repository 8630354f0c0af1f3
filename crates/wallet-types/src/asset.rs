//! Asset descriptor (DDO) types.
//!
//! A resolved descriptor carries an ordered list of typed service records.
//! The workflow only ever consults two of them: the Metadata service for
//! pricing and the Access service for the agreement template and content
//! endpoint. Descriptors are immutable once resolved; re-resolving replaces
//! the whole value.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Service type carrying the asset's metadata and base price.
pub const SERVICE_METADATA: &str = "Metadata";
/// Service type carrying the agreement template and content endpoint.
pub const SERVICE_ACCESS: &str = "Access";

/// One typed service entry of a resolved descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
	/// Service type tag, e.g. "Metadata" or "Access".
	pub service_type: String,
	/// Identifier of this service within the descriptor.
	pub service_definition_id: String,
	/// Endpoint serving this service's content, when any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub service_endpoint: Option<String>,
	/// Agreement template contract name; Access services only.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub agreement_template: Option<String>,
	/// Base price in 18-decimal base units; Metadata services only.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub base_price: Option<U256>,
}

/// Resolved asset descriptor ("DDO").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
	/// Decentralized identifier of the asset.
	pub id: String,
	/// Ordered service records, looked up by type.
	pub services: Vec<ServiceRecord>,
}

impl AssetDescriptor {
	/// An empty descriptor for an asset that failed to resolve.
	///
	/// Unresolved assets are a displayable state, not an error; the workflow
	/// keeps the DID so the caller can still show what was asked for.
	pub fn empty(did: impl Into<String>) -> Self {
		Self {
			id: did.into(),
			services: Vec::new(),
		}
	}

	/// True when resolution failed and no services are known.
	pub fn is_empty(&self) -> bool {
		self.services.is_empty()
	}

	/// Finds the first service record of the given type.
	pub fn service_of_type(&self, service_type: &str) -> Option<&ServiceRecord> {
		self.services
			.iter()
			.find(|s| s.service_type == service_type)
	}

	/// The Metadata service record, when present.
	pub fn metadata_service(&self) -> Option<&ServiceRecord> {
		self.service_of_type(SERVICE_METADATA)
	}

	/// The Access service record, when present.
	pub fn access_service(&self) -> Option<&ServiceRecord> {
		self.service_of_type(SERVICE_ACCESS)
	}

	/// Base price in 18-decimal base units, from the Metadata service.
	pub fn base_price(&self) -> Option<U256> {
		self.metadata_service().and_then(|s| s.base_price)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn priced_descriptor(did: &str, price: u128) -> AssetDescriptor {
		AssetDescriptor {
			id: did.to_string(),
			services: vec![
				ServiceRecord {
					service_type: SERVICE_METADATA.to_string(),
					service_definition_id: "0".to_string(),
					service_endpoint: None,
					agreement_template: None,
					base_price: Some(U256::from(price)),
				},
				ServiceRecord {
					service_type: SERVICE_ACCESS.to_string(),
					service_definition_id: "1".to_string(),
					service_endpoint: Some("https://gateway.example/consume".to_string()),
					agreement_template: Some("EscrowAccessTemplate".to_string()),
					base_price: None,
				},
			],
		}
	}

	#[test]
	fn test_empty_descriptor() {
		let descriptor = AssetDescriptor::empty("did:op:abc");
		assert!(descriptor.is_empty());
		assert_eq!(descriptor.id, "did:op:abc");
		assert!(descriptor.base_price().is_none());
		assert!(descriptor.access_service().is_none());
	}

	#[test]
	fn test_service_lookup_by_type() {
		let descriptor = priced_descriptor("did:op:abc", 10);

		let metadata = descriptor.metadata_service().unwrap();
		assert_eq!(metadata.service_definition_id, "0");

		let access = descriptor.access_service().unwrap();
		assert_eq!(access.service_definition_id, "1");
		assert_eq!(access.agreement_template.as_deref(), Some("EscrowAccessTemplate"));
	}

	#[test]
	fn test_base_price_comes_from_metadata_service() {
		let descriptor = priced_descriptor("did:op:abc", 2_500_000_000_000_000_000);
		assert_eq!(
			descriptor.base_price(),
			Some(U256::from(2_500_000_000_000_000_000u128))
		);
	}

	#[test]
	fn test_descriptor_serde_round_trip() {
		let descriptor = priced_descriptor("did:op:abc", 42);
		let json = serde_json::to_string(&descriptor).unwrap();
		let parsed: AssetDescriptor = serde_json::from_str(&json).unwrap();
		assert_eq!(parsed, descriptor);
	}
}
