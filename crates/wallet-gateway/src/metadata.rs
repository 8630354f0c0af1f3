//! HTTP client for the asset metadata store.
//!
//! Resolves asset documents (DDOs) into the flattened [`AssetDescriptor`]
//! shape the rest of the service works with, and fetches signed content from
//! provider endpoints. Documents are taken as published; unknown fields are
//! ignored and missing optional fields degrade to `None` rather than failing
//! resolution.

use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::U256;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use wallet_types::{AssetDescriptor, ServiceRecord};

use crate::GatewayError;

/// Client for the metadata store and content endpoints.
#[derive(Debug, Clone)]
pub struct MetadataClient {
	client: Client,
	base_url: String,
}

/// Asset document as published in the metadata store.
#[derive(Debug, Deserialize)]
struct RawDocument {
	id: String,
	#[serde(default, rename = "service")]
	services: Vec<RawService>,
}

#[derive(Debug, Deserialize)]
struct RawService {
	#[serde(rename = "type")]
	service_type: String,
	#[serde(default, rename = "serviceDefinitionId")]
	service_definition_id: Option<String>,
	#[serde(default, rename = "serviceEndpoint")]
	service_endpoint: Option<String>,
	#[serde(default, rename = "templateId")]
	template_id: Option<String>,
	#[serde(default)]
	metadata: Option<RawMetadata>,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
	#[serde(default)]
	base: Option<RawBase>,
}

#[derive(Debug, Deserialize)]
struct RawBase {
	#[serde(default)]
	price: Option<String>,
}

impl RawDocument {
	fn into_descriptor(self) -> AssetDescriptor {
		let services = self
			.services
			.into_iter()
			.enumerate()
			.map(|(index, raw)| {
				let base_price = raw
					.metadata
					.as_ref()
					.and_then(|metadata| metadata.base.as_ref())
					.and_then(|base| base.price.as_deref())
					.and_then(|price| U256::from_str(price).ok());
				ServiceRecord {
					service_type: raw.service_type,
					// Documents occasionally omit the definition id; fall
					// back to the service position so records stay addressable.
					service_definition_id: raw
						.service_definition_id
						.unwrap_or_else(|| index.to_string()),
					service_endpoint: raw.service_endpoint,
					agreement_template: raw.template_id,
					base_price,
				}
			})
			.collect();

		AssetDescriptor { id: self.id, services }
	}
}

impl MetadataClient {
	/// Creates a client for the metadata store at `base_url`.
	pub fn new(base_url: &str) -> Result<Self, GatewayError> {
		let mut headers = HeaderMap::new();
		headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

		let client = Client::builder()
			.default_headers(headers)
			.user_agent("wallet-session-service/0.1")
			.timeout(Duration::from_secs(30))
			.build()
			.map_err(|e| GatewayError::Metadata(format!("Failed to create HTTP client: {e}")))?;

		Ok(Self {
			client,
			base_url: base_url.trim_end_matches('/').to_string(),
		})
	}

	/// Resolves the asset document for `did` into a descriptor.
	pub async fn resolve(&self, did: &str) -> Result<AssetDescriptor, GatewayError> {
		let url = format!("{}/api/v1/metadata/assets/ddo/{}", self.base_url, did);
		debug!(%did, "Resolving asset document");

		let response = self
			.client
			.get(&url)
			.send()
			.await
			.map_err(|e| GatewayError::Metadata(format!("Metadata request failed: {e}")))?;

		if !response.status().is_success() {
			return Err(GatewayError::Metadata(format!(
				"Metadata store returned {} for {}",
				response.status(),
				did
			)));
		}

		let document = response
			.json::<RawDocument>()
			.await
			.map_err(|e| GatewayError::Metadata(format!("Failed to parse asset document: {e}")))?;

		Ok(document.into_descriptor())
	}

	/// Fetches the body of a signed content URL.
	pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, GatewayError> {
		let response = self
			.client
			.get(url)
			.send()
			.await
			.map_err(|e| GatewayError::Content(format!("Content request failed: {e}")))?;

		if !response.status().is_success() {
			return Err(GatewayError::Content(format!(
				"Content endpoint returned {}",
				response.status()
			)));
		}

		let bytes = response
			.bytes()
			.await
			.map_err(|e| GatewayError::Content(format!("Failed to read content body: {e}")))?;

		Ok(bytes.to_vec())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const FULL_DOCUMENT: &str = r#"{
		"id": "did:op:0123456789abcdef",
		"@context": "https://w3id.org/did/v1",
		"service": [
			{
				"type": "Metadata",
				"serviceEndpoint": "http://metadata.example/assets/ddo/did:op:0123456789abcdef",
				"metadata": {
					"base": {
						"name": "Weather observations",
						"price": "2500000000000000000"
					}
				}
			},
			{
				"type": "Access",
				"serviceDefinitionId": "0",
				"serviceEndpoint": "http://provider.example/api/v1/services/consume",
				"templateId": "0x208aca4b0316c9c1fd0ed0e32e11c468dd9aea56"
			}
		]
	}"#;

	#[test]
	fn test_parse_full_document() {
		let document: RawDocument = serde_json::from_str(FULL_DOCUMENT).unwrap();
		let descriptor = document.into_descriptor();

		assert_eq!(descriptor.id, "did:op:0123456789abcdef");
		assert_eq!(descriptor.services.len(), 2);
		assert!(!descriptor.is_empty());

		let access = descriptor.access_service().unwrap();
		assert_eq!(access.service_definition_id, "0");
		assert_eq!(
			access.service_endpoint.as_deref(),
			Some("http://provider.example/api/v1/services/consume")
		);
		assert_eq!(
			descriptor.base_price(),
			Some(U256::from(2_500_000_000_000_000_000u64))
		);
	}

	#[test]
	fn test_missing_definition_id_falls_back_to_position() {
		let json = r#"{
			"id": "did:op:aa",
			"service": [
				{ "type": "Metadata" },
				{ "type": "Access" }
			]
		}"#;

		let document: RawDocument = serde_json::from_str(json).unwrap();
		let descriptor = document.into_descriptor();

		assert_eq!(descriptor.services[0].service_definition_id, "0");
		assert_eq!(descriptor.services[1].service_definition_id, "1");
	}

	#[test]
	fn test_document_without_services() {
		let document: RawDocument = serde_json::from_str(r#"{ "id": "did:op:bb" }"#).unwrap();
		let descriptor = document.into_descriptor();

		assert_eq!(descriptor.id, "did:op:bb");
		assert!(descriptor.services.is_empty());
	}

	#[test]
	fn test_unparseable_price_becomes_none() {
		let json = r#"{
			"id": "did:op:cc",
			"service": [
				{
					"type": "Metadata",
					"metadata": { "base": { "price": "not-a-number" } }
				}
			]
		}"#;

		let document: RawDocument = serde_json::from_str(json).unwrap();
		let descriptor = document.into_descriptor();

		assert_eq!(descriptor.base_price(), None);
	}

	#[test]
	fn test_client_trims_trailing_slash() {
		let client = MetadataClient::new("http://metadata.example/").unwrap();
		assert_eq!(client.base_url, "http://metadata.example");
	}
}
