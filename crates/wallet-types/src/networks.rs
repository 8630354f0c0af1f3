//! Recognized-network classification types.
//!
//! The wallet only operates against a closed set of networks named in
//! configuration. Everything observed on the wire is classified against that
//! set; an unknown chain id is still reported, just marked unrecognized.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Recognized networks mapping chain IDs to display names.
///
/// This is a type alias for a HashMap that maps chain IDs (as u64) to
/// network names. The configuration supports custom deserialization from
/// TOML where chain IDs are provided as string keys.
pub type RecognizedNetworks = HashMap<u64, String>;

/// The network identity currently observed on the wire.
///
/// `recognized` is derived exclusively from the configured
/// [`RecognizedNetworks`] table; it is never guessed from the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
	/// Numeric chain id reported by the node.
	pub id: u64,
	/// Display name, from configuration when recognized.
	pub name: String,
	/// Whether the chain id is in the configured closed set.
	pub recognized: bool,
}

impl NetworkStatus {
	/// Placeholder identity used before the first successful network query.
	pub fn unknown() -> Self {
		Self {
			id: 0,
			name: "Unknown".to_string(),
			recognized: false,
		}
	}

	/// Classifies an observed chain id against the configured closed set.
	pub fn classify(id: u64, networks: &RecognizedNetworks) -> Self {
		match networks.get(&id) {
			Some(name) => Self {
				id,
				name: name.clone(),
				recognized: true,
			},
			None => Self {
				id,
				name: format!("Chain {}", id),
				recognized: false,
			},
		}
	}
}

/// Helper function to deserialize the recognized-networks table from TOML.
///
/// Chain IDs arrive as string keys in TOML (TOML tables cannot have numeric
/// keys) and are converted to u64 keys for internal use.
pub fn deserialize_recognized<'de, D>(deserializer: D) -> Result<RecognizedNetworks, D::Error>
where
	D: Deserializer<'de>,
{
	let string_map: HashMap<String, String> = HashMap::deserialize(deserializer)?;
	let mut result = HashMap::new();

	for (key, value) in string_map {
		let chain_id = key
			.parse::<u64>()
			.map_err(|e| serde::de::Error::custom(format!("Invalid chain_id '{}': {}", key, e)))?;
		result.insert(chain_id, value);
	}

	Ok(result)
}
