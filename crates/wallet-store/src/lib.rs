//! Persistence module for the wallet session service.
//!
//! This module provides the key-value abstraction the session manager and
//! consumption workflow use to remember state across restarts, most notably
//! the preferred login method and the recovery phrase of a generated key.
//! Backends include file-based storage for deployments and an in-memory
//! store for tests.

use async_trait::async_trait;
use thiserror::Error;

/// Storage backend implementations.
pub mod implementations {
	pub mod file;
	pub mod memory;
}

pub use implementations::{file::FileStore, memory::MemoryStore};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
	/// Error that occurs when a requested entry is not found.
	#[error("Not found: {0}")]
	NotFound(String),
	/// Error that occurs when stored bytes cannot be decoded.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
}

/// Trait defining the low-level interface for state storage backends.
///
/// Values are raw bytes; typed accessors are provided on top for the
/// string-valued entries the service keeps. Deleting a missing key is not
/// an error so logout paths stay idempotent.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StoreError>;

	/// Stores raw bytes under the given key, replacing any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

	/// Deletes the value associated with the given key, if present.
	async fn delete(&self, key: &str) -> Result<(), StoreError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StoreError>;

	/// Retrieves a UTF-8 string value for the given key.
	async fn get_string(&self, key: &str) -> Result<String, StoreError> {
		let bytes = self.get_bytes(key).await?;
		String::from_utf8(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
	}

	/// Stores a UTF-8 string value under the given key.
	async fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
		self.set_bytes(key, value.as_bytes().to_vec()).await
	}
}
