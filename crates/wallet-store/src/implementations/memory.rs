//! In-memory state storage.
//!
//! Memory-based implementation of the StateStore trait, useful for tests
//! and development scenarios where persistence is not required. Data is
//! lost on restart.

use crate::{StateStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory storage implementation.
pub struct MemoryStore {
	/// The in-memory store protected by a read-write lock.
	store: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
	/// Creates a new MemoryStore instance.
	pub fn new() -> Self {
		Self {
			store: Arc::new(RwLock::new(HashMap::new())),
		}
	}
}

impl Default for MemoryStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StateStore for MemoryStore {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StoreError> {
		let store = self.store.read().await;
		store
			.get(key)
			.cloned()
			.ok_or_else(|| StoreError::NotFound(key.to_string()))
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
		let mut store = self.store.write().await;
		store.insert(key.to_string(), value);
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StoreError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StoreError> {
		let store = self.store.read().await;
		Ok(store.contains_key(key))
	}
}
