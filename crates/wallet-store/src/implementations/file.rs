//! File-based state storage.
//!
//! Stores each entry as a binary file under a base directory, writing
//! through a temporary file and rename so readers never observe partial
//! content. Entries holding secrets are created with owner-only
//! permissions.

use crate::{StateStore, StoreError};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use wallet_types::StoreKey;

/// File-based storage implementation.
///
/// This implementation stores data as binary files on the filesystem,
/// providing simple persistence without requiring external dependencies.
pub struct FileStore {
	/// Base directory path for storing files.
	base_path: PathBuf,
}

impl FileStore {
	/// Creates a new FileStore rooted at the specified base path.
	///
	/// The directory is created on first write.
	pub fn new(base_path: impl Into<PathBuf>) -> Self {
		Self {
			base_path: base_path.into(),
		}
	}

	/// Converts a storage key to a filesystem-safe file path.
	///
	/// Sanitizes the key by replacing problematic characters and
	/// appending a .bin extension.
	fn get_file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':'], "_");
		self.base_path.join(format!("{safe_key}.bin"))
	}
}

#[async_trait]
impl StateStore for FileStore {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StoreError> {
		let path = self.get_file_path(key);

		match fs::read(&path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				Err(StoreError::NotFound(key.to_string()))
			},
			Err(e) => Err(StoreError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
		let path = self.get_file_path(key);

		// Create parent directory if it doesn't exist
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StoreError::Backend(e.to_string()))?;
		}

		// Write atomically by writing to temp file then renaming
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, value)
			.await
			.map_err(|e| StoreError::Backend(e.to_string()))?;

		// Secret entries must never become visible with default permissions
		#[cfg(unix)]
		{
			let is_secret = key
				.parse::<StoreKey>()
				.map(|k| k.is_secret())
				.unwrap_or(false);
			if is_secret {
				use std::os::unix::fs::PermissionsExt;
				fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
					.await
					.map_err(|e| StoreError::Backend(e.to_string()))?;
			}
		}

		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StoreError::Backend(e.to_string()))?;

		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StoreError> {
		let path = self.get_file_path(key);

		match fs::remove_file(&path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StoreError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StoreError> {
		let path = self.get_file_path(key);
		Ok(path.exists())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn create_test_store() -> (FileStore, TempDir) {
		let temp_dir = TempDir::new().unwrap();
		let store = FileStore::new(temp_dir.path());
		(store, temp_dir)
	}

	#[tokio::test]
	async fn test_basic_operations() {
		let (store, _temp_dir) = create_test_store();

		let key = "test_key";
		let value = b"test_value".to_vec();

		store.set_bytes(key, value.clone()).await.unwrap();
		let retrieved = store.get_bytes(key).await.unwrap();
		assert_eq!(retrieved, value);

		assert!(store.exists(key).await.unwrap());

		store.delete(key).await.unwrap();
		assert!(!store.exists(key).await.unwrap());
	}

	#[tokio::test]
	async fn test_get_missing_returns_not_found() {
		let (store, _temp_dir) = create_test_store();

		let result = store.get_bytes("missing").await;
		assert!(matches!(result, Err(StoreError::NotFound(_))));
	}

	#[tokio::test]
	async fn test_delete_missing_is_ok() {
		let (store, _temp_dir) = create_test_store();

		store.delete("missing").await.unwrap();
	}

	#[tokio::test]
	async fn test_overwrite_replaces_value() {
		let (store, _temp_dir) = create_test_store();

		store.set_bytes("key", b"first".to_vec()).await.unwrap();
		store.set_bytes("key", b"second".to_vec()).await.unwrap();

		let retrieved = store.get_bytes("key").await.unwrap();
		assert_eq!(retrieved, b"second");
	}

	#[tokio::test]
	async fn test_reopen_reads_persisted_value() {
		let temp_dir = TempDir::new().unwrap();

		let store = FileStore::new(temp_dir.path());
		store
			.set_string(StoreKey::LoginMethod.as_str(), "injected")
			.await
			.unwrap();
		drop(store);

		let reopened = FileStore::new(temp_dir.path());
		let value = reopened
			.get_string(StoreKey::LoginMethod.as_str())
			.await
			.unwrap();
		assert_eq!(value, "injected");
	}

	#[tokio::test]
	async fn test_sanitizes_key_characters() {
		let (store, _temp_dir) = create_test_store();

		store
			.set_bytes("scope:entry/name", b"data".to_vec())
			.await
			.unwrap();
		let retrieved = store.get_bytes("scope:entry/name").await.unwrap();
		assert_eq!(retrieved, b"data");
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_recovery_phrase_written_owner_only() {
		use std::os::unix::fs::PermissionsExt;

		let (store, temp_dir) = create_test_store();

		store
			.set_string(StoreKey::RecoveryPhrase.as_str(), "abandon ability able")
			.await
			.unwrap();

		let path = temp_dir
			.path()
			.join(format!("{}.bin", StoreKey::RecoveryPhrase.as_str()));
		let mode = std::fs::metadata(path).unwrap().permissions().mode();
		assert_eq!(mode & 0o777, 0o600);
	}
}
