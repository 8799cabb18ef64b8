//! In-memory storage backend.
//!
//! Entries live in a map behind a read-write lock and carry an optional
//! deadline. Expired entries read as missing and are dropped on cleanup.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use claimer_types::ImplementationRegistry;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl Entry {
	fn is_expired(&self, now: Instant) -> bool {
		self.expires_at.is_some_and(|deadline| now >= deadline)
	}
}

/// In-memory storage implementation.
///
/// Nothing survives a restart.
pub struct MemoryStorage {
	store: RwLock<HashMap<String, Entry>>,
	/// Applied when a write carries no explicit TTL.
	default_ttl: Option<Duration>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::with_default_ttl(None)
	}

	pub fn with_default_ttl(default_ttl: Option<Duration>) -> Self {
		Self {
			store: RwLock::new(HashMap::new()),
			default_ttl,
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		match store.get(key) {
			Some(entry) if !entry.is_expired(Instant::now()) => Ok(entry.value.clone()),
			_ => Err(StorageError::NotFound),
		}
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let expires_at = ttl
			.or(self.default_ttl)
			.filter(|ttl| !ttl.is_zero())
			.map(|ttl| Instant::now() + ttl);
		let mut store = self.store.write().await;
		store.insert(key.to_string(), Entry { value, expires_at });
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store
			.get(key)
			.is_some_and(|entry| !entry.is_expired(Instant::now())))
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let now = Instant::now();
		let mut store = self.store.write().await;
		let before = store.len();
		store.retain(|_, entry| !entry.is_expired(now));
		Ok(before - store.len())
	}
}

/// Factory function to create a memory storage backend from configuration.
///
/// Configuration parameters:
/// - `default_ttl_seconds`: TTL applied to writes without one (default: none)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	let default_ttl = match config.get("default_ttl_seconds") {
		None => None,
		Some(value) => {
			let seconds = value.as_integer().filter(|s| *s >= 0).ok_or_else(|| {
				StorageError::Configuration(
					"default_ttl_seconds must be a non-negative integer".into(),
				)
			})?;
			Some(Duration::from_secs(seconds as u64))
		},
	};
	Ok(Box::new(MemoryStorage::with_default_ttl(default_ttl)))
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();

		let key = "executions:abc";
		let value = b"record".to_vec();
		storage.set_bytes(key, value.clone(), None).await.unwrap();
		assert_eq!(storage.get_bytes(key).await.unwrap(), value);
		assert!(storage.exists(key).await.unwrap());

		storage.delete(key).await.unwrap();
		assert!(!storage.exists(key).await.unwrap());
		assert!(matches!(
			storage.get_bytes(key).await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_entries_expire_after_ttl() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("bundles:short", b"x".to_vec(), Some(Duration::from_secs(10)))
			.await
			.unwrap();
		storage
			.set_bytes("bundles:forever", b"y".to_vec(), None)
			.await
			.unwrap();

		tokio::time::advance(Duration::from_secs(9)).await;
		assert!(storage.exists("bundles:short").await.unwrap());

		tokio::time::advance(Duration::from_secs(1)).await;
		assert!(!storage.exists("bundles:short").await.unwrap());
		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
		assert!(storage.exists("bundles:forever").await.unwrap());
	}

	#[test]
	fn test_factory_rejects_negative_ttl() {
		let mut table = toml::map::Map::new();
		table.insert("default_ttl_seconds".into(), toml::Value::Integer(-1));
		assert!(create_storage(&toml::Value::Table(table)).is_err());
	}
}
