//! In-memory KV store backend.
//!
//! Useful for testing and single-process development scenarios where
//! persistence across restarts is not required.

use crate::KvError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory hash-field store, keyed by `(bucket, field)`.
pub struct MemoryStore {
	store: Arc<RwLock<HashMap<(String, String), Vec<u8>>>>,
}

impl MemoryStore {
	/// Creates a new, empty `MemoryStore`.
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
impl crate::KvStore for MemoryStore {
	async fn write(&self, bucket: &str, field: &str, payload: Vec<u8>) -> Result<(), KvError> {
		let mut store = self.store.write().await;
		store.insert((bucket.to_string(), field.to_string()), payload);
		Ok(())
	}

	async fn read(&self, bucket: &str, field: &str) -> Result<Vec<u8>, KvError> {
		let store = self.store.read().await;
		store
			.get(&(bucket.to_string(), field.to_string()))
			.cloned()
			.ok_or(KvError::NotFound)
	}

	async fn delete(&self, bucket: &str, field: &str) -> Result<(), KvError> {
		let mut store = self.store.write().await;
		store.remove(&(bucket.to_string(), field.to_string()));
		Ok(())
	}

	async fn scan_bucket(&self, bucket: &str) -> Result<Vec<(String, Vec<u8>)>, KvError> {
		let store = self.store.read().await;
		Ok(store
			.iter()
			.filter(|((b, _), _)| b == bucket)
			.map(|((_, field), payload)| (field.clone(), payload.clone()))
			.collect())
	}
}

/// Factory function to create a memory KV store from configuration.
///
/// Configuration parameters:
/// - None required for the memory store.
pub fn create_store(_config: &toml::Value) -> Result<Box<dyn crate::KvStore>, KvError> {
	Ok(Box::new(MemoryStore::new()))
}

/// Registry for the memory KV store implementation.
pub struct Registry;

impl orderproc_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::KvStoreFactory;

	fn factory() -> Self::Factory {
		create_store
	}
}

impl crate::KvStoreRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::KvStore;

	#[tokio::test]
	async fn write_then_read_round_trips() {
		let store = MemoryStore::new();
		store
			.write("orders:a:active", "order-1", b"payload".to_vec())
			.await
			.unwrap();

		let value = store.read("orders:a:active", "order-1").await.unwrap();
		assert_eq!(value, b"payload");
	}

	#[tokio::test]
	async fn read_missing_field_is_not_found() {
		let store = MemoryStore::new();
		let err = store.read("orders:a:active", "missing").await.unwrap_err();
		assert!(matches!(err, KvError::NotFound));
	}

	#[tokio::test]
	async fn delete_removes_field() {
		let store = MemoryStore::new();
		store
			.write("orders:a:active", "order-1", b"payload".to_vec())
			.await
			.unwrap();
		store.delete("orders:a:active", "order-1").await.unwrap();
		assert!(store.read("orders:a:active", "order-1").await.is_err());
	}

	#[tokio::test]
	async fn scan_bucket_only_returns_matching_bucket() {
		let store = MemoryStore::new();
		store
			.write("orders:a:active", "order-1", b"one".to_vec())
			.await
			.unwrap();
		store
			.write("orders:a:active", "order-2", b"two".to_vec())
			.await
			.unwrap();
		store
			.write("orders:b:active", "order-3", b"three".to_vec())
			.await
			.unwrap();

		let mut results = store.scan_bucket("orders:a:active").await.unwrap();
		results.sort();
		assert_eq!(
			results,
			vec![
				("order-1".to_string(), b"one".to_vec()),
				("order-2".to_string(), b"two".to_vec()),
			]
		);
	}
}
