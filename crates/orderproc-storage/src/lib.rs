//! KV Store Client and Order Record Store for the order-processing system.
//!
//! This crate provides a thin hash-field key/value abstraction (Component A,
//! spec.md §4.A) plus the higher-level Order Record Store built on top of it
//! (Component B, spec.md §4.B) that serializes order records and maintains
//! the per-node active/completed indexes.

use orderproc_types::ImplementationRegistry;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
	pub mod redis;
}

pub mod order_store;

pub use order_store::{OrderRecordStore, OrderStoreError};

/// Errors that can occur during KV store operations (spec.md §7).
#[derive(Debug, Error)]
pub enum KvError {
	/// `field` failed UUID validation before reaching the backend.
	#[error("invalid key: {0}")]
	InvalidKey(String),
	/// No value stored under the given bucket/field.
	#[error("not found")]
	NotFound,
	/// Transient backend failure (connection refused, protocol error, ...).
	#[error("store unavailable: {0}")]
	Unavailable(String),
	/// Error that occurs during configuration validation.
	#[error("configuration error: {0}")]
	Configuration(String),
}

/// Low-level hash-field interface KV backends must implement.
///
/// Keys are always a `(bucket, field)` pair: `bucket` groups related
/// records (a per-service active/completed index), `field` identifies one
/// record within the bucket and is validated as a UUID by callers before
/// the write ever reaches a backend (spec.md §4.A).
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
	/// Writes `payload` under `(bucket, field)`, replacing any prior value.
	async fn write(&self, bucket: &str, field: &str, payload: Vec<u8>) -> Result<(), KvError>;

	/// Reads the payload stored under `(bucket, field)`.
	async fn read(&self, bucket: &str, field: &str) -> Result<Vec<u8>, KvError>;

	/// Removes the value stored under `(bucket, field)`, if any. Deleting
	/// an absent field is not an error.
	async fn delete(&self, bucket: &str, field: &str) -> Result<(), KvError>;

	/// Returns every `(field, payload)` pair currently stored in `bucket`.
	///
	/// This is the one operation beyond a plain read/write the Order Record
	/// Store's `Reload` needs, since it must enumerate a whole per-service
	/// index rather than look up one record by id.
	async fn scan_bucket(&self, bucket: &str) -> Result<Vec<(String, Vec<u8>)>, KvError>;
}

/// Type alias for KV store factory functions.
pub type KvStoreFactory = fn(&toml::Value) -> Result<Box<dyn KvStore>, KvError>;

/// Trait implemented by a KV store's `Registry` marker type.
pub trait KvStoreRegistry: ImplementationRegistry<Factory = KvStoreFactory> {}

/// Returns every implementation registered with this crate, keyed by the
/// name used under `kv.implementation` in configuration.
pub fn get_all_implementations() -> Vec<(&'static str, KvStoreFactory)> {
	use implementations::{memory, redis};

	vec![
		(memory::Registry::NAME, memory::Registry::factory()),
		(redis::Registry::NAME, redis::Registry::factory()),
	]
}
