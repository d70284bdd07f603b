//! Redis-backed KV store, matching the original order-processing service's
//! choice of a Redis hash store: each bucket is a Redis hash, each field
//! within it one order record (`HSET`/`HGET`/`HGETALL`/`HDEL`).

use crate::KvError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Deserialize;

/// Redis hash-field store.
///
/// Holds a `ConnectionManager`, which multiplexes and automatically
/// reconnects a single underlying connection, so `RedisStore` is cheaply
/// cloneable and safe to share across pipeline workers.
#[derive(Clone)]
pub struct RedisStore {
	manager: ConnectionManager,
}

impl RedisStore {
	/// Connects to `redis://host:port` and returns a ready-to-use store.
	pub async fn connect(host: &str, port: u16) -> Result<Self, KvError> {
		let url = format!("redis://{}:{}", host, port);
		let client = redis::Client::open(url).map_err(|e| KvError::Configuration(e.to_string()))?;
		let manager = client
			.get_connection_manager()
			.await
			.map_err(|e| KvError::Unavailable(e.to_string()))?;
		Ok(Self { manager })
	}
}

#[async_trait]
impl crate::KvStore for RedisStore {
	async fn write(&self, bucket: &str, field: &str, payload: Vec<u8>) -> Result<(), KvError> {
		let mut conn = self.manager.clone();
		conn.hset::<_, _, _, ()>(bucket, field, payload)
			.await
			.map_err(|e| KvError::Unavailable(e.to_string()))
	}

	async fn read(&self, bucket: &str, field: &str) -> Result<Vec<u8>, KvError> {
		let mut conn = self.manager.clone();
		let value: Option<Vec<u8>> = conn
			.hget(bucket, field)
			.await
			.map_err(|e| KvError::Unavailable(e.to_string()))?;
		value.ok_or(KvError::NotFound)
	}

	async fn delete(&self, bucket: &str, field: &str) -> Result<(), KvError> {
		let mut conn = self.manager.clone();
		conn.hdel::<_, _, ()>(bucket, field)
			.await
			.map_err(|e| KvError::Unavailable(e.to_string()))
	}

	async fn scan_bucket(&self, bucket: &str) -> Result<Vec<(String, Vec<u8>)>, KvError> {
		let mut conn = self.manager.clone();
		let pairs: Vec<(String, Vec<u8>)> = conn
			.hgetall(bucket)
			.await
			.map_err(|e| KvError::Unavailable(e.to_string()))?;
		Ok(pairs)
	}
}

/// Configuration accepted by the `redis` KV store implementation.
#[derive(Debug, Deserialize)]
struct RedisConfig {
	host: String,
	#[serde(default = "default_port")]
	port: u16,
}

fn default_port() -> u16 {
	6379
}

/// Factory function to create a Redis KV store from configuration.
///
/// Configuration parameters:
/// - `host` (required): Redis server hostname.
/// - `port` (optional, default 6379): Redis server port.
///
/// Connection happens eagerly so a misconfigured backend fails at startup
/// rather than on the first order write.
pub fn create_store(config: &toml::Value) -> Result<Box<dyn crate::KvStore>, KvError> {
	let parsed: RedisConfig = config
		.clone()
		.try_into()
		.map_err(|e: toml::de::Error| KvError::Configuration(e.to_string()))?;

	let store = tokio::task::block_in_place(|| {
		tokio::runtime::Handle::current().block_on(RedisStore::connect(&parsed.host, parsed.port))
	})?;

	Ok(Box::new(store))
}

/// Registry for the Redis KV store implementation.
pub struct Registry;

impl orderproc_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "redis";
	type Factory = crate::KvStoreFactory;

	fn factory() -> Self::Factory {
		create_store
	}
}

impl crate::KvStoreRegistry for Registry {}
