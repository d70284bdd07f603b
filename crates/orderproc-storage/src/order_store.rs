//! Order Record Store (spec.md §4.B): per-node active/completed indexes
//! built on top of the KV Store Client.

use crate::{KvError, KvStore};
use orderproc_types::{is_valid_uuid, OrderRecord, OrderStateInService};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the Order Record Store.
#[derive(Debug, Error)]
pub enum OrderStoreError {
	/// `order_id` did not pass UUID validation.
	#[error("invalid record: order_id is not a UUID")]
	InvalidRecord,
	/// Underlying KV store failure.
	#[error(transparent)]
	Kv(#[from] KvError),
	/// Stored payload could not be deserialized into an `OrderRecord`.
	#[error("corrupt record: {0}")]
	Corrupt(String),
}

fn bucket_name(service_id: &str, state: OrderStateInService) -> String {
	format!("orders:{}:{}", service_id, state)
}

/// Wraps a `KvStore` with typed, JSON-serialized order record operations
/// and the two per-service active/completed indexes (spec.md §4.B).
pub struct OrderRecordStore {
	backend: Arc<dyn KvStore>,
}

impl OrderRecordStore {
	/// Creates a new `OrderRecordStore` over the given KV backend.
	pub fn new(backend: Arc<dyn KvStore>) -> Self {
		Self { backend }
	}

	/// Writes `record` into the bucket matching `state_in_service`. If the
	/// record previously lived in the other bucket for the same service,
	/// removes the stale entry first (logical move, spec.md §4.B).
	pub async fn save(
		&self,
		record: &OrderRecord,
		state_in_service: OrderStateInService,
	) -> Result<(), OrderStoreError> {
		if !is_valid_uuid(&record.order_id) {
			return Err(OrderStoreError::InvalidRecord);
		}

		let other_state = match state_in_service {
			OrderStateInService::Active => OrderStateInService::Completed,
			OrderStateInService::Completed => OrderStateInService::Active,
		};
		let other_bucket = bucket_name(&record.service_id, other_state);
		// Best-effort: removing an absent field is not an error, so a
		// record that never lived in the other bucket is unaffected.
		self.backend.delete(&other_bucket, &record.order_id).await?;

		let bucket = bucket_name(&record.service_id, state_in_service);
		let payload = serde_json::to_vec(record).map_err(|e| OrderStoreError::Corrupt(e.to_string()))?;
		self.backend.write(&bucket, &record.order_id, payload).await?;
		Ok(())
	}

	/// Returns every record currently in `orders:{service_id}:{state}`.
	pub async fn reload(
		&self,
		service_id: &str,
		state: OrderStateInService,
	) -> Result<Vec<OrderRecord>, OrderStoreError> {
		let bucket = bucket_name(service_id, state);
		let pairs = self.backend.scan_bucket(&bucket).await?;

		let mut records = Vec::with_capacity(pairs.len());
		for (field, payload) in pairs {
			match serde_json::from_slice::<OrderRecord>(&payload) {
				Ok(record) => records.push(record),
				Err(e) => {
					tracing::warn!(order_id = %field, error = %e, "skipping corrupt order record");
				},
			}
		}
		Ok(records)
	}

	/// Returns which bucket (if any) currently holds `order_id` for
	/// `service_id`.
	pub async fn get_state_in_service(
		&self,
		order_id: &str,
		service_id: &str,
	) -> Result<Option<OrderStateInService>, OrderStoreError> {
		let active_bucket = bucket_name(service_id, OrderStateInService::Active);
		if self.backend.read(&active_bucket, order_id).await.is_ok() {
			return Ok(Some(OrderStateInService::Active));
		}

		let completed_bucket = bucket_name(service_id, OrderStateInService::Completed);
		match self.backend.read(&completed_bucket, order_id).await {
			Ok(_) => Ok(Some(OrderStateInService::Completed)),
			Err(KvError::NotFound) => Ok(None),
			Err(e) => Err(e.into()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryStore;

	fn sample_record(order_id: &str, service_id: &str) -> OrderRecord {
		OrderRecord::new(
			order_id.to_string(),
			service_id.to_string(),
			"Validate",
			"2026-08-01T00:00:00Z".to_string(),
		)
	}

	#[tokio::test]
	async fn save_and_reload_round_trips() {
		let store = OrderRecordStore::new(Arc::new(MemoryStore::new()));
		let record = sample_record("11111111-1111-1111-1111-111111111111", "node-a");

		store.save(&record, OrderStateInService::Active).await.unwrap();

		let active = store.reload("node-a", OrderStateInService::Active).await.unwrap();
		assert_eq!(active.len(), 1);
		assert_eq!(active[0].order_id, record.order_id);
	}

	#[tokio::test]
	async fn save_rejects_non_uuid_order_id() {
		let store = OrderRecordStore::new(Arc::new(MemoryStore::new()));
		let record = sample_record("not-a-uuid", "node-a");

		let err = store.save(&record, OrderStateInService::Active).await.unwrap_err();
		assert!(matches!(err, OrderStoreError::InvalidRecord));
	}

	#[tokio::test]
	async fn save_moves_record_between_buckets() {
		let store = OrderRecordStore::new(Arc::new(MemoryStore::new()));
		let mut record = sample_record("11111111-1111-1111-1111-111111111111", "node-a");

		store.save(&record, OrderStateInService::Active).await.unwrap();
		record.finished = true;
		store.save(&record, OrderStateInService::Completed).await.unwrap();

		let active = store.reload("node-a", OrderStateInService::Active).await.unwrap();
		assert!(active.is_empty());

		let completed = store.reload("node-a", OrderStateInService::Completed).await.unwrap();
		assert_eq!(completed.len(), 1);
	}

	#[tokio::test]
	async fn get_state_in_service_reports_absent() {
		let store = OrderRecordStore::new(Arc::new(MemoryStore::new()));
		let state = store
			.get_state_in_service("11111111-1111-1111-1111-111111111111", "node-a")
			.await
			.unwrap();
		assert_eq!(state, None);
	}
}
