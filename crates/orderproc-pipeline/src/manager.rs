//! Pipeline Manager: round-robin dispatch across N pipelines, plus
//! recovery-on-start (spec.md §4.E).

use crate::{Job, Pipeline, StepHandler};
use orderproc_storage::OrderRecordStore;
use orderproc_types::OrderStateInService;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Holds `N` pipelines and dispatches jobs to them round-robin.
pub struct PipelineManager {
	service_id: String,
	pipelines: Vec<Pipeline>,
	cursor: AtomicUsize,
	store: Arc<OrderRecordStore>,
}

impl PipelineManager {
	/// Builds a manager with `pipeline_count` pipelines, each sharing the
	/// same step sequence and handler bank.
	pub fn new(
		service_id: String,
		pipeline_count: usize,
		steps: Vec<String>,
		handlers: HashMap<String, Arc<dyn StepHandler>>,
		store: Arc<OrderRecordStore>,
	) -> Self {
		let steps = Arc::new(steps);
		let handlers = Arc::new(handlers);
		let pipelines = (0..pipeline_count.max(1))
			.map(|id| Pipeline::new(id, steps.clone(), handlers.clone()))
			.collect();

		Self {
			service_id,
			pipelines,
			cursor: AtomicUsize::new(0),
			store,
		}
	}

	/// Selects the next pipeline round-robin. O(1), deterministic.
	fn select_pipeline(&self) -> &Pipeline {
		let len = self.pipelines.len();
		let idx = self.cursor.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
			Some(if current + 1 < len { current + 1 } else { 0 })
		});
		// `fetch_update` returns the pre-update value; that is the index we
		// want to dispatch to this call.
		let idx = idx.unwrap_or(0);
		&self.pipelines[idx]
	}

	/// Dispatches a job to the next pipeline in round-robin order.
	pub fn dispatch(&self, job: Job) {
		self.select_pipeline().append_job(job);
	}

	/// Starts every pipeline, then recovers in-flight work: reloads every
	/// active record for this service and dispatches it as if newly
	/// received.
	pub async fn start(&mut self) {
		for pipeline in &mut self.pipelines {
			pipeline.start();
		}

		let active = match self.store.reload(&self.service_id, OrderStateInService::Active).await {
			Ok(records) => records,
			Err(e) => {
				tracing::error!(error = %e, "failed to reload active orders during recovery");
				return;
			},
		};

		tracing::info!(count = active.len(), "recovering active orders");
		for record in active {
			let job = Job::from_record(record, self.store.clone());
			self.dispatch(job);
		}
	}

	/// Stops every pipeline, draining each one's queue first.
	pub async fn stop(&mut self) {
		for pipeline in &mut self.pipelines {
			pipeline.stop().await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::StepOutcome;
	use orderproc_storage::implementations::memory::MemoryStore;
	use std::sync::atomic::AtomicUsize as StdAtomicUsize;
	use std::time::Duration;

	struct DoneHandler;

	#[async_trait::async_trait]
	impl StepHandler for DoneHandler {
		async fn execute(&self, _job: &Job) -> StepOutcome {
			StepOutcome::Done
		}
		async fn rollback(&self, _job: &Job) -> StepOutcome {
			StepOutcome::Done
		}
	}

	#[tokio::test]
	async fn round_robin_cursor_wraps_around() {
		let store = Arc::new(OrderRecordStore::new(Arc::new(MemoryStore::new())));
		let mut handlers: HashMap<String, Arc<dyn StepHandler>> = HashMap::new();
		handlers.insert("Validate".to_string(), Arc::new(DoneHandler));

		let mut manager = PipelineManager::new(
			"node-a".to_string(),
			3,
			vec!["Validate".to_string()],
			handlers,
			store,
		);
		manager.start().await;

		let seen = Arc::new(StdAtomicUsize::new(0));
		let selected: Vec<usize> = (0..4).map(|_| manager.select_pipeline().id()).collect();
		let _ = seen;
		assert_eq!(selected, vec![0, 1, 2, 0]);

		manager.stop().await;
	}

	#[tokio::test]
	async fn start_recovers_active_orders() {
		let backend = Arc::new(MemoryStore::new());
		let store = Arc::new(OrderRecordStore::new(backend));

		let seed_job = Job::new(
			"11111111-1111-1111-1111-111111111111".to_string(),
			"node-a".to_string(),
			"Validate",
			store.clone(),
		)
		.await
		.unwrap();
		drop(seed_job);

		let mut handlers: HashMap<String, Arc<dyn StepHandler>> = HashMap::new();
		handlers.insert("Validate".to_string(), Arc::new(DoneHandler));

		let mut manager = PipelineManager::new(
			"node-a".to_string(),
			1,
			vec!["Validate".to_string()],
			handlers,
			store.clone(),
		);
		manager.start().await;

		tokio::time::sleep(Duration::from_millis(50)).await;
		manager.stop().await;

		let completed = store.reload("node-a", OrderStateInService::Completed).await.unwrap();
		assert_eq!(completed.len(), 1);
	}
}
