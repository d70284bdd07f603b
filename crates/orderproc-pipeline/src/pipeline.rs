//! Pipeline: a single-consumer worker over a FIFO queue of Jobs
//! (spec.md §4.D).

use crate::{Job, StepHandler, StepOutcome};
use orderproc_types::{STEP_COMPLETED, STEP_FAILED};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Looks up the step that follows `current` in the fixed sequence,
/// returning the terminal `Completed` step once the sequence is exhausted.
fn next_step(steps: &[String], current: &str) -> String {
	match steps.iter().position(|s| s == current) {
		Some(idx) if idx + 1 < steps.len() => steps[idx + 1].clone(),
		_ => STEP_COMPLETED.to_string(),
	}
}

/// A single-consumer worker owning one FIFO job queue and a bank of
/// per-step handlers.
pub struct Pipeline {
	id: usize,
	tx: Option<mpsc::UnboundedSender<Job>>,
	steps: Arc<Vec<String>>,
	handlers: Arc<HashMap<String, Arc<dyn StepHandler>>>,
	worker: Option<JoinHandle<()>>,
}

impl Pipeline {
	/// Creates a Pipeline with an empty, unstarted queue.
	pub fn new(id: usize, steps: Arc<Vec<String>>, handlers: Arc<HashMap<String, Arc<dyn StepHandler>>>) -> Self {
		Self {
			id,
			tx: None,
			steps,
			handlers,
			worker: None,
		}
	}

	pub fn id(&self) -> usize {
		self.id
	}

	/// Enqueues a Job. Panics if called before `start()` — callers must not
	/// dispatch work to a Pipeline that has not been started.
	pub fn append_job(&self, job: Job) {
		let tx = self.tx.as_ref().expect("pipeline not started");
		// The receiver only drops once `stop()` has been called; a send
		// error here would mean we are enqueueing into a stopped pipeline.
		let _ = tx.send(job);
	}

	/// Spawns the long-running worker task implementing the six-step tick
	/// algorithm (spec.md §4.D).
	pub fn start(&mut self) {
		let (tx, rx) = mpsc::unbounded_channel::<Job>();
		let steps = self.steps.clone();
		let handlers = self.handlers.clone();
		let id = self.id;

		self.tx = Some(tx);
		self.worker = Some(tokio::spawn(run(id, rx, steps, handlers)));
	}

	/// Signals the worker to terminate once its queue drains and awaits it.
	pub async fn stop(&mut self) {
		// Dropping the sender causes `rx.recv()` to return `None` once the
		// queue is empty, ending the worker's loop. The worker re-enqueues
		// unfinished jobs onto its own internal deque rather than onto this
		// channel, so it never holds a sender of its own that would keep the
		// channel open past this point.
		self.tx.take();
		if let Some(worker) = self.worker.take() {
			let _ = worker.await;
		}
	}
}

async fn run(
	id: usize,
	mut rx: mpsc::UnboundedReceiver<Job>,
	steps: Arc<Vec<String>>,
	handlers: Arc<HashMap<String, Arc<dyn StepHandler>>>,
) {
	let mut pending: VecDeque<Job> = VecDeque::new();

	loop {
		let mut job = match pending.pop_front() {
			Some(job) => job,
			None => match rx.recv().await {
				Some(job) => job,
				None => break,
			},
		};

		let order_id = job.order_id().to_string();

		if job.is_error_occured() && !job.is_job_rollbacking() {
			job.start_rollback();
		}

		if job.is_job_rollbacking() {
			if let Ok(step_name) = job.get_rollback_step() {
				if let Some(handler) = handlers.get(&step_name) {
					let _ = handler.rollback(&job).await;
				}
				if let Err(e) = job.rollback_step(&step_name).await {
					tracing::warn!(pipeline = id, order_id = %order_id, error = %e, "rollback_step failed to persist");
				}
			}

			if job.is_job_rollbacking() {
				pending.push_back(job);
				continue;
			}

			if let Err(e) = job.start_step(STEP_FAILED).await {
				tracing::warn!(pipeline = id, order_id = %order_id, error = %e, "failed to transition to Failed step");
			}
			if let Err(e) = job.finish_current_step().await {
				tracing::warn!(pipeline = id, order_id = %order_id, error = %e, "failed to finish Failed step");
			}
		} else if job.is_current_step_completed() && !job.is_job_in_finishing_step() {
			let target = next_step(&steps, job.current_step());
			if let Err(e) = job.start_step(&target).await {
				tracing::warn!(pipeline = id, order_id = %order_id, error = %e, "failed to start next step");
			}
		} else {
			let current = job.current_step().to_string();
			if current == STEP_COMPLETED {
				// The Completed terminal is reached by the branch above
				// starting it, not by a registered handler; finish it
				// directly, mirroring how the Failed terminal above is
				// finished without consulting the handler bank.
				if let Err(e) = job.finish_current_step().await {
					tracing::warn!(pipeline = id, order_id = %order_id, error = %e, "failed to finish Completed step");
				}
			} else {
				let outcome = match handlers.get(&current) {
					Some(handler) => handler.execute(&job).await,
					None => {
						tracing::warn!(pipeline = id, order_id = %order_id, step = %current, "no handler registered for step");
						StepOutcome::Failed
					},
				};

				match outcome {
					StepOutcome::Done => {
						if let Err(e) = job.finish_current_step().await {
							tracing::warn!(pipeline = id, order_id = %order_id, error = %e, "failed to finish step");
						}
					},
					StepOutcome::Failed => {
						job.mark_job_as_failure();
						pending.push_back(job);
						continue;
					},
				}
			}
		}

		if job.is_job_finished() {
			if let Err(e) = job.finalize_job().await {
				tracing::warn!(pipeline = id, order_id = %order_id, error = %e, "failed to finalize job");
			}
			// Job is complete; it is intentionally dropped here.
		} else {
			pending.push_back(job);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use orderproc_storage::implementations::memory::MemoryStore;
	use orderproc_storage::OrderRecordStore;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	struct CountingHandler {
		executions: Arc<AtomicUsize>,
		outcome: StepOutcome,
	}

	#[async_trait::async_trait]
	impl StepHandler for CountingHandler {
		async fn execute(&self, _job: &Job) -> StepOutcome {
			self.executions.fetch_add(1, Ordering::SeqCst);
			self.outcome
		}

		async fn rollback(&self, _job: &Job) -> StepOutcome {
			StepOutcome::Done
		}
	}

	#[tokio::test]
	async fn job_advances_through_all_steps_to_completion() {
		let store = Arc::new(OrderRecordStore::new(Arc::new(MemoryStore::new())));
		let steps = Arc::new(vec!["Validate".to_string(), "Reserve".to_string()]);
		let executions = Arc::new(AtomicUsize::new(0));

		let mut handlers: HashMap<String, Arc<dyn StepHandler>> = HashMap::new();
		for step in steps.iter() {
			handlers.insert(
				step.clone(),
				Arc::new(CountingHandler {
					executions: executions.clone(),
					outcome: StepOutcome::Done,
				}) as Arc<dyn StepHandler>,
			);
		}

		let mut pipeline = Pipeline::new(0, steps, Arc::new(handlers));
		pipeline.start();

		let order_id = "11111111-1111-1111-1111-111111111111".to_string();
		let job = Job::new(order_id.clone(), "node-a".to_string(), "Validate", store.clone())
			.await
			.unwrap();
		pipeline.append_job(job);

		tokio::time::sleep(Duration::from_millis(50)).await;
		pipeline.stop().await;

		assert_eq!(executions.load(Ordering::SeqCst), 2);

		let completed = store
			.reload("node-a", orderproc_types::OrderStateInService::Completed)
			.await
			.unwrap();
		assert_eq!(completed.len(), 1);
		assert_eq!(completed[0].order_id, order_id);
		assert_eq!(completed[0].current_step, STEP_COMPLETED);
		assert!(completed[0].finished);
	}

	#[tokio::test]
	async fn failing_handler_drives_job_to_failed_via_rollback() {
		let store = Arc::new(OrderRecordStore::new(Arc::new(MemoryStore::new())));
		let steps = Arc::new(vec!["Validate".to_string()]);
		let executions = Arc::new(AtomicUsize::new(0));

		let mut handlers: HashMap<String, Arc<dyn StepHandler>> = HashMap::new();
		handlers.insert(
			"Validate".to_string(),
			Arc::new(CountingHandler {
				executions: executions.clone(),
				outcome: StepOutcome::Failed,
			}) as Arc<dyn StepHandler>,
		);

		let mut pipeline = Pipeline::new(0, steps, Arc::new(handlers));
		pipeline.start();

		let order_id = "11111111-1111-1111-1111-111111111111".to_string();
		let job = Job::new(order_id.clone(), "node-a".to_string(), "Validate", store.clone())
			.await
			.unwrap();
		pipeline.append_job(job);

		tokio::time::sleep(Duration::from_millis(50)).await;
		pipeline.stop().await;

		let completed = store
			.reload("node-a", orderproc_types::OrderStateInService::Completed)
			.await
			.unwrap();
		assert_eq!(completed.len(), 1);
		assert_eq!(completed[0].order_id, order_id);
		assert_eq!(completed[0].current_step, STEP_FAILED);
	}
}
