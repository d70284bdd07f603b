//! Job: the per-order state machine (spec.md §4.C).
//!
//! A `Job` wraps one `OrderRecord` and the `OrderRecordStore` it is
//! persisted through. Every state-changing operation persists the record
//! before returning, giving at-least-once durability per transition.

use chrono::Utc;
use orderproc_storage::{OrderRecordStore, OrderStoreError};
use orderproc_types::{OrderRecord, RollbackState, STEP_COMPLETED, STEP_FAILED};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by Job operations (spec.md §4.C, §7).
#[derive(Debug, Error)]
pub enum JobError {
	/// `StartStep` was called before the previous step finished or failed.
	#[error("last step not completed")]
	LastStepNotCompleted,
	/// `GetRollbackStep` found no eligible step left to roll back.
	#[error("no more step need to be revoked")]
	NoStepToRollback,
	/// `FinalizeJob` was called while the job is not in a terminal,
	/// non-rollbacking state.
	#[error("job not ready to be finished")]
	NotReadyToFinish,
	/// The Order Record Store could not persist the transition.
	#[error(transparent)]
	StoreUnavailable(#[from] OrderStoreError),
}

fn now() -> String {
	Utc::now().to_rfc3339()
}

/// One order moving through the pipeline.
pub struct Job {
	record: OrderRecord,
	store: Arc<OrderRecordStore>,
}

impl Job {
	/// Wraps an existing record (used by recovery and transfer, which load
	/// records the Order Record Store already knows about).
	pub fn from_record(record: OrderRecord, store: Arc<OrderRecordStore>) -> Self {
		Self { record, store }
	}

	/// Creates a brand-new job and persists its first step entry.
	pub async fn new(
		order_id: String,
		service_id: String,
		first_step: impl Into<String>,
		store: Arc<OrderRecordStore>,
	) -> Result<Self, JobError> {
		let record = OrderRecord::new(order_id, service_id, first_step, now());
		let job = Self { record, store };
		job.persist().await?;
		Ok(job)
	}

	pub fn order_id(&self) -> &str {
		&self.record.order_id
	}

	pub fn service_id(&self) -> &str {
		&self.record.service_id
	}

	pub fn current_step(&self) -> &str {
		&self.record.current_step
	}

	pub fn record(&self) -> &OrderRecord {
		&self.record
	}

	/// Rewrites the owning service id. Used by a Transfer recipient when it
	/// adopts a peer's order; the new ownership is persisted on the job's
	/// next transition rather than immediately.
	pub fn set_service_id(&mut self, service_id: String) {
		self.record.service_id = service_id.clone();
	}

	pub fn is_current_step_completed(&self) -> bool {
		self.record
			.steps
			.last()
			.map(|s| s.step_completed)
			.unwrap_or(false)
	}

	pub fn is_job_finished(&self) -> bool {
		self.record.finished
	}

	pub fn is_job_in_finishing_step(&self) -> bool {
		self.record.current_step == STEP_COMPLETED || self.record.current_step == STEP_FAILED
	}

	pub fn is_error_occured(&self) -> bool {
		self.record.failure_occured
	}

	/// Sets the failure flag. Does not persist by itself — the caller is
	/// expected to persist on the next transition (matches spec.md §4.C:
	/// "No persistence by itself").
	pub fn mark_job_as_failure(&mut self) {
		self.record.failure_occured = true;
	}

	pub fn start_rollback(&mut self) {
		self.record.rollback_state = RollbackState::Triggered;
	}

	/// True iff rollback has been triggered and at least one non-terminal
	/// step has not yet been rolled back.
	pub fn is_job_rollbacking(&self) -> bool {
		self.record.rollback_state == RollbackState::Triggered
			&& self
				.record
				.steps
				.iter()
				.any(|s| !s.is_terminal() && !s.step_rollbacked)
	}

	/// Returns the latest non-terminal, non-rolled-back step's name.
	pub fn get_rollback_step(&self) -> Result<String, JobError> {
		self.record
			.steps
			.iter()
			.rev()
			.find(|s| !s.is_terminal() && !s.step_rollbacked)
			.map(|s| s.step_name.clone())
			.ok_or(JobError::NoStepToRollback)
	}

	/// Appends a new step entry and advances `current_step`. A call that
	/// repeats the current step is a no-op (idempotent under redelivery).
	pub async fn start_step(&mut self, step_name: &str) -> Result<(), JobError> {
		if self.record.current_step == step_name {
			return Ok(());
		}

		let last_completed = self
			.record
			.steps
			.last()
			.map(|s| s.step_completed)
			.unwrap_or(true);
		if !last_completed && !self.record.failure_occured {
			return Err(JobError::LastStepNotCompleted);
		}

		self.record
			.steps
			.push(orderproc_types::StepEntry::new(step_name, now()));
		self.record.current_step = step_name.to_string();
		self.persist().await?;
		Ok(())
	}

	/// Marks the last step entry completed; if that step is terminal and
	/// rollback is not in progress, marks the whole record finished.
	pub async fn finish_current_step(&mut self) -> Result<(), JobError> {
		let timestamp = now();
		if let Some(step) = self.record.steps.last_mut() {
			step.step_completed = true;
			step.complete_time = Some(timestamp.clone());
		}

		if self.is_job_in_finishing_step() && !self.is_job_rollbacking() {
			self.record.finished = true;
			self.record.complete_time = Some(timestamp);
		}

		self.persist().await?;
		Ok(())
	}

	/// Marks the named step entry rolled back. The entry must exist and not
	/// already be rolled back.
	pub async fn rollback_step(&mut self, step_name: &str) -> Result<(), JobError> {
		if let Some(step) = self
			.record
			.steps
			.iter_mut()
			.rev()
			.find(|s| s.step_name == step_name && !s.step_rollbacked)
		{
			step.step_rollbacked = true;
		}
		self.persist().await?;
		Ok(())
	}

	/// Marks the record finished outright. Requires the job to be sitting
	/// in a terminal step with rollback not in progress.
	pub async fn finalize_job(&mut self) -> Result<(), JobError> {
		if !self.is_job_in_finishing_step() || self.is_job_rollbacking() {
			return Err(JobError::NotReadyToFinish);
		}
		self.record.finished = true;
		self.record.complete_time = Some(now());
		self.persist().await?;
		Ok(())
	}

	/// Persists via the Order Record Store using the rollback-aware
	/// derivation from spec.md §4.C ("completed iff finished=true AND NOT
	/// rolling back"), which differs from `OrderRecord::state_in_service`'s
	/// simpler flag check: a job that finished by completing rollback has
	/// `rollback_state=Triggered` forever, but is no longer *actively*
	/// rolling back once every step has been rolled back.
	async fn persist(&self) -> Result<(), OrderStoreError> {
		let state = if self.is_job_finished() && !self.is_job_rollbacking() {
			orderproc_types::OrderStateInService::Completed
		} else {
			orderproc_types::OrderStateInService::Active
		};
		self.store.save(&self.record, state).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use orderproc_storage::implementations::memory::MemoryStore;

	async fn new_job() -> Job {
		let store = Arc::new(OrderRecordStore::new(Arc::new(MemoryStore::new())));
		Job::new(
			"11111111-1111-1111-1111-111111111111".to_string(),
			"node-a".to_string(),
			"Validate",
			store,
		)
		.await
		.unwrap()
	}

	#[tokio::test]
	async fn start_step_is_idempotent_on_repeat() {
		let mut job = new_job().await;
		job.start_step("Validate").await.unwrap();
		assert_eq!(job.record().steps.len(), 1);
	}

	#[tokio::test]
	async fn start_step_rejects_unfinished_predecessor() {
		let mut job = new_job().await;
		let err = job.start_step("Reserve").await.unwrap_err();
		assert!(matches!(err, JobError::LastStepNotCompleted));
	}

	#[tokio::test]
	async fn start_step_allowed_after_failure_without_completion() {
		let mut job = new_job().await;
		job.mark_job_as_failure();
		job.start_step("Reserve").await.unwrap();
		assert_eq!(job.current_step(), "Reserve");
	}

	#[tokio::test]
	async fn finish_current_step_on_terminal_marks_finished() {
		let mut job = new_job().await;
		job.finish_current_step().await.unwrap();
		job.start_step(STEP_COMPLETED).await.unwrap();
		job.finish_current_step().await.unwrap();
		assert!(job.is_job_finished());
	}

	#[tokio::test]
	async fn rollback_cycle_completes_and_allows_failed_transition() {
		let mut job = new_job().await;
		job.mark_job_as_failure();
		job.start_rollback();
		assert!(job.is_job_rollbacking());

		let step = job.get_rollback_step().unwrap();
		assert_eq!(step, "Validate");
		job.rollback_step(&step).await.unwrap();

		assert!(!job.is_job_rollbacking());
		job.start_step(STEP_FAILED).await.unwrap();
		job.finish_current_step().await.unwrap();
		assert!(job.is_job_finished());
	}

	#[tokio::test]
	async fn get_rollback_step_errors_when_nothing_left() {
		let mut job = new_job().await;
		job.start_rollback();
		job.finish_current_step().await.unwrap();
		job.rollback_step("Validate").await.unwrap();
		let err = job.get_rollback_step().unwrap_err();
		assert!(matches!(err, JobError::NoStepToRollback));
	}

	#[tokio::test]
	async fn finalize_job_rejects_non_terminal_step() {
		let mut job = new_job().await;
		let err = job.finalize_job().await.unwrap_err();
		assert!(matches!(err, JobError::NotReadyToFinish));
	}
}
