//! Step handler capability (spec.md §9 "preferred" design).
//!
//! Handlers return a `StepOutcome` rather than holding a reference back
//! into their owning `Pipeline`; the `Pipeline` alone decides whether to
//! finish, fail, or re-enqueue a job. This keeps `Pipeline` and
//! `StepHandler` from needing to know about each other's internals.

use crate::Job;

/// The result of running a step's business logic once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
	/// The step's side effect completed; the Pipeline should call
	/// `FinishCurrentStep`.
	Done,
	/// The step's side effect failed; the Pipeline should mark the job
	/// failed and trigger rollback on its next tick.
	Failed,
}

/// One pipeline step's business logic.
///
/// Implementations are looked up by step name in the Pipeline's handler
/// bank and must be idempotent: a crash after the side effect but before
/// persistence re-executes `execute` on recovery (spec.md §4.C persistence
/// policy).
#[async_trait::async_trait]
pub trait StepHandler: Send + Sync {
	/// Runs the step's forward side effect.
	async fn execute(&self, job: &Job) -> StepOutcome;

	/// Undoes the step's forward side effect during rollback.
	async fn rollback(&self, job: &Job) -> StepOutcome;
}
