//! Order record types for the order-processing system.
//!
//! These are the durable, wire-format types persisted by the Order Record
//! Store and mutated by a Job as it advances through the workflow pipeline.

use serde::{Deserialize, Serialize};

/// The two terminal step names every workflow ends in.
pub const STEP_COMPLETED: &str = "Completed";
pub const STEP_FAILED: &str = "Failed";

/// Whether rollback has been triggered for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackState {
	None,
	Triggered,
}

impl Default for RollbackState {
	fn default() -> Self {
		Self::None
	}
}

/// One entry in an order's step history.
///
/// Append-only except for `step_rollbacked`, which may transition
/// false -> true and never back (invariant 4, spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEntry {
	pub step_name: String,
	pub start_time: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub complete_time: Option<String>,
	#[serde(default)]
	pub step_completed: bool,
	#[serde(default)]
	pub step_rollbacked: bool,
}

impl StepEntry {
	pub fn new(step_name: impl Into<String>, start_time: String) -> Self {
		Self {
			step_name: step_name.into(),
			start_time,
			complete_time: None,
			step_completed: false,
			step_rollbacked: false,
		}
	}

	pub fn is_terminal(&self) -> bool {
		self.step_name == STEP_COMPLETED || self.step_name == STEP_FAILED
	}
}

/// The durable unit of work: one order moving through the pipeline.
///
/// Field names are `snake_case` and stable — this is the exact shape
/// persisted to the KV store by the Order Record Store (spec.md §3, §4.B).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
	pub order_id: String,
	pub service_id: String,
	pub start_time: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub complete_time: Option<String>,
	pub current_step: String,
	#[serde(default)]
	pub finished: bool,
	#[serde(default)]
	pub failure_occured: bool,
	#[serde(default)]
	pub rollback_state: RollbackState,
	pub steps: Vec<StepEntry>,
}

impl OrderRecord {
	/// Creates a fresh record with one step entry for `first_step`.
	pub fn new(order_id: String, service_id: String, first_step: impl Into<String>, now: String) -> Self {
		let first_step = first_step.into();
		Self {
			order_id,
			service_id,
			start_time: now.clone(),
			complete_time: None,
			current_step: first_step.clone(),
			finished: false,
			failure_occured: false,
			rollback_state: RollbackState::None,
			steps: vec![StepEntry::new(first_step, now)],
		}
	}

	/// Derives which index (active/completed) this record belongs to under
	/// its current `service_id` (spec.md §4.C persistence policy).
	pub fn state_in_service(&self) -> OrderStateInService {
		if self.finished && self.rollback_state != RollbackState::Triggered {
			OrderStateInService::Completed
		} else {
			OrderStateInService::Active
		}
	}
}

/// Which per-service index a record currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStateInService {
	Active,
	Completed,
}

impl OrderStateInService {
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStateInService::Active => "active",
			OrderStateInService::Completed => "completed",
		}
	}
}

impl std::fmt::Display for OrderStateInService {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn new_record_has_single_step_entry() {
		let record = OrderRecord::new(
			"11111111-1111-1111-1111-111111111111".to_string(),
			"node-a".to_string(),
			"Validate",
			"2026-08-01T00:00:00Z".to_string(),
		);
		assert_eq!(record.steps.len(), 1);
		assert_eq!(record.current_step, "Validate");
		assert!(!record.finished);
		assert_eq!(record.state_in_service(), OrderStateInService::Active);
	}

	#[test]
	fn finished_and_not_rollbacking_is_completed() {
		let mut record = OrderRecord::new(
			"11111111-1111-1111-1111-111111111111".to_string(),
			"node-a".to_string(),
			"Completed",
			"2026-08-01T00:00:00Z".to_string(),
		);
		record.finished = true;
		assert_eq!(record.state_in_service(), OrderStateInService::Completed);

		record.rollback_state = RollbackState::Triggered;
		assert_eq!(record.state_in_service(), OrderStateInService::Active);
	}

	#[test]
	fn serializes_with_snake_case_fields() {
		let record = OrderRecord::new(
			"11111111-1111-1111-1111-111111111111".to_string(),
			"node-a".to_string(),
			"Validate",
			"2026-08-01T00:00:00Z".to_string(),
		);
		let json = serde_json::to_value(&record).unwrap();
		assert!(json.get("order_id").is_some());
		assert!(json.get("service_id").is_some());
		assert!(json.get("current_step").is_some());
		assert!(json.get("rollback_state").is_some());
	}
}
