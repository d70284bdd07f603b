//! Peer bookkeeping types for the cluster coordinator.

use serde::{Deserialize, Serialize};

/// A known member of the cluster, as tracked in the coordinator's volatile
/// membership view (spec.md §3 "Peer").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
	pub name: String,
	pub connection_string: String,
	pub last_activity: String,
	pub connected: bool,
}

/// Snapshot JSON returned by `ClusterCoordinator::describe_state`
/// (spec.md §4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStateSnapshot {
	pub leader_name: String,
	pub nodes_count: usize,
	pub nodes: Vec<Peer>,
	pub generated_at: String,
}
