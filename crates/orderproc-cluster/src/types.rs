//! Consensus type configuration for the cluster coordinator.
//!
//! The wire format the consensus layer itself exchanges with its transport
//! is treated as opaque (out of scope); this module only declares the
//! application-level types `openraft` needs parameterized: the node id
//! (a node's stable `service_id`), the node descriptor (its connection
//! string), and the log entry payload (membership changes only — this
//! service does not replicate order data through the log).

use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// The data type applied through the Raft log. Membership changes are
/// handled by `openraft`'s native `add_learner`/`change_membership` calls,
/// so this crate never needs to apply a meaningful business command —
/// `Noop` exists purely to satisfy `AppData`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClusterCommand {
	Noop,
}

/// The response type for an applied `ClusterCommand`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterResponse;

openraft::declare_raft_types!(
	/// Type configuration for this service's Raft group: node ids are the
	/// stable `service_id` strings nodes are configured with, rather than
	/// an opaque integer.
	pub TypeConfig:
		D = ClusterCommand,
		R = ClusterResponse,
		NodeId = String,
		Node = openraft::BasicNode,
);

/// A join request as posted to `POST /cluster/join` (spec.md §6): the
/// requester's stable id and the connection string peers should dial it
/// at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinCommand {
	pub name: String,
	pub connection_string: String,
}
