//! Error kinds for the cluster coordinator and transfer service
//! (spec.md §7).

use thiserror::Error;

/// Errors surfaced by `ClusterCoordinator` operations.
#[derive(Debug, Error)]
pub enum ClusterError {
	/// A join or bootstrap invariant was violated; callers should treat
	/// this as fatal and abort the process (spec.md §6 exit codes).
	#[error("fatal cluster startup error: {0}")]
	Fatal(String),
	/// No leader is currently known.
	#[error("leader unknown")]
	LeaderUnknown,
	/// The local consensus instance rejected an operation.
	#[error("consensus error: {0}")]
	Consensus(String),
	/// An HTTP call to a peer failed.
	#[error("peer request failed: {0}")]
	PeerRequest(String),
}

/// Errors surfaced by a single `Transfer` attempt. The Transfer loop
/// retries on this until success or leadership loss (spec.md §7).
#[derive(Debug, Error)]
pub enum TransferError {
	/// Every candidate peer, including self, rejected the transfer.
	#[error("no peer accepted the transfer")]
	NoPeerAccepted,
	/// Leadership was lost mid-transfer; the loop must stop.
	#[error("lost leadership during transfer")]
	LeadershipLost,
}
