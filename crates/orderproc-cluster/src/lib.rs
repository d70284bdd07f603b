//! Consensus-backed cluster membership and order-transfer layer
//! (spec.md §4.F, §4.G).

mod coordinator;
mod error;
mod network;
mod store;
mod transfer;
mod types;

pub use coordinator::ClusterCoordinator;
pub use error::{ClusterError, TransferError};
pub use transfer::TransferService;
pub use types::{ClusterCommand, ClusterResponse, JoinCommand, TypeConfig};
