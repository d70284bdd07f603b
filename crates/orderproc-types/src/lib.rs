//! Common types module for the order-processing system.
//!
//! This crate defines the core data types shared across the KV store,
//! order record store, pipeline, and cluster coordinator components, so
//! that every component speaks the same wire/value types.

/// Structured HTTP error types for the API surface.
pub mod api;
/// The durable order record and its step-history types.
pub mod order;
/// Peer and cluster-state snapshot types.
pub mod peer;
/// Registry trait for self-registering implementations.
pub mod registry;
/// UUID validation helper.
pub mod uuid;

pub use api::{ApiError, ErrorResponse};
pub use order::{OrderRecord, OrderStateInService, RollbackState, StepEntry, STEP_COMPLETED, STEP_FAILED};
pub use peer::{ClusterStateSnapshot, Peer};
pub use registry::ImplementationRegistry;
pub use uuid::is_valid_uuid;
