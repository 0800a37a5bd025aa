//! Conflict Registry & Resolution Module
//!
//! A conflict is a write this node applied locally but could not confirm on at
//! least one peer. The record is broadcast so the whole cluster can see that
//! the owning node has an outstanding uncertainty, and the owner keeps
//! replaying the original operation until it succeeds.
//!
//! ## Lifecycle
//! 1. **Raised**: created by the node that saw the failure, broadcast to every
//!    peer (idempotent upsert by id).
//! 2. **Resolved**: the owner replays the original command through its own
//!    dispatch path; on success it broadcasts resolve and every copy flips
//!    `resolved = true` (one-way, owner-driven).
//! 3. **Cleaned up**: once every node confirms its copy is resolved, the owner
//!    broadcasts cleanup and all copies are deleted. A lagging peer simply
//!    defers cleanup to a later pass.
//!
//! Replay assumes the original operation is idempotent; there is no
//! de-duplication before resending, and retries are unbounded.

pub mod registry;
pub mod resolution;
pub mod types;
