//! Membership & Join Module
//!
//! Tracks every node this process believes is part of the cluster and keeps
//! that view converged with every peer.
//!
//! ## Core Mechanisms
//! - **Join protocol**: joining one seed node is enough; the `Info` exchange
//!   carries the full transitive member set both ways, and one bounded round
//!   of follow-up joins converges everyone. Insertion is an idempotent upsert
//!   keyed by address, so concurrent joins from several directions are safe.
//! - **Reachability**: a peer is online while its wire session is connected.
//!   There is no live removal; a disconnected peer stays in the table with a
//!   broken session, and the health monitor derives quorum from reachability.

pub mod table;
pub mod types;

#[cfg(test)]
mod tests;
