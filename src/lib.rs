//! Clustered Document Store Library
//!
//! This library crate defines the core modules that make up the distributed system.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of loosely coupled subsystems:
//!
//! - **`membership`**: The cluster coordination layer. Tracks every known node and
//!   implements the transitive join protocol that converges all nodes on the same
//!   membership set.
//! - **`wire`**: The internal node-to-node channel. A framed, persistent TCP
//!   request/response session plus the command dispatcher that routes incoming
//!   messages to their handlers.
//! - **`conflicts`**: The replication-uncertainty layer. Records writes that could
//!   not be confirmed everywhere and drives their retry, cluster-wide resolution
//!   and eventual cleanup.
//! - **`health`**: The periodic health and quorum monitor. Derives this node's
//!   status from its own unresolved conflicts and the fraction of the cluster
//!   currently reachable.
//! - **`locks`**: The distributed lock table. Exclusive holds over resource keys
//!   that gate every write path, cluster-wide via broadcast.
//! - **`storage`**: The local document store. An in-memory collection/document
//!   table with a small filter-query language.
//! - **`notify`**: Subscription bookkeeping for the push-notification channel.
//! - **`api`**: The external client surface. HTTP request/response plus a
//!   WebSocket subscription channel, both translating into internal commands.

pub mod api;
pub mod conflicts;
pub mod context;
pub mod health;
pub mod locks;
pub mod membership;
pub mod notify;
pub mod settings;
pub mod storage;
pub mod util;
pub mod wire;
