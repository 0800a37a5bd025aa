//! External API Module
//!
//! The client-facing surface: an HTTP request/response server and a WebSocket
//! subscription channel. Every operation translates into internal commands,
//! fans out to all nodes and aggregates the full response set; the external
//! layer holds no state of its own beyond WebSocket subscriptions.
//!
//! An unhealthy node refuses external traffic with 503 while continuing to
//! answer internal protocol traffic, since internal traffic is what heals a
//! partition.

pub mod http;
pub mod ws;

#[cfg(test)]
mod tests;
