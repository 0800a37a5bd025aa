use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::wire::session::WireSession;

/// Health status of a node, derived each tick by the health monitor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeStatus {
    /// Not evaluated yet (freshly discovered nodes start here).
    Unknown,
    Healthy,
    Unhealthy,
}

/// Identity a node advertises about itself during the `Info` exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeInfo {
    pub name: String,
    pub version: String,
}

/// One entry in the membership table.
///
/// Exactly one member represents this process (`addr == local_addr`); it never
/// carries a session because loopback dispatch is direct. Peers hold the
/// persistent wire session opened to them during join.
#[derive(Clone)]
pub struct Member {
    pub addr: SocketAddr,
    /// Display name; defaults to the address until the peer advertises one.
    pub name: String,
    pub session: Option<Arc<WireSession>>,
    pub info: Option<NodeInfo>,
    pub status: NodeStatus,
}

impl Member {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            name: addr.to_string(),
            session: None,
            info: None,
            status: NodeStatus::Unknown,
        }
    }
}

impl std::fmt::Debug for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Member")
            .field("addr", &self.addr)
            .field("name", &self.name)
            .field("connected", &self.session.is_some())
            .field("status", &self.status)
            .finish()
    }
}
