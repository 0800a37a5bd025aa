use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use super::types::{Member, NodeInfo, NodeStatus};
use crate::wire::session::WireSession;

/// The set of nodes this process believes are part of the cluster.
///
/// Mutated only by the join protocol and the health monitor. All entries are
/// keyed by address; insertion is an idempotent upsert, which is what makes
/// concurrent joins from multiple directions safe.
pub struct MembershipTable {
    local_addr: SocketAddr,
    nodes: DashMap<SocketAddr, Member>,
}

impl MembershipTable {
    /// Creates a table containing only this node.
    pub fn new(local_addr: SocketAddr, local_name: &str) -> Self {
        let nodes = DashMap::new();
        let mut member = Member::new(local_addr);
        member.name = local_name.to_string();
        nodes.insert(local_addr, member);

        Self { local_addr, nodes }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.nodes.contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Inserts a newly discovered node with no session and unknown status.
    /// Returns false when the address was already present.
    pub fn upsert(&self, addr: SocketAddr) -> bool {
        if self.nodes.contains_key(&addr) {
            return false;
        }
        self.nodes.insert(addr, Member::new(addr));
        true
    }

    pub fn attach_session(&self, addr: &SocketAddr, session: Arc<WireSession>) {
        if let Some(mut member) = self.nodes.get_mut(addr) {
            member.session = Some(session);
        }
    }

    pub fn set_info(&self, addr: &SocketAddr, info: NodeInfo) {
        if let Some(mut member) = self.nodes.get_mut(addr) {
            member.name = info.name.clone();
            member.info = Some(info);
        }
    }

    pub fn set_status(&self, addr: &SocketAddr, status: NodeStatus) {
        if let Some(mut member) = self.nodes.get_mut(addr) {
            member.status = status;
        }
    }

    pub fn status_of(&self, addr: &SocketAddr) -> Option<NodeStatus> {
        self.nodes.get(addr).map(|member| member.status)
    }

    /// All member addresses, sorted for deterministic ordering.
    pub fn addresses(&self) -> Vec<SocketAddr> {
        let mut addrs: Vec<SocketAddr> = self.nodes.iter().map(|entry| *entry.key()).collect();
        addrs.sort();
        addrs
    }

    /// Copy-on-write snapshot of the table, in address order. Fan-out and the
    /// health computation iterate over this rather than the live map.
    pub fn snapshot(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self
            .nodes
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        members.sort_by_key(|member| member.addr);
        members
    }

    /// A member is online when it is this node, or its session is still up.
    pub fn is_online(&self, member: &Member) -> bool {
        if member.addr == self.local_addr {
            return true;
        }
        member
            .session
            .as_ref()
            .map(|session| !session.is_closed())
            .unwrap_or(false)
    }

    /// Number of currently reachable members, self included.
    pub fn online_count(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|member| self.is_online(member))
            .count()
    }

    /// True when some peer is known but not currently reachable.
    pub fn any_peer_offline(&self) -> bool {
        self.snapshot()
            .iter()
            .any(|member| !self.is_online(member))
    }
}
