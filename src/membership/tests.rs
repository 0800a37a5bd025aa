//! Membership Module Tests
//!
//! Validates the membership table invariants and the join protocol against
//! real nodes on loopback sockets.
//!
//! ## Test Scopes
//! - **Table**: idempotent upsert, ordering, online derivation.
//! - **Join Protocol**: convergence, idempotence, conflict pull on connect.

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use crate::conflicts::types::ConflictRecord;
    use crate::context::ClusterContext;
    use crate::membership::table::MembershipTable;
    use crate::membership::types::{Member, NodeStatus};
    use crate::settings::Settings;
    use crate::wire::message::Command;

    async fn start_node(name: &str) -> Arc<ClusterContext> {
        let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let query: SocketAddr = "127.0.0.1:0".parse().unwrap();
        ClusterContext::start(Settings::for_node(name, bind, query))
            .await
            .expect("node should start")
    }

    // ============================================================
    // MEMBERSHIP TABLE TESTS
    // ============================================================

    #[test]
    fn test_table_contains_self() {
        let addr: SocketAddr = "127.0.0.1:7061".parse().unwrap();
        let table = MembershipTable::new(addr, "node-a");

        assert_eq!(table.len(), 1);
        assert!(table.contains(&addr));
        assert_eq!(table.local_addr(), addr);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let addr: SocketAddr = "127.0.0.1:7061".parse().unwrap();
        let peer: SocketAddr = "127.0.0.1:7062".parse().unwrap();
        let table = MembershipTable::new(addr, "node-a");

        assert!(table.upsert(peer));
        assert!(!table.upsert(peer));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_addresses_are_sorted() {
        let addr: SocketAddr = "127.0.0.1:7063".parse().unwrap();
        let table = MembershipTable::new(addr, "node-a");
        table.upsert("127.0.0.1:7061".parse().unwrap());
        table.upsert("127.0.0.1:7062".parse().unwrap());

        let addrs = table.addresses();
        let mut sorted = addrs.clone();
        sorted.sort();
        assert_eq!(addrs, sorted);
        assert_eq!(addrs.len(), 3);
    }

    #[test]
    fn test_self_is_online_without_session() {
        let addr: SocketAddr = "127.0.0.1:7061".parse().unwrap();
        let table = MembershipTable::new(addr, "node-a");

        let members = table.snapshot();
        assert!(table.is_online(&members[0]));
        assert_eq!(table.online_count(), 1);
    }

    #[test]
    fn test_peer_without_session_is_offline() {
        let addr: SocketAddr = "127.0.0.1:7061".parse().unwrap();
        let peer: SocketAddr = "127.0.0.1:7062".parse().unwrap();
        let table = MembershipTable::new(addr, "node-a");
        table.upsert(peer);

        let offline = Member::new(peer);
        assert!(!table.is_online(&offline));
        assert_eq!(table.online_count(), 1);
        assert!(table.any_peer_offline());
    }

    #[test]
    fn test_status_transitions() {
        let addr: SocketAddr = "127.0.0.1:7061".parse().unwrap();
        let table = MembershipTable::new(addr, "node-a");

        assert_eq!(table.status_of(&addr), Some(NodeStatus::Unknown));

        table.set_status(&addr, NodeStatus::Healthy);
        assert_eq!(table.status_of(&addr), Some(NodeStatus::Healthy));

        table.set_status(&addr, NodeStatus::Unhealthy);
        assert_eq!(table.status_of(&addr), Some(NodeStatus::Unhealthy));
    }

    // ============================================================
    // JOIN PROTOCOL TESTS
    // ============================================================

    #[tokio::test]
    async fn test_join_two_nodes() {
        let a = start_node("node-a").await;
        let b = start_node("node-b").await;

        b.join(a.local_addr()).await.expect("join should succeed");

        assert_eq!(b.membership.len(), 2);
        assert_eq!(a.membership.len(), 2);
        assert!(b.membership.contains(&a.local_addr()));
        assert!(a.membership.contains(&b.local_addr()));
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let a = start_node("node-a").await;
        let b = start_node("node-b").await;

        b.join(a.local_addr()).await.expect("first join");
        b.join(a.local_addr()).await.expect("second join");

        assert_eq!(b.membership.len(), 2);
        assert_eq!(a.membership.len(), 2);
    }

    #[tokio::test]
    async fn test_join_converges_transitively() {
        let a = start_node("node-a").await;
        let b = start_node("node-b").await;
        let c = start_node("node-c").await;

        // c never talks to a directly; it learns about it through b
        b.join(a.local_addr()).await.expect("b joins a");
        c.join(b.local_addr()).await.expect("c joins b");

        let expected: Vec<SocketAddr> = {
            let mut addrs = vec![a.local_addr(), b.local_addr(), c.local_addr()];
            addrs.sort();
            addrs
        };

        assert_eq!(a.membership.addresses(), expected);
        assert_eq!(b.membership.addresses(), expected);
        assert_eq!(c.membership.addresses(), expected);
    }

    #[tokio::test]
    async fn test_join_order_does_not_matter() {
        let a = start_node("node-a").await;
        let b = start_node("node-b").await;
        let c = start_node("node-c").await;
        let d = start_node("node-d").await;

        b.join(a.local_addr()).await.expect("b joins a");
        c.join(a.local_addr()).await.expect("c joins a");
        d.join(c.local_addr()).await.expect("d joins c");

        for node in [&a, &b, &c, &d] {
            assert_eq!(node.membership.len(), 4, "every table has all four nodes");
        }
    }

    #[tokio::test]
    async fn test_join_learns_peer_name() {
        let a = start_node("alpha").await;
        let b = start_node("beta").await;

        b.join(a.local_addr()).await.expect("join");

        let member = b
            .membership
            .snapshot()
            .into_iter()
            .find(|member| member.addr == a.local_addr())
            .expect("a is in b's table");
        assert_eq!(member.name, "alpha");
    }

    #[tokio::test]
    async fn test_join_unreachable_seed_fails() {
        let a = start_node("node-a").await;
        // Nothing listens here
        let dead: SocketAddr = "127.0.0.1:1".parse().unwrap();

        let result = a.join(dead).await;
        assert!(result.is_err());

        // The failed address stays in the table, disconnected
        assert!(a.membership.contains(&dead));
        assert_eq!(a.membership.online_count(), 1);
    }

    #[tokio::test]
    async fn test_join_pulls_existing_conflicts() {
        let a = start_node("node-a").await;
        let record = ConflictRecord::raise(
            "node-a",
            Command::Post {
                collection_id: "orders".to_string(),
                resource_id: "o1".to_string(),
                document_json: "{}".to_string(),
            },
        );
        a.conflicts.upsert(record.clone());

        let b = start_node("node-b").await;
        b.join(a.local_addr()).await.expect("join");

        let pulled = b.conflicts.get(&record.id).expect("conflict was pulled");
        assert_eq!(pulled.node_name, "node-a");
        assert!(!pulled.resolved);
    }
}
