//! External API Tests
//!
//! Aggregation over fan-out result sets, request validation helpers, and the
//! write-settlement path that turns partial failures into conflicts.

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use crate::api::http::{
        any_ok, has_lock_conflict, has_server_error, local_response, lock_options,
        merge_documents, peer_failure_count, settle_write, total_changes, valid_collection_id,
    };
    use crate::context::{ClusterContext, NodeResponse};
    use crate::settings::Settings;
    use crate::wire::message::{
        Command, Document, Response, ResponseBody, STATUS_LOCKED, STATUS_NOT_FOUND,
        STATUS_SERVER_ERROR, STATUS_UNREACHABLE,
    };

    async fn start_node(name: &str) -> Arc<ClusterContext> {
        let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let query: SocketAddr = "127.0.0.1:0".parse().unwrap();
        ClusterContext::start(Settings::for_node(name, bind, query))
            .await
            .expect("node should start")
    }

    fn node_response(port: u16, response: Response) -> NodeResponse {
        NodeResponse {
            addr: format!("127.0.0.1:{}", port).parse().unwrap(),
            response,
        }
    }

    fn documents_response(ids: &[&str]) -> Response {
        Response::ok_with(ResponseBody::Documents(
            ids.iter()
                .map(|id| Document {
                    id: id.to_string(),
                    data_json: "{}".to_string(),
                })
                .collect(),
        ))
    }

    // ============================================================
    // VALIDATION TESTS
    // ============================================================

    #[test]
    fn test_collection_id_validation() {
        assert!(valid_collection_id("orders"));
        assert!(valid_collection_id("orders-2024.archive"));
        assert!(valid_collection_id("A1"));

        assert!(!valid_collection_id(""));
        assert!(!valid_collection_id("orders/2024"));
        assert!(!valid_collection_id("orders db"));
        assert!(!valid_collection_id("örders"));
    }

    #[test]
    fn test_lock_options_default_to_waiting() {
        let headers = HeaderMap::new();
        let (lock_id, wait) = lock_options(&headers);
        assert!(lock_id.is_none());
        assert!(wait);
    }

    #[test]
    fn test_lock_options_fail_strategy() {
        let mut headers = HeaderMap::new();
        headers.insert("lock-id", "l1".parse().unwrap());
        headers.insert("lock-strategy", "fail".parse().unwrap());

        let (lock_id, wait) = lock_options(&headers);
        assert_eq!(lock_id.as_deref(), Some("l1"));
        assert!(!wait);
    }

    // ============================================================
    // AGGREGATION TESTS
    // ============================================================

    #[test]
    fn test_server_error_classification() {
        let responses = vec![
            node_response(7061, Response::ok()),
            node_response(7062, Response::error(STATUS_SERVER_ERROR, "boom")),
            node_response(7063, Response::ok()),
        ];

        assert!(has_server_error(&responses));
        assert!(!has_lock_conflict(&responses));
        assert_eq!(responses.len(), 3, "every node is represented");
    }

    #[test]
    fn test_lock_conflict_classification() {
        let responses = vec![
            node_response(7061, Response::ok()),
            node_response(7062, Response::error(STATUS_LOCKED, "lock prevented change")),
        ];

        assert!(has_lock_conflict(&responses));
        assert!(!has_server_error(&responses));
    }

    #[test]
    fn test_local_response_lookup() {
        let local: SocketAddr = "127.0.0.1:7061".parse().unwrap();
        let responses = vec![
            node_response(7061, Response::ok_with(ResponseBody::Changes(1))),
            node_response(7062, Response::ok_with(ResponseBody::Changes(2))),
        ];

        let found = local_response(&responses, local).expect("local entry");
        assert!(matches!(found.body, ResponseBody::Changes(1)));

        let missing: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert!(local_response(&responses, missing).is_none());
    }

    #[test]
    fn test_peer_failure_count_excludes_self() {
        let local: SocketAddr = "127.0.0.1:7061".parse().unwrap();
        let responses = vec![
            node_response(7061, Response::error(STATUS_SERVER_ERROR, "local boom")),
            node_response(7062, Response::error(STATUS_UNREACHABLE, "gone")),
            node_response(7063, Response::ok()),
        ];

        assert_eq!(peer_failure_count(&responses, local), 1);
    }

    #[test]
    fn test_total_changes_sums_across_nodes() {
        let responses = vec![
            node_response(7061, Response::ok_with(ResponseBody::Changes(2))),
            node_response(7062, Response::ok_with(ResponseBody::Changes(3))),
            node_response(7063, Response::error(STATUS_UNREACHABLE, "gone")),
        ];

        assert_eq!(total_changes(&responses), 5);
    }

    #[test]
    fn test_divergent_write_counts_as_found() {
        // The local copy answers 404 while a peer applied the change; the
        // write must classify as found, not as missing
        let responses = vec![
            node_response(7061, Response::status(STATUS_NOT_FOUND)),
            node_response(7062, Response::ok_with(ResponseBody::Changes(1))),
        ];

        assert!(any_ok(&responses));
        assert_eq!(total_changes(&responses), 1);
    }

    #[test]
    fn test_all_not_found_classifies_as_missing() {
        let responses = vec![
            node_response(7061, Response::status(STATUS_NOT_FOUND)),
            node_response(7062, Response::status(STATUS_NOT_FOUND)),
        ];

        assert!(!any_ok(&responses));
    }

    #[test]
    fn test_merge_documents_dedupes_and_sorts() {
        let responses = vec![
            node_response(7061, documents_response(&["b", "a"])),
            node_response(7062, documents_response(&["b", "c"])),
            node_response(7063, Response::error(STATUS_UNREACHABLE, "gone")),
        ];

        let merged = merge_documents(&responses);
        let ids: Vec<&str> = merged.iter().map(|doc| doc.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    // ============================================================
    // FAN-OUT AND SETTLEMENT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_fan_out_returns_every_node_including_unreachable() {
        let a = start_node("node-a").await;
        let b = start_node("node-b").await;
        b.join(a.local_addr()).await.expect("join");

        // A member that was seen once but cannot be reached
        let dead: SocketAddr = "127.0.0.1:9201".parse().unwrap();
        a.membership.upsert(dead);

        let responses = a
            .ask_all_nodes(Command::Get {
                collection_id: "orders".to_string(),
                resource_id: None,
                query_json: None,
            })
            .await;

        assert_eq!(responses.len(), 3);
        let dead_entry = responses
            .iter()
            .find(|node| node.addr == dead)
            .expect("unreachable node still answers in the set");
        assert_eq!(dead_entry.response.status, STATUS_UNREACHABLE);
        assert!(has_server_error(&responses));
    }

    #[tokio::test]
    async fn test_settle_write_raises_conflict_on_partial_failure() {
        let a = start_node("node-a").await;
        let b = start_node("node-b").await;
        b.join(a.local_addr()).await.expect("join");

        let dead: SocketAddr = "127.0.0.1:9202".parse().unwrap();
        a.membership.upsert(dead);

        let command = Command::Post {
            collection_id: "orders".to_string(),
            resource_id: "o1".to_string(),
            document_json: r#"{"total":1}"#.to_string(),
        };

        let responses = a.ask_all_nodes(command.clone()).await;
        let local = settle_write(&a, command, &responses)
            .await
            .expect("local write succeeded");
        assert!(local.is_success());

        // The unconfirmed write left a conflict behind, on the reachable
        // peer as well
        assert_eq!(a.conflicts.len(), 1);
        assert_eq!(b.conflicts.len(), 1);
        assert_eq!(a.conflicts.own_unresolved("node-a").len(), 1);
    }

    #[tokio::test]
    async fn test_settle_write_clean_fan_out_raises_nothing() {
        let a = start_node("node-a").await;
        let b = start_node("node-b").await;
        b.join(a.local_addr()).await.expect("join");

        let command = Command::Post {
            collection_id: "orders".to_string(),
            resource_id: "o1".to_string(),
            document_json: r#"{"total":1}"#.to_string(),
        };

        let responses = a.ask_all_nodes(command.clone()).await;
        let local = settle_write(&a, command, &responses)
            .await
            .expect("write succeeded");
        assert!(local.is_success());

        assert!(a.conflicts.is_empty());
        assert!(b.conflicts.is_empty());
    }

    #[tokio::test]
    async fn test_settle_write_surfaces_lock_conflict() {
        let a = start_node("node-a").await;
        a.storage.post("orders", "o1", "{}").expect("seed");
        a.locks
            .acquire("holder", vec!["orders".to_string()])
            .await;

        let command = Command::Put {
            collection_id: "orders".to_string(),
            resource_id: Some("o1".to_string()),
            query_json: None,
            document_json: r#"{"total":2}"#.to_string(),
            lock_id: None,
            wait_for_unlock: false,
        };

        let responses = a.ask_all_nodes(command.clone()).await;
        let result = settle_write(&a, command, &responses).await;

        assert!(result.is_err(), "locked write settles as a client error");
        assert!(a.conflicts.is_empty(), "a refused write is not a conflict");
    }
}
