//! Lock Module Tests
//!
//! Mutual exclusion, re-entrancy and the wait/fail gate used by the write
//! path.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::locks::table::LockTable;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let table = LockTable::new();

        table.acquire("l1", keys(&["orders"])).await;
        assert_eq!(table.held().await.len(), 1);

        assert!(table.release("l1").await);
        assert!(table.held().await.is_empty());
    }

    #[tokio::test]
    async fn test_release_unknown_id() {
        let table = LockTable::new();
        assert!(!table.release("ghost").await);
    }

    #[tokio::test]
    async fn test_acquire_same_id_twice_is_single_hold() {
        let table = LockTable::new();

        table.acquire("l1", keys(&["orders"])).await;
        table.acquire("l1", keys(&["orders"])).await;

        assert_eq!(table.held().await.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_fast_gate_reports_locked() {
        let table = LockTable::new();
        table.acquire("l1", keys(&["orders"])).await;

        let blocked = table
            .is_locked_or_wait(&keys(&["orders"]), Some("l2"), false)
            .await;
        assert!(blocked);

        let anonymous = table.is_locked_or_wait(&keys(&["orders"]), None, false).await;
        assert!(anonymous);
    }

    #[tokio::test]
    async fn test_holder_passes_its_own_gate() {
        let table = LockTable::new();
        table.acquire("l1", keys(&["orders"])).await;

        let blocked = table
            .is_locked_or_wait(&keys(&["orders"]), Some("l1"), false)
            .await;
        assert!(!blocked);
    }

    #[tokio::test]
    async fn test_disjoint_keys_do_not_block() {
        let table = LockTable::new();
        table.acquire("l1", keys(&["orders"])).await;

        let blocked = table
            .is_locked_or_wait(&keys(&["invoices"]), Some("l2"), false)
            .await;
        assert!(!blocked);
    }

    #[tokio::test]
    async fn test_waiting_gate_wakes_on_release() {
        let table = Arc::new(LockTable::new());
        table.acquire("l1", keys(&["orders"])).await;

        let waiter_table = table.clone();
        let waiter = tokio::spawn(async move {
            waiter_table
                .is_locked_or_wait(&keys(&["orders"]), Some("l2"), true)
                .await
        });

        // The waiter must still be parked while the lock is held
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        assert!(table.release("l1").await);

        let blocked = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter task should not panic");
        assert!(!blocked);
    }

    #[tokio::test]
    async fn test_acquire_queues_behind_conflicting_hold() {
        let table = Arc::new(LockTable::new());
        table.acquire("l1", keys(&["orders"])).await;

        let second_table = table.clone();
        let second = tokio::spawn(async move {
            second_table.acquire("l2", keys(&["orders"])).await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished());
        assert_eq!(table.held().await.len(), 1);

        assert!(table.release("l1").await);

        tokio::time::timeout(Duration::from_secs(1), second)
            .await
            .expect("second acquire should complete")
            .expect("acquire task should not panic");

        let held = table.held().await;
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].id, "l2");
    }

    #[tokio::test]
    async fn test_multi_key_overlap_blocks() {
        let table = LockTable::new();
        table.acquire("l1", keys(&["orders", "invoices"])).await;

        let blocked = table
            .is_locked_or_wait(&keys(&["invoices", "payments"]), Some("l2"), false)
            .await;
        assert!(blocked);
    }
}
