use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};

use crate::util::now_ms;

/// An exclusive claim over one or more resource keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lock {
    pub id: String,
    pub keys: Vec<String>,
    pub acquired_at: u64,
}

/// The per-node lock table plus the wakeup used by waiting writers.
pub struct LockTable {
    locks: Mutex<Vec<Lock>>,
    released: Notify,
}

impl LockTable {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(Vec::new()),
            released: Notify::new(),
        }
    }

    /// Records a lock. Waits for conflicting holds by other ids to clear
    /// first, so acquisition queues rather than trampling an active hold.
    pub async fn acquire(&self, id: &str, keys: Vec<String>) {
        // Blocks only this caller; other sessions keep being served
        self.is_locked_or_wait(&keys, Some(id), true).await;

        let mut locks = self.locks.lock().await;
        if locks.iter().any(|lock| lock.id == id) {
            return;
        }
        locks.push(Lock {
            id: id.to_string(),
            keys,
            acquired_at: now_ms(),
        });
    }

    /// Releases a lock and wakes every waiter. Returns false when the id is
    /// not held here.
    pub async fn release(&self, id: &str) -> bool {
        let mut locks = self.locks.lock().await;
        let before = locks.len();
        locks.retain(|lock| lock.id != id);
        let removed = locks.len() < before;
        drop(locks);

        if removed {
            self.released.notify_waiters();
        }
        removed
    }

    pub async fn held(&self) -> Vec<Lock> {
        self.locks.lock().await.clone()
    }

    /// The write-path gate.
    ///
    /// Returns true ("locked") when some key is covered by a hold with a
    /// different id and the caller chose not to wait. With `wait_for_unlock`
    /// the caller suspends until the covering hold is released, then
    /// re-checks; it returns false once every key is free or held by
    /// `requesting_id` itself (self-reentrant).
    pub async fn is_locked_or_wait(
        &self,
        keys: &[String],
        requesting_id: Option<&str>,
        wait_for_unlock: bool,
    ) -> bool {
        loop {
            // Arm the wakeup before checking so a release between check and
            // await is not missed
            let notified = self.released.notified();

            let blocked = {
                let locks = self.locks.lock().await;
                locks.iter().any(|lock| {
                    if Some(lock.id.as_str()) == requesting_id {
                        return false;
                    }
                    lock.keys.iter().any(|held| keys.contains(held))
                })
            };

            if !blocked {
                return false;
            }
            if !wait_for_unlock {
                return true;
            }

            notified.await;
        }
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}
