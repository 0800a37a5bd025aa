use dashmap::DashMap;
use tokio::sync::broadcast;

/// Per-node subscription state.
///
/// `watched` mirrors cluster-wide interest (maintained by the `NotifyOn` /
/// `NotifyOff` handlers); `local` counts this node's own WebSocket
/// subscribers, used to decide when to fan the bookkeeping commands out.
pub struct NotifyRegistry {
    watched: DashMap<String, usize>,
    local: DashMap<String, usize>,
    events: broadcast::Sender<String>,
}

impl NotifyRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            watched: DashMap::new(),
            local: DashMap::new(),
            events,
        }
    }

    // --- cluster-wide bookkeeping (NotifyOn / NotifyOff handlers) ---

    pub fn watch(&self, path: &str) {
        *self.watched.entry(path.to_string()).or_insert(0) += 1;
    }

    pub fn unwatch(&self, path: &str) {
        if let Some(mut count) = self.watched.get_mut(path) {
            *count = count.saturating_sub(1);
            if *count > 0 {
                return;
            }
        }
        self.watched.remove_if(path, |_, count| *count == 0);
    }

    pub fn is_watched(&self, path: &str) -> bool {
        self.watched.contains_key(path)
    }

    // --- local WebSocket subscribers ---

    /// Registers a local subscriber; true when it is the first for this path.
    pub fn local_subscribe(&self, path: &str) -> bool {
        let mut count = self.local.entry(path.to_string()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Removes a local subscriber; true when it was the last for this path.
    pub fn local_unsubscribe(&self, path: &str) -> bool {
        let last = match self.local.get_mut(path) {
            Some(mut count) => {
                *count = count.saturating_sub(1);
                *count == 0
            }
            None => false,
        };
        if last {
            self.local.remove_if(path, |_, count| *count == 0);
        }
        last
    }

    /// Delivers a triggered path to this node's subscribers.
    pub fn publish(&self, path: &str) {
        // No receivers is fine; send only fails when nobody listens
        let _ = self.events.send(path.to_string());
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }
}

impl Default for NotifyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_counts_per_node() {
        let registry = NotifyRegistry::new();

        registry.watch("POST:/orders");
        registry.watch("POST:/orders");
        assert!(registry.is_watched("POST:/orders"));

        registry.unwatch("POST:/orders");
        assert!(registry.is_watched("POST:/orders"));

        registry.unwatch("POST:/orders");
        assert!(!registry.is_watched("POST:/orders"));
    }

    #[test]
    fn test_local_subscribe_first_and_last() {
        let registry = NotifyRegistry::new();

        assert!(registry.local_subscribe("GET:/a"));
        assert!(!registry.local_subscribe("GET:/a"));

        assert!(!registry.local_unsubscribe("GET:/a"));
        assert!(registry.local_unsubscribe("GET:/a"));
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let registry = NotifyRegistry::new();
        let mut events = registry.subscribe_events();

        registry.publish("POST:/orders/o1");

        let path = events.recv().await.expect("event");
        assert_eq!(path, "POST:/orders/o1");
    }
}
