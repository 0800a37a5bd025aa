use std::net::SocketAddr;
use std::time::Duration;

/// Runtime configuration for a single node.
///
/// Built from command line flags in `main.rs`; tests construct it directly
/// with `Settings::for_node`.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Display name used to identify this node in conflict records and logs.
    pub name: String,
    /// Address the internal (node-to-node) TCP server binds to.
    pub bind_addr: SocketAddr,
    /// Address the external (client-facing) HTTP server binds to.
    pub query_addr: SocketAddr,
    /// Addresses of already-running nodes to join at startup.
    pub seed_nodes: Vec<SocketAddr>,
    /// Interval between health/quorum evaluations.
    pub health_interval: Duration,
    /// Interval between conflict cleanup passes.
    pub cleanup_interval: Duration,
    /// Timeout applied to every internal request/response exchange.
    /// Expiry is treated as a peer failure.
    pub ask_timeout: Duration,
}

impl Settings {
    pub fn for_node(name: &str, bind_addr: SocketAddr, query_addr: SocketAddr) -> Self {
        Self {
            name: name.to_string(),
            bind_addr,
            query_addr,
            seed_nodes: vec![],
            health_interval: Duration::from_secs(1),
            cleanup_interval: Duration::from_secs(2),
            ask_timeout: Duration::from_millis(1500),
        }
    }
}
