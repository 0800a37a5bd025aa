//! Cluster Context
//!
//! One `ClusterContext` per process owns all shared coordination state: the
//! membership table, conflict registry, lock table, local store and
//! notification bookkeeping. Command handlers, the periodic monitors and the
//! external API all operate through a shared `Arc` of it.

use anyhow::Result;
use futures::future::join_all;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::conflicts::registry::ConflictRegistry;
use crate::locks::table::LockTable;
use crate::membership::table::MembershipTable;
use crate::membership::types::NodeInfo;
use crate::notify::registry::NotifyRegistry;
use crate::settings::Settings;
use crate::storage::store::MemoryStore;
use crate::wire::message::{Command, Response, ResponseBody, STATUS_UNREACHABLE};
use crate::wire::server;
use crate::wire::session::WireSession;

/// One entry of a fan-out result: which node answered, and with what.
#[derive(Debug, Clone)]
pub struct NodeResponse {
    pub addr: SocketAddr,
    pub response: Response,
}

pub struct ClusterContext {
    pub settings: Settings,
    pub membership: MembershipTable,
    pub conflicts: ConflictRegistry,
    pub locks: LockTable,
    pub storage: MemoryStore,
    pub notify: NotifyRegistry,
}

impl ClusterContext {
    /// Binds the internal listener, registers self in the membership table and
    /// spawns the wire server. The periodic monitors are started separately by
    /// `health::monitor::start`.
    pub async fn start(settings: Settings) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(settings.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let membership = MembershipTable::new(local_addr, &settings.name);
        membership.set_info(
            &local_addr,
            NodeInfo {
                name: settings.name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        );

        let ctx = Arc::new(Self {
            settings,
            membership,
            conflicts: ConflictRegistry::new(),
            locks: LockTable::new(),
            storage: MemoryStore::new(),
            notify: NotifyRegistry::new(),
        });

        tokio::spawn(server::serve(ctx.clone(), listener));

        tracing::info!("Node {} listening on {}", ctx.settings.name, local_addr);

        Ok(ctx)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.membership.local_addr()
    }

    pub fn node_name(&self) -> &str {
        &self.settings.name
    }

    /// Dispatches a command to this node directly. Loopback never rides a
    /// wire session.
    pub async fn ask_self(self: &Arc<Self>, command: Command) -> Response {
        server::dispatch(self, command).await
    }

    /// Sends one command to every member concurrently and collects all
    /// responses in membership (address) order.
    ///
    /// There is no partial-result short circuit: an unreachable peer
    /// contributes a 503-status entry instead of aborting the set, and the
    /// caller decides how to interpret the mix.
    pub async fn ask_all_nodes(self: &Arc<Self>, command: Command) -> Vec<NodeResponse> {
        let members = self.membership.snapshot();
        let local_addr = self.local_addr();

        let asks = members.into_iter().map(|member| {
            let ctx = self.clone();
            let command = command.clone();
            async move {
                let response = if member.addr == local_addr {
                    ctx.ask_self(command).await
                } else {
                    match &member.session {
                        Some(session) => session
                            .ask(command, ctx.settings.ask_timeout)
                            .await
                            .unwrap_or_else(|e| {
                                Response::error(STATUS_UNREACHABLE, e.to_string())
                            }),
                        None => Response::error(STATUS_UNREACHABLE, "node is not connected"),
                    }
                };

                NodeResponse {
                    addr: member.addr,
                    response,
                }
            }
        });

        join_all(asks).await
    }

    /// Joins the cluster through one known node.
    ///
    /// The first hop returns the peer's full member list; every address we did
    /// not yet know gets one non-recursive follow-up join. Two hops are enough
    /// because the first peer has already merged with everyone it knows.
    pub async fn join(self: &Arc<Self>, addr: SocketAddr) -> Result<()> {
        let discovered = self.join_one(addr).await?;

        for other in discovered {
            if other == self.local_addr() || self.membership.contains(&other) {
                continue;
            }
            if let Err(e) = self.join_one(other).await {
                tracing::warn!("Follow-up join of {} failed: {}", other, e);
            }
        }

        Ok(())
    }

    /// One hop of the join protocol: connect, exchange member lists, pull the
    /// peer's conflict registry. Idempotent by address. Returns the peer's
    /// member list so the caller can decide whether to recurse.
    pub async fn join_one(self: &Arc<Self>, addr: SocketAddr) -> Result<Vec<SocketAddr>> {
        if addr == self.local_addr() {
            return Ok(vec![]);
        }
        if !self.membership.upsert(addr) {
            // Already present (possibly joined concurrently from elsewhere)
            return Ok(vec![]);
        }

        tracing::info!("Joining {}", addr);

        let session = WireSession::connect(addr).await?;
        self.membership.attach_session(&addr, session.clone());

        let reply = session
            .ask(
                Command::Info {
                    nodes: self.membership.addresses(),
                },
                self.settings.ask_timeout,
            )
            .await?;

        let discovered = match reply.body {
            ResponseBody::ClusterInfo {
                nodes,
                name,
                version,
            } => {
                self.membership.set_info(&addr, NodeInfo { name, version });
                nodes
            }
            _ => vec![],
        };

        self.pull_conflicts_from(&session).await;

        Ok(discovered)
    }

    /// A node that joins late still has to learn about in-flight conflicts:
    /// fetch the peer's full registry and upsert every record.
    async fn pull_conflicts_from(&self, session: &Arc<WireSession>) {
        let reply = session
            .ask(
                Command::ConflictGet { resource_id: None },
                self.settings.ask_timeout,
            )
            .await;

        match reply {
            Ok(response) => {
                if let ResponseBody::Conflicts(records) = response.body {
                    for record in records {
                        self.conflicts.upsert(record);
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Could not pull conflicts from {}: {}", session.peer(), e);
            }
        }
    }
}
