use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

use crate::conflicts::resolution;
use crate::context::ClusterContext;
use crate::membership::types::NodeStatus;

/// Quorum policy: strictly more than half the membership must be reachable.
/// Self always counts as online.
pub fn evaluate_quorum(online: usize, total: usize) -> NodeStatus {
    if total == 0 {
        return NodeStatus::Unhealthy;
    }
    let percentage_online = online as f64 / total as f64;
    if percentage_online > 0.5 {
        NodeStatus::Healthy
    } else {
        NodeStatus::Unhealthy
    }
}

/// One health evaluation.
///
/// Owning any unresolved conflict forces unhealthy and spends the tick on
/// resolution attempts instead of quorum evaluation.
pub async fn sync_server_health(ctx: &Arc<ClusterContext>) {
    let own_unresolved = ctx.conflicts.own_unresolved(ctx.node_name());

    if !own_unresolved.is_empty() {
        ctx.membership
            .set_status(&ctx.local_addr(), NodeStatus::Unhealthy);

        for conflict in own_unresolved {
            resolution::resolve_conflict(ctx, &conflict).await;
        }
        return;
    }

    let total = ctx.membership.len();
    let online = ctx.membership.online_count();
    let status = evaluate_quorum(online, total);

    if status == NodeStatus::Unhealthy {
        let percentage_online = online as f64 / total.max(1) as f64;
        tracing::warn!(
            "Less than 51% of the cluster is online ({} of {}, {:.2})",
            online,
            total,
            percentage_online
        );
    }

    ctx.membership.set_status(&ctx.local_addr(), status);
}

/// Periodic trigger for the monitor loops. Ticks missed while a pass runs
/// long are skipped, never fired back-to-back afterwards.
pub(crate) fn monitor_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Spawns the two periodic loops: health/resolution and conflict cleanup.
pub fn start(ctx: Arc<ClusterContext>) {
    let health_ctx = ctx.clone();
    tokio::spawn(async move {
        let mut interval = monitor_interval(health_ctx.settings.health_interval);
        loop {
            interval.tick().await;
            sync_server_health(&health_ctx).await;
        }
    });

    let cleanup_ctx = ctx;
    tokio::spawn(async move {
        let mut interval = monitor_interval(cleanup_ctx.settings.cleanup_interval);
        loop {
            interval.tick().await;
            resolution::cleanup_resolved_conflicts(&cleanup_ctx).await;
        }
    });

    tracing::info!("Health and cleanup monitors started");
}
