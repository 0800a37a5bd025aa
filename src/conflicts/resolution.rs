use std::sync::Arc;

use super::types::ConflictRecord;
use crate::context::ClusterContext;
use crate::wire::message::{Command, ResponseBody, STATUS_OK};

/// Raises a conflict for a write that could not be confirmed everywhere.
///
/// The record is broadcast to every node (self included, which is what puts
/// it into the local registry). Raise is fire-and-forget: peers that miss it
/// learn the record when they next connect or via a later broadcast.
pub async fn raise(ctx: &Arc<ClusterContext>, command: Command) -> ConflictRecord {
    let record = ConflictRecord::raise(ctx.node_name(), command);
    tracing::warn!(
        "Raising conflict {} for unconfirmed {}",
        record.id,
        record.command.method()
    );

    ctx.ask_all_nodes(Command::ConflictRaise {
        conflict: record.clone(),
    })
    .await;

    record
}

/// Replays a conflict's original operation through the normal dispatch path.
/// On success the resolution is broadcast so every copy flips to resolved;
/// on failure the record stays raised and the next health tick retries.
pub async fn resolve_conflict(ctx: &Arc<ClusterContext>, conflict: &ConflictRecord) {
    let replay = ctx.ask_self((*conflict.command).clone()).await;

    if !replay.is_success() {
        tracing::error!(
            "Could not resolve conflict {} (replay status {})",
            conflict.id,
            replay.status
        );
        return;
    }

    ctx.ask_all_nodes(Command::ConflictResolve {
        conflict: conflict.clone(),
    })
    .await;

    tracing::info!("Conflict {} resolved", conflict.id);
}

/// Asks every node whether its copy of the record is resolved.
///
/// A peer that has not yet seen the resolve (or is unreachable) reports
/// not-resolved, which defers cleanup to a later pass rather than deleting
/// evidence of an in-flight conflict early.
pub async fn is_resolved_on_all_nodes(
    ctx: &Arc<ClusterContext>,
    conflict: &ConflictRecord,
) -> bool {
    let responses = ctx
        .ask_all_nodes(Command::ConflictGet {
            resource_id: Some(conflict.id.clone()),
        })
        .await;

    responses.iter().all(|node| {
        if node.response.status != STATUS_OK {
            return false;
        }
        matches!(
            &node.response.body,
            ResponseBody::Conflict(record) if record.resolved
        )
    })
}

/// One cleanup pass: for every resolved conflict this node owns, delete it
/// cluster-wide once every node confirms its copy is resolved.
pub async fn cleanup_resolved_conflicts(ctx: &Arc<ClusterContext>) {
    let resolved = ctx.conflicts.own_resolved(ctx.node_name());

    for conflict in resolved {
        if !is_resolved_on_all_nodes(ctx, &conflict).await {
            tracing::debug!("Cleanup of conflict {} deferred", conflict.id);
            continue;
        }

        ctx.ask_all_nodes(Command::ConflictCleanup {
            conflict: conflict.clone(),
        })
        .await;

        tracing::info!("Conflict {} cleaned up cluster-wide", conflict.id);
    }
}
