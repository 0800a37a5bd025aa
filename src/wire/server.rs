use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use super::message::{
    read_frame, write_frame, Command, RequestFrame, Response, ResponseBody, ResponseFrame,
    STATUS_LOCKED, STATUS_NOT_FOUND, STATUS_SERVER_ERROR,
};
use crate::conflicts::types::ConflictRecord;
use crate::context::ClusterContext;
use crate::storage::query;

/// Accept loop for the internal listener. Each connection is one peer's
/// client half; requests on it are handled concurrently so a waiting lock
/// gate never stalls the channel.
pub async fn serve(ctx: Arc<ClusterContext>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::debug!("Accepted internal connection from {}", peer);
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    handle_connection(ctx, stream).await;
                });
            }
            Err(e) => {
                tracing::error!("Failed to accept internal connection: {}", e);
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}

async fn handle_connection(ctx: Arc<ClusterContext>, stream: tokio::net::TcpStream) {
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(Mutex::new(writer));

    loop {
        let frame = match read_frame::<RequestFrame, _>(&mut reader).await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("Internal connection closed: {}", e);
                return;
            }
        };

        let ctx = ctx.clone();
        let writer = writer.clone();
        tokio::spawn(async move {
            let response = dispatch(&ctx, frame.command).await;
            let reply = ResponseFrame {
                id: frame.id,
                response,
            };

            let mut writer = writer.lock().await;
            if let Err(e) = write_frame(&mut *writer, &reply).await {
                tracing::debug!("Failed to write response frame: {}", e);
            }
        });
    }
}

/// Routes a command to its handler. The match is exhaustive: a new command
/// variant will not compile until it is handled here.
///
/// A handler error never crashes the node; it becomes an error-status
/// response to this single command.
pub async fn dispatch(ctx: &Arc<ClusterContext>, command: Command) -> Response {
    tracing::debug!("Dispatching {}", command.method());

    let result = match command {
        Command::Info { nodes } => handle_info(ctx, nodes).await,
        Command::Get {
            collection_id,
            resource_id,
            query_json,
        } => handle_get(ctx, &collection_id, resource_id, query_json).await,
        Command::Post {
            collection_id,
            resource_id,
            document_json,
        } => handle_post(ctx, &collection_id, &resource_id, &document_json).await,
        Command::Put {
            collection_id,
            resource_id,
            query_json,
            document_json,
            lock_id,
            wait_for_unlock,
        } => {
            handle_put(
                ctx,
                &collection_id,
                resource_id,
                query_json,
                &document_json,
                lock_id,
                wait_for_unlock,
            )
            .await
        }
        Command::Patch {
            collection_id,
            resource_id,
            query_json,
            document_json,
            lock_id,
            wait_for_unlock,
        } => {
            handle_patch(
                ctx,
                &collection_id,
                resource_id,
                query_json,
                &document_json,
                lock_id,
                wait_for_unlock,
            )
            .await
        }
        Command::Delete {
            collection_id,
            resource_id,
            query_json,
            lock_id,
            wait_for_unlock,
        } => {
            handle_delete(
                ctx,
                &collection_id,
                resource_id,
                query_json,
                lock_id,
                wait_for_unlock,
            )
            .await
        }
        Command::ConflictRaise { conflict } => handle_conflict_raise(ctx, conflict),
        Command::ConflictResolve { conflict } => handle_conflict_resolve(ctx, &conflict),
        Command::ConflictCleanup { conflict } => handle_conflict_cleanup(ctx, &conflict),
        Command::ConflictGet { resource_id } => handle_conflict_get(ctx, resource_id),
        Command::Lock { id, keys } => handle_lock(ctx, &id, keys).await,
        Command::Unlock { id } => handle_unlock(ctx, &id).await,
        Command::NotifyOn { path } => {
            ctx.notify.watch(&path);
            Ok(Response::ok())
        }
        Command::NotifyOff { path } => {
            ctx.notify.unwatch(&path);
            Ok(Response::ok())
        }
        Command::Notify { path } => {
            ctx.notify.publish(&path);
            Ok(Response::ok())
        }
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Handler failed: {}", e);
            Response::error(STATUS_SERVER_ERROR, e.to_string())
        }
    }
}

/// Merges the sender's member list into ours (one bounded join per unknown
/// address, concurrently) and answers with the merged list.
async fn handle_info(
    ctx: &Arc<ClusterContext>,
    nodes: Vec<std::net::SocketAddr>,
) -> Result<Response> {
    let joins = nodes.into_iter().map(|addr| {
        let ctx = ctx.clone();
        async move {
            if let Err(e) = ctx.join_one(addr).await {
                tracing::warn!("Join of advertised node {} failed: {}", addr, e);
            }
        }
    });
    join_all(joins).await;

    Ok(Response::ok_with(ResponseBody::ClusterInfo {
        nodes: ctx.membership.addresses(),
        name: ctx.settings.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn handle_get(
    ctx: &Arc<ClusterContext>,
    collection_id: &str,
    resource_id: Option<String>,
    query_json: Option<String>,
) -> Result<Response> {
    match resource_id {
        Some(id) => match ctx.storage.get_one(collection_id, &id) {
            Some(Some(document)) => {
                Ok(Response::ok_with(ResponseBody::Documents(vec![document])))
            }
            Some(None) | None => Ok(Response::status(STATUS_NOT_FOUND)),
        },
        None => {
            let filter = query::parse(query_json.as_deref())?;
            match ctx.storage.get_all(collection_id, filter.as_ref()) {
                Some(documents) => Ok(Response::ok_with(ResponseBody::Documents(documents))),
                None => Ok(Response::status(STATUS_NOT_FOUND)),
            }
        }
    }
}

async fn handle_post(
    ctx: &Arc<ClusterContext>,
    collection_id: &str,
    resource_id: &str,
    document_json: &str,
) -> Result<Response> {
    let document = ctx.storage.post(collection_id, resource_id, document_json)?;
    Ok(Response::created(ResponseBody::Document(document)))
}

async fn handle_put(
    ctx: &Arc<ClusterContext>,
    collection_id: &str,
    resource_id: Option<String>,
    query_json: Option<String>,
    document_json: &str,
    lock_id: Option<String>,
    wait_for_unlock: bool,
) -> Result<Response> {
    let keys = vec![collection_id.to_string()];
    if ctx
        .locks
        .is_locked_or_wait(&keys, lock_id.as_deref(), wait_for_unlock)
        .await
    {
        return Ok(Response::error(STATUS_LOCKED, "lock prevented change"));
    }

    let filter = query::parse(query_json.as_deref())?;
    match ctx.storage.put(
        collection_id,
        resource_id.as_deref(),
        filter.as_ref(),
        document_json,
    )? {
        Some(changes) => Ok(Response::ok_with(ResponseBody::Changes(changes))),
        None => Ok(Response::status(STATUS_NOT_FOUND)),
    }
}

async fn handle_patch(
    ctx: &Arc<ClusterContext>,
    collection_id: &str,
    resource_id: Option<String>,
    query_json: Option<String>,
    document_json: &str,
    lock_id: Option<String>,
    wait_for_unlock: bool,
) -> Result<Response> {
    let keys = vec![collection_id.to_string()];
    if ctx
        .locks
        .is_locked_or_wait(&keys, lock_id.as_deref(), wait_for_unlock)
        .await
    {
        return Ok(Response::error(STATUS_LOCKED, "lock prevented change"));
    }

    let filter = query::parse(query_json.as_deref())?;
    match ctx.storage.patch(
        collection_id,
        resource_id.as_deref(),
        filter.as_ref(),
        document_json,
    )? {
        Some(changes) => Ok(Response::ok_with(ResponseBody::Changes(changes))),
        None => Ok(Response::status(STATUS_NOT_FOUND)),
    }
}

async fn handle_delete(
    ctx: &Arc<ClusterContext>,
    collection_id: &str,
    resource_id: Option<String>,
    query_json: Option<String>,
    lock_id: Option<String>,
    wait_for_unlock: bool,
) -> Result<Response> {
    let keys = vec![collection_id.to_string()];
    if ctx
        .locks
        .is_locked_or_wait(&keys, lock_id.as_deref(), wait_for_unlock)
        .await
    {
        return Ok(Response::error(STATUS_LOCKED, "lock prevented change"));
    }

    let filter = query::parse(query_json.as_deref())?;
    match ctx
        .storage
        .delete(collection_id, resource_id.as_deref(), filter.as_ref())
    {
        Some(changes) => Ok(Response::ok_with(ResponseBody::Changes(changes))),
        None => Ok(Response::status(STATUS_NOT_FOUND)),
    }
}

fn handle_conflict_raise(ctx: &Arc<ClusterContext>, conflict: ConflictRecord) -> Result<Response> {
    tracing::info!("Conflict {} raised by {}", conflict.id, conflict.node_name);
    ctx.conflicts.upsert(conflict);
    Ok(Response::ok())
}

fn handle_conflict_resolve(
    ctx: &Arc<ClusterContext>,
    conflict: &ConflictRecord,
) -> Result<Response> {
    // Unknown ids are a no-op: this peer may simply never have seen the raise
    if ctx.conflicts.mark_resolved(&conflict.id) {
        tracing::info!("Conflict {} marked resolved", conflict.id);
    }
    Ok(Response::ok())
}

fn handle_conflict_cleanup(
    ctx: &Arc<ClusterContext>,
    conflict: &ConflictRecord,
) -> Result<Response> {
    if ctx.conflicts.remove(&conflict.id) {
        tracing::info!("Conflict {} cleaned up", conflict.id);
    }
    Ok(Response::ok())
}

fn handle_conflict_get(
    ctx: &Arc<ClusterContext>,
    resource_id: Option<String>,
) -> Result<Response> {
    match resource_id {
        Some(id) => match ctx.conflicts.get(&id) {
            Some(record) => Ok(Response::ok_with(ResponseBody::Conflict(record))),
            None => Ok(Response::status(STATUS_NOT_FOUND)),
        },
        None => Ok(Response::ok_with(ResponseBody::Conflicts(
            ctx.conflicts.all(),
        ))),
    }
}

async fn handle_lock(
    ctx: &Arc<ClusterContext>,
    id: &str,
    keys: Vec<String>,
) -> Result<Response> {
    ctx.locks.acquire(id, keys).await;
    Ok(Response::ok_with(ResponseBody::LockGranted(id.to_string())))
}

async fn handle_unlock(ctx: &Arc<ClusterContext>, id: &str) -> Result<Response> {
    if ctx.locks.release(id).await {
        Ok(Response::ok())
    } else {
        Ok(Response::status(STATUS_NOT_FOUND))
    }
}
