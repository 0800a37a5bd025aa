use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Extension;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

use crate::context::ClusterContext;
use crate::wire::message::Command;

/// Client protocol, JSON arrays both ways:
/// - client: `[acceptId, "NOTIFY", path]` / `[acceptId, "UNNOTIFY", path]`
/// - server ack: `["A", acceptId]`
/// - server event: `["T", path]`
pub async fn handle_upgrade(
    ws: WebSocketUpgrade,
    Extension(ctx): Extension<Arc<ClusterContext>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn handle_socket(socket: WebSocket, ctx: Arc<ClusterContext>) {
    let (mut sink, mut stream) = socket.split();
    let mut events = ctx.notify.subscribe_events();
    let mut subscribed: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            incoming = stream.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error: {}", e);
                        break;
                    }
                };

                let reply = handle_client_message(&ctx, &mut subscribed, &text).await;
                if sink.send(Message::Text(reply.to_string())).await.is_err() {
                    break;
                }
            }

            event = events.recv() => {
                match event {
                    Ok(path) => {
                        if !subscribed.contains(&path) {
                            continue;
                        }
                        let frame = json!(["T", path]);
                        if sink.send(Message::Text(frame.to_string())).await.is_err() {
                            break;
                        }
                    }
                    // Slow consumer: skip missed events rather than dropping the socket
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("WebSocket subscriber lagged {} events", missed);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    // Departed client: release its subscriptions, cluster bookkeeping included
    for path in subscribed {
        if ctx.notify.local_unsubscribe(&path) {
            ctx.ask_all_nodes(Command::NotifyOff { path }).await;
        }
    }
}

async fn handle_client_message(
    ctx: &Arc<ClusterContext>,
    subscribed: &mut HashSet<String>,
    raw: &str,
) -> Value {
    let message: Value = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(_) => return json!(["R", Value::Null, "INVALID_MESSAGE"]),
    };

    let accept_id = message.get(0).cloned().unwrap_or(Value::Null);
    let command = message.get(1).and_then(|value| value.as_str());
    let path = message.get(2).and_then(|value| value.as_str());

    match (command, path) {
        (Some("NOTIFY"), Some(path)) => {
            if subscribed.insert(path.to_string()) {
                // First local subscriber for this path: tell the cluster
                if ctx.notify.local_subscribe(path) {
                    ctx.ask_all_nodes(Command::NotifyOn {
                        path: path.to_string(),
                    })
                    .await;
                }
            }
            json!(["A", accept_id])
        }
        (Some("UNNOTIFY"), Some(path)) => {
            if subscribed.remove(path) && ctx.notify.local_unsubscribe(path) {
                ctx.ask_all_nodes(Command::NotifyOff {
                    path: path.to_string(),
                })
                .await;
            }
            json!(["A", accept_id])
        }
        _ => json!(["R", accept_id, "COMMAND_NOT_FOUND"]),
    }
}
