use axum::extract::{Extension, Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use super::ws;
use crate::conflicts::resolution;
use crate::context::{ClusterContext, NodeResponse};
use crate::membership::types::NodeStatus;
use crate::wire::message::{
    Command, Document, Response, ResponseBody, STATUS_LOCKED, STATUS_NOT_FOUND, STATUS_OK,
};

pub fn router(ctx: Arc<ClusterContext>) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/_/locks", post(handle_lock))
        .route("/_/locks/:id", delete(handle_unlock))
        .route("/ws", get(ws::handle_upgrade))
        .route(
            "/:collection",
            get(handle_get_all)
                .post(handle_post)
                .put(handle_put_all)
                .patch(handle_patch_all)
                .delete(handle_delete_all),
        )
        .route(
            "/:collection/:id",
            get(handle_get_one)
                .put(handle_put_one)
                .patch(handle_patch_one)
                .delete(handle_delete_one),
        )
        .layer(Extension(ctx))
}

fn collection_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9.\-]+$").expect("static pattern"))
}

pub(crate) fn valid_collection_id(collection_id: &str) -> bool {
    collection_id_pattern().is_match(collection_id)
}

/// Health gate for external traffic. Internal protocol traffic never passes
/// through here.
fn node_available(ctx: &ClusterContext) -> bool {
    ctx.membership.status_of(&ctx.local_addr()) == Some(NodeStatus::Healthy)
}

fn unavailable() -> (StatusCode, Json<Value>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "errors": ["the cluster is unhealthy, therefore the database is down"]
        })),
    )
}

fn invalid_collection() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
            "errors": ["collectionId can only contain a-z, A-Z, 0-9, dashes or dots"]
        })),
    )
}

/// Extracts the caller-selected lock id and wait strategy. Waiting is the
/// default; `lock-strategy: fail` asks for an immediate 409 instead.
pub(crate) fn lock_options(headers: &HeaderMap) -> (Option<String>, bool) {
    let lock_id = headers
        .get("lock-id")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());
    let wait_for_unlock = headers
        .get("lock-strategy")
        .and_then(|value| value.to_str().ok())
        .map(|value| value != "fail")
        .unwrap_or(true);
    (lock_id, wait_for_unlock)
}

fn query_filter(params: &HashMap<String, String>) -> Option<String> {
    params.get("query").cloned()
}

// --- aggregation over fan-out results ---

pub(crate) fn any_ok(responses: &[NodeResponse]) -> bool {
    responses.iter().any(|node| node.response.status == STATUS_OK)
}

pub(crate) fn has_server_error(responses: &[NodeResponse]) -> bool {
    responses.iter().any(|node| node.response.status >= 500)
}

pub(crate) fn has_lock_conflict(responses: &[NodeResponse]) -> bool {
    responses
        .iter()
        .any(|node| node.response.status == STATUS_LOCKED)
}

pub(crate) fn local_response<'a>(
    responses: &'a [NodeResponse],
    local_addr: SocketAddr,
) -> Option<&'a Response> {
    responses
        .iter()
        .find(|node| node.addr == local_addr)
        .map(|node| &node.response)
}

pub(crate) fn peer_failure_count(responses: &[NodeResponse], local_addr: SocketAddr) -> usize {
    responses
        .iter()
        .filter(|node| node.addr != local_addr && node.response.status >= 500)
        .count()
}

pub(crate) fn total_changes(responses: &[NodeResponse]) -> u64 {
    responses
        .iter()
        .map(|node| match &node.response.body {
            ResponseBody::Changes(changes) => *changes,
            _ => 0,
        })
        .sum()
}

/// Merges the document lists of every successful response, deduplicated by id
/// (every node holds a full copy) and sorted for stable output.
pub(crate) fn merge_documents(responses: &[NodeResponse]) -> Vec<Document> {
    let mut by_id: HashMap<String, Document> = HashMap::new();
    for node in responses {
        if node.response.status != STATUS_OK {
            continue;
        }
        if let ResponseBody::Documents(documents) = &node.response.body {
            for document in documents {
                by_id.insert(document.id.clone(), document.clone());
            }
        }
    }

    let mut documents: Vec<Document> = by_id.into_values().collect();
    documents.sort_by(|a, b| a.id.cmp(&b.id));
    documents
}

fn document_value(document: &Document) -> Value {
    let mut value: Value =
        serde_json::from_str(&document.data_json).unwrap_or_else(|_| json!({}));
    if let Value::Object(map) = &mut value {
        map.insert("id".to_string(), Value::String(document.id.clone()));
    }
    value
}

/// Shared tail of every write path: classify the fan-out, raise a conflict
/// when the write landed locally but not everywhere, and hand the local
/// response back for method-specific shaping.
pub(crate) async fn settle_write(
    ctx: &Arc<ClusterContext>,
    command: Command,
    responses: &[NodeResponse],
) -> Result<Response, (StatusCode, Json<Value>)> {
    if has_lock_conflict(responses) {
        return Err((
            StatusCode::CONFLICT,
            Json(json!({"error": "lock prevented change"})),
        ));
    }

    let local = match local_response(responses, ctx.local_addr()) {
        Some(response) => response.clone(),
        None => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "unexpected server error"})),
            ))
        }
    };

    if local.status >= 500 {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "unexpected server error"})),
        ));
    }

    // The write already happened here; unreachable peers degrade to eventual
    // reconciliation instead of failing the caller
    if peer_failure_count(responses, ctx.local_addr()) > 0 {
        resolution::raise(ctx, command).await;
    }

    Ok(local)
}

/// Fans a triggered notification path out to every node's local subscribers,
/// when anyone in the cluster is watching it.
fn announce(ctx: &Arc<ClusterContext>, path: String) {
    if !ctx.notify.is_watched(&path) {
        return;
    }
    let ctx = ctx.clone();
    tokio::spawn(async move {
        ctx.ask_all_nodes(Command::Notify { path }).await;
    });
}

// --- handlers ---

async fn handle_root(Extension(ctx): Extension<Arc<ClusterContext>>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": 200,
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "nodes": ctx.membership.len(),
        })),
    )
}

async fn handle_get_one(
    Extension(ctx): Extension<Arc<ClusterContext>>,
    Path((collection_id, resource_id)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    if !valid_collection_id(&collection_id) {
        return invalid_collection();
    }
    if !node_available(&ctx) {
        return unavailable();
    }

    let responses = ctx
        .ask_all_nodes(Command::Get {
            collection_id,
            resource_id: Some(resource_id),
            query_json: None,
        })
        .await;

    if has_server_error(&responses) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "unexpected server error"})),
        );
    }

    let documents = merge_documents(&responses);
    match documents.first() {
        Some(document) => (StatusCode::OK, Json(document_value(document))),
        None => (StatusCode::NOT_FOUND, Json(json!({}))),
    }
}

async fn handle_get_all(
    Extension(ctx): Extension<Arc<ClusterContext>>,
    Path(collection_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    if !valid_collection_id(&collection_id) {
        return invalid_collection();
    }
    if !node_available(&ctx) {
        return unavailable();
    }

    let responses = ctx
        .ask_all_nodes(Command::Get {
            collection_id,
            resource_id: None,
            query_json: query_filter(&params),
        })
        .await;

    if has_server_error(&responses) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "unexpected server error"})),
        );
    }

    // Document copies are deduplicated by id before counting; every node
    // holds a full replica, so summing per-node counts would overcount
    if params.contains_key("count") {
        let count = merge_documents(&responses).len();
        return (StatusCode::OK, Json(json!({"documentCount": count})));
    }

    // Every node answering 404 means the collection exists nowhere
    if !any_ok(&responses) {
        return (StatusCode::OK, Json(json!([])));
    }

    let documents: Vec<Value> = merge_documents(&responses)
        .iter()
        .map(document_value)
        .collect();
    (StatusCode::OK, Json(Value::Array(documents)))
}

async fn handle_post(
    Extension(ctx): Extension<Arc<ClusterContext>>,
    Path(collection_id): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !valid_collection_id(&collection_id) {
        return invalid_collection();
    }
    if !node_available(&ctx) {
        return unavailable();
    }

    // Generated here so every node stores the same id
    let resource_id = uuid::Uuid::new_v4().to_string();
    let command = Command::Post {
        collection_id: collection_id.clone(),
        resource_id: resource_id.clone(),
        document_json: body.to_string(),
    };

    let responses = ctx.ask_all_nodes(command.clone()).await;
    let local = match settle_write(&ctx, command, &responses).await {
        Ok(local) => local,
        Err(failure) => return failure,
    };

    announce(&ctx, format!("POST:/{}/{}", collection_id, resource_id));
    announce(&ctx, format!("POST:/{}", collection_id));

    match &local.body {
        ResponseBody::Document(document) => {
            (StatusCode::CREATED, Json(document_value(document)))
        }
        _ => (StatusCode::CREATED, Json(json!({"id": resource_id}))),
    }
}

async fn handle_put_one(
    Extension(ctx): Extension<Arc<ClusterContext>>,
    Path((collection_id, resource_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !valid_collection_id(&collection_id) {
        return invalid_collection();
    }
    if !node_available(&ctx) {
        return unavailable();
    }

    let (lock_id, wait_for_unlock) = lock_options(&headers);
    let command = Command::Put {
        collection_id: collection_id.clone(),
        resource_id: Some(resource_id.clone()),
        query_json: None,
        document_json: body.to_string(),
        lock_id,
        wait_for_unlock,
    };

    let responses = ctx.ask_all_nodes(command.clone()).await;
    if let Err(failure) = settle_write(&ctx, command, &responses).await {
        return failure;
    }

    // Found on any node counts as found, even when the local copy diverged
    if !any_ok(&responses) {
        return (StatusCode::NOT_FOUND, Json(json!({})));
    }

    announce(&ctx, format!("PUT:/{}/{}", collection_id, resource_id));

    (StatusCode::OK, Json(json!({"changes": total_changes(&responses)})))
}

async fn handle_put_all(
    Extension(ctx): Extension<Arc<ClusterContext>>,
    Path(collection_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !valid_collection_id(&collection_id) {
        return invalid_collection();
    }
    if !node_available(&ctx) {
        return unavailable();
    }

    let (lock_id, wait_for_unlock) = lock_options(&headers);
    let command = Command::Put {
        collection_id: collection_id.clone(),
        resource_id: None,
        query_json: query_filter(&params),
        document_json: body.to_string(),
        lock_id,
        wait_for_unlock,
    };

    let responses = ctx.ask_all_nodes(command.clone()).await;
    if let Err(failure) = settle_write(&ctx, command, &responses).await {
        return failure;
    }

    announce(&ctx, format!("PUT:/{}", collection_id));

    (StatusCode::OK, Json(json!({"changes": total_changes(&responses)})))
}

async fn handle_patch_one(
    Extension(ctx): Extension<Arc<ClusterContext>>,
    Path((collection_id, resource_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !valid_collection_id(&collection_id) {
        return invalid_collection();
    }
    if !node_available(&ctx) {
        return unavailable();
    }

    let (lock_id, wait_for_unlock) = lock_options(&headers);
    let command = Command::Patch {
        collection_id: collection_id.clone(),
        resource_id: Some(resource_id.clone()),
        query_json: None,
        document_json: body.to_string(),
        lock_id,
        wait_for_unlock,
    };

    let responses = ctx.ask_all_nodes(command.clone()).await;
    if let Err(failure) = settle_write(&ctx, command, &responses).await {
        return failure;
    }

    if !any_ok(&responses) {
        return (StatusCode::NOT_FOUND, Json(json!({})));
    }

    announce(&ctx, format!("PATCH:/{}/{}", collection_id, resource_id));

    (StatusCode::OK, Json(json!({"changes": total_changes(&responses)})))
}

async fn handle_patch_all(
    Extension(ctx): Extension<Arc<ClusterContext>>,
    Path(collection_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !valid_collection_id(&collection_id) {
        return invalid_collection();
    }
    if !node_available(&ctx) {
        return unavailable();
    }

    let (lock_id, wait_for_unlock) = lock_options(&headers);
    let command = Command::Patch {
        collection_id: collection_id.clone(),
        resource_id: None,
        query_json: query_filter(&params),
        document_json: body.to_string(),
        lock_id,
        wait_for_unlock,
    };

    let responses = ctx.ask_all_nodes(command.clone()).await;
    if let Err(failure) = settle_write(&ctx, command, &responses).await {
        return failure;
    }

    announce(&ctx, format!("PATCH:/{}", collection_id));

    (StatusCode::OK, Json(json!({"changes": total_changes(&responses)})))
}

async fn handle_delete_one(
    Extension(ctx): Extension<Arc<ClusterContext>>,
    Path((collection_id, resource_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !valid_collection_id(&collection_id) {
        return invalid_collection();
    }
    if !node_available(&ctx) {
        return unavailable();
    }

    let (lock_id, wait_for_unlock) = lock_options(&headers);
    let command = Command::Delete {
        collection_id: collection_id.clone(),
        resource_id: Some(resource_id.clone()),
        query_json: None,
        lock_id,
        wait_for_unlock,
    };

    let responses = ctx.ask_all_nodes(command.clone()).await;
    if let Err(failure) = settle_write(&ctx, command, &responses).await {
        return failure;
    }

    if total_changes(&responses) == 0 {
        return (StatusCode::NOT_FOUND, Json(json!({})));
    }

    announce(&ctx, format!("DELETE:/{}/{}", collection_id, resource_id));

    (StatusCode::OK, Json(json!({})))
}

async fn handle_delete_all(
    Extension(ctx): Extension<Arc<ClusterContext>>,
    Path(collection_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !valid_collection_id(&collection_id) {
        return invalid_collection();
    }
    if !node_available(&ctx) {
        return unavailable();
    }

    let (lock_id, wait_for_unlock) = lock_options(&headers);
    let command = Command::Delete {
        collection_id: collection_id.clone(),
        resource_id: None,
        query_json: query_filter(&params),
        lock_id,
        wait_for_unlock,
    };

    let responses = ctx.ask_all_nodes(command.clone()).await;
    if let Err(failure) = settle_write(&ctx, command, &responses).await {
        return failure;
    }

    announce(&ctx, format!("DELETE:/{}", collection_id));

    (StatusCode::OK, Json(json!({"changes": total_changes(&responses)})))
}

/// Acquires a cluster-wide lock over the posted keys. The generated lock id
/// is what the caller passes back in `lock-id` headers and the unlock call.
async fn handle_lock(
    Extension(ctx): Extension<Arc<ClusterContext>>,
    Json(keys): Json<Vec<String>>,
) -> (StatusCode, Json<Value>) {
    let id = uuid::Uuid::new_v4().to_string();

    let responses = ctx
        .ask_all_nodes(Command::Lock {
            id: id.clone(),
            keys,
        })
        .await;

    if responses
        .iter()
        .any(|node| node.response.status != STATUS_OK)
    {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "lock could not be acquired on every node"})),
        );
    }

    (StatusCode::OK, Json(json!({"id": id})))
}

async fn handle_unlock(
    Extension(ctx): Extension<Arc<ClusterContext>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let responses = ctx.ask_all_nodes(Command::Unlock { id }).await;

    if responses
        .iter()
        .any(|node| node.response.status == STATUS_NOT_FOUND)
    {
        return (StatusCode::NOT_FOUND, Json(json!({})));
    }

    if responses
        .iter()
        .any(|node| node.response.status != STATUS_OK)
    {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "unexpected server error"})),
        );
    }

    (StatusCode::OK, Json(json!({})))
}
