//! HTTP handlers for the JSON-RPC endpoint and the REST routes

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::dispatch::handle_request;
use super::types::{RelationInput, RpcRequest, RpcResponse};
use crate::memory::{
    Entity, EntityInput, MemoryStore, Relation, RelationOutcome, SeedSet, StoreError,
};

/// Shared across handlers. The mutex is the single writer: each request
/// holds it through mutate + file rewrite.
pub struct AppState {
    pub store: Arc<Mutex<MemoryStore>>,
    pub seed: SeedSet,
}

impl AppState {
    pub fn new(store: Arc<Mutex<MemoryStore>>, seed: SeedSet) -> Self {
        Self { store, seed }
    }
}

pub type SharedState = Arc<AppState>;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// `GET /memory/entities` filters; empty values are ignored
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityFilter {
    #[serde(default, rename = "type")]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: Option<String>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
        error_response(status, self.to_string())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

// ============================================================================
// JSON-RPC
// ============================================================================

/// `POST /`
pub async fn rpc_handler(State(state): State<SharedState>, body: Bytes) -> Response {
    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "Unparsable RPC body");
            return (
                StatusCode::BAD_REQUEST,
                Json(RpcResponse::failure(Value::Null, "Parse error")),
            )
                .into_response();
        }
    };

    let mut store = state.store.lock().await;
    Json(handle_request(&mut store, request)).into_response()
}

/// `GET /`
pub async fn root_handler() -> &'static str {
    "Memory server running"
}

/// `GET /health`
pub async fn health_handler() -> &'static str {
    "OK"
}

// ============================================================================
// Entities
// ============================================================================

pub async fn list_entities_handler(
    State(state): State<SharedState>,
    Query(filter): Query<EntityFilter>,
) -> Json<Vec<Entity>> {
    let store = state.store.lock().await;
    let kind = non_empty(&filter.entity_type);
    let name = non_empty(&filter.name);

    let entities = store
        .entities()
        .filter(|e| kind.is_none_or(|k| e.entity_type == k))
        .filter(|e| name.is_none_or(|n| e.name == n))
        .cloned()
        .collect();
    Json(entities)
}

pub async fn get_entity_handler(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Response {
    let store = state.store.lock().await;
    match store.get_entity(&name) {
        Some(entity) => Json(entity.clone()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Entity not found"),
    }
}

pub async fn create_entity_handler(
    State(state): State<SharedState>,
    Json(input): Json<EntityInput>,
) -> Response {
    let mut store = state.store.lock().await;
    match store.upsert_entity(
        input.name().unwrap_or_default(),
        input.entity_type(),
        input.observations.iter().cloned(),
    ) {
        Ok(entity) => (StatusCode::CREATED, Json(entity)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn delete_entity_handler(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Response {
    let mut store = state.store.lock().await;
    if store.delete_entity(&name).is_deleted() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, "Entity not found")
    }
}

pub async fn latest_entity_handler(State(state): State<SharedState>) -> Response {
    let store = state.store.lock().await;
    match store.latest_entity() {
        Some(entity) => Json(entity.clone()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No entities found"),
    }
}

pub async fn search_handler(
    State(state): State<SharedState>,
    Query(params): Query<SearchQuery>,
) -> Response {
    let Some(query) = non_empty(&params.query) else {
        return error_response(StatusCode::BAD_REQUEST, "Query parameter is required");
    };

    let store = state.store.lock().await;
    let results: Vec<Entity> = store.search_entities(query).into_iter().cloned().collect();
    Json(results).into_response()
}

pub async fn entities_by_type_handler(
    State(state): State<SharedState>,
    Path(entity_type): Path<String>,
) -> Json<Vec<Entity>> {
    let store = state.store.lock().await;
    Json(
        store
            .entities_by_type(&entity_type)
            .into_iter()
            .cloned()
            .collect(),
    )
}

// ============================================================================
// Relations
// ============================================================================

pub async fn list_relations_handler(State(state): State<SharedState>) -> Json<Vec<Relation>> {
    let store = state.store.lock().await;
    Json(store.relations().to_vec())
}

pub async fn create_relation_handler(
    State(state): State<SharedState>,
    Json(input): Json<RelationInput>,
) -> Response {
    let mut store = state.store.lock().await;
    match store.create_relation(input.from_name(), input.to_name(), input.relation_type()) {
        Ok(RelationOutcome::Created(relation)) => {
            (StatusCode::CREATED, Json(relation)).into_response()
        }
        Ok(RelationOutcome::AlreadyExists) => {
            error_response(StatusCode::CONFLICT, "Relation already exists")
        }
        Err(e) => e.into_response(),
    }
}

pub async fn delete_relation_handler(
    State(state): State<SharedState>,
    Json(input): Json<RelationInput>,
) -> Response {
    let mut store = state.store.lock().await;
    let kind = non_empty(&input.relation_type);
    match store.delete_relation(input.from_name(), input.to_name(), kind) {
        Ok(outcome) if outcome.is_deleted() => StatusCode::NO_CONTENT.into_response(),
        Ok(_) => error_response(StatusCode::NOT_FOUND, "Relation not found"),
        Err(e) => e.into_response(),
    }
}

pub async fn entity_relations_handler(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Json<Vec<Relation>> {
    let store = state.store.lock().await;
    Json(
        store
            .relations_for_entity(&name)
            .into_iter()
            .cloned()
            .collect(),
    )
}

// ============================================================================
// Whole memory
// ============================================================================

/// `POST /memory/initialize` - apply the configured seed
pub async fn initialize_handler(State(state): State<SharedState>) -> Response {
    let mut store = state.store.lock().await;
    match state.seed.apply(&mut store) {
        Ok(report) => Json(json!({
            "message": "Memory initialized successfully",
            "entities": report.entities,
            "relationsCreated": report.relations_created,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Memory initialization failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// `GET /memory`
pub async fn memory_handler(State(state): State<SharedState>) -> Response {
    let store = state.store.lock().await;
    Json(store.document().clone()).into_response()
}
