//! Router assembly and the serve loop

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{Method, header},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use super::handlers::{
    SharedState, create_entity_handler, create_relation_handler, delete_entity_handler,
    delete_relation_handler, entities_by_type_handler, entity_relations_handler,
    get_entity_handler, health_handler, initialize_handler, latest_entity_handler,
    list_entities_handler, list_relations_handler, memory_handler, root_handler, rpc_handler,
    search_handler,
};
use crate::cli::CancellationToken;
use crate::config::ServerConfig;

/// Build the router.
///
/// Endpoints:
/// - POST   /                              - JSON-RPC envelope
/// - GET    /                              - liveness banner
/// - GET    /health
/// - GET    /memory                        - whole document
/// - GET    /memory/entities?type=&name=
/// - POST   /memory/entities               - upsert
/// - GET    /memory/entities/:name
/// - DELETE /memory/entities/:name
/// - GET    /memory/relations
/// - POST   /memory/relations
/// - DELETE /memory/relations              - body {from, to, relationType?}
/// - GET    /memory/search?query=
/// - GET    /memory/entityType/:type
/// - GET    /memory/entityRelations/:name
/// - GET    /memory/latest
/// - POST   /memory/initialize             - apply the seed set
pub fn create_router(state: SharedState, enable_cors: bool) -> Router {
    let router = Router::new()
        .route("/", get(root_handler).post(rpc_handler))
        .route("/health", get(health_handler))
        .route("/memory", get(memory_handler))
        .route(
            "/memory/entities",
            get(list_entities_handler).post(create_entity_handler),
        )
        .route(
            "/memory/entities/:name",
            get(get_entity_handler).delete(delete_entity_handler),
        )
        .route(
            "/memory/relations",
            get(list_relations_handler)
                .post(create_relation_handler)
                .delete(delete_relation_handler),
        )
        .route("/memory/search", get(search_handler))
        .route("/memory/entityType/:type", get(entities_by_type_handler))
        .route("/memory/entityRelations/:name", get(entity_relations_handler))
        .route("/memory/latest", get(latest_entity_handler))
        .route("/memory/initialize", post(initialize_handler))
        .with_state(state);

    if enable_cors {
        let cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
            .allow_origin(Any);

        router.layer(cors)
    } else {
        router
    }
}

/// Bind `host:port` and serve until `shutdown` fires
pub async fn serve(config: &ServerConfig, state: SharedState, shutdown: CancellationToken) -> Result<()> {
    let addr = config.address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    tracing::info!(address = %addr, "Memory server listening");
    serve_on(listener, create_router(state, config.cors), shutdown).await
}

/// Serve on an already-bound listener
pub async fn serve_on(
    listener: TcpListener,
    router: Router,
    mut shutdown: CancellationToken,
) -> Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("memory server failed")?;

    tracing::info!("Memory server stopped");
    Ok(())
}
