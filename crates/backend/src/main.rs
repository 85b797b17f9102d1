mod config;
mod graphql;
mod progress;
mod route_service;
mod storage;

use std::sync::Arc;

use async_graphql_axum::{GraphQLRequest, GraphQLResponse, GraphQLSubscription};
use axum::{extract::State, response::Html, routing::get, Json, Router};
use georoute_shared::session::MissionSession;
use tokio::sync::Mutex;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use config::ServerConfig;
use graphql::Schema;
use progress::ProgressHub;
use route_service::{HttpRouteService, RouteService};

async fn graphql_handler(State(schema): State<Schema>, req: GraphQLRequest) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}

async fn graphiql() -> Html<String> {
    Html(
        async_graphql::http::GraphiQLSource::build()
            .endpoint("/graphql")
            .subscription_endpoint("/graphql/ws")
            .finish(),
    )
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the full application router.
fn build_app(schema: Schema) -> Router {
    Router::new()
        .route("/graphql", get(graphiql).post(graphql_handler))
        .route_service("/graphql/ws", GraphQLSubscription::new(schema.clone()))
        .route("/health", get(health))
        .with_state(schema)
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create database directory: {}", e))?;
    }
    let storage = storage::Storage::open(&config.db_path, config.backlog_max_entries)?;

    let session = Arc::new(Mutex::new(MissionSession::new(config.session_settings())));
    let service: Arc<dyn RouteService> =
        Arc::new(HttpRouteService::new(config.route_service_url.clone()));
    let schema = graphql::build_schema(session, storage, service, ProgressHub::new());
    let app = build_app(schema);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(
        port = config.port,
        route_service = %config.route_service_url,
        region = %config.geofence.name,
        min_zoom = ?config.min_zoom,
        "server running; GraphiQL at /graphql"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", addr, e))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("Server error: {}", e))
}
