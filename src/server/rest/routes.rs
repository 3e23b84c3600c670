use axum::{
    extract::State,
    middleware,
    routing::{any, delete, get},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::server::rest::{
    handlers,
    logging_middleware::request_logging_middleware,
    middleware::{require_disconnect_notifier, require_post, track_client_disconnect},
};
use crate::shared::models::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Any method is routed here so the guard, not the router, answers 405
    let session_create = Router::new()
        .route("/session", any(handlers::sessions::create_session))
        .route_layer(middleware::from_fn(require_post))
        .route_layer(middleware::from_fn(require_disconnect_notifier));

    Router::new()
        .route("/health", get(health))
        .route("/status", get(handlers::sessions::status))
        .route("/session/{id}", delete(handlers::sessions::delete_session))
        .merge(session_create)
        .with_state(state)
        .layer(middleware::from_fn(track_client_disconnect))
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.sessions.len(),
    }))
}
