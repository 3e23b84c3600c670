use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::docker::SessionError;
use crate::server::rest::error::{ApiError, ApiResult};
use crate::server::rest::middleware::ClientDisconnect;
use crate::shared::models::{ActiveSession, AppState, CreateSessionRequest, SessionResponse};

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub total: usize,
    pub sessions: Vec<SessionResponse>,
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Extension(disconnect): Extension<ClientDisconnect>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    if request.browser.trim().is_empty() {
        return Err(ApiError::BadRequest("browser must not be empty".to_string()));
    }

    let (version, spec) = state
        .browsers
        .find(&request.browser, request.version.as_deref())
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "No image for browser '{}' version '{}'",
                request.browser,
                request.version.as_deref().unwrap_or("default")
            ))
        })?;
    let version = version.to_string();
    let spec = spec.clone();
    let browser = request.browser;

    info!("Starting {} {} session", browser, version);

    // Runs to completion even if this handler is dropped, so a half-built
    // container is always torn down.
    let task_state = state.clone();
    let task = tokio::spawn(async move {
        match task_state.manager.start_session(&spec, &disconnect.token()).await {
            Ok(session) if disconnect.is_disconnected() => {
                info!("Client went away, discarding session {}", session.container_id());
                session.close().await;
                Err(SessionError::Cancelled)
            }
            Ok(session) => Ok(task_state
                .sessions
                .insert(ActiveSession::new(session, browser, version))),
            Err(e) => {
                let (error, teardown) = e.into_parts();
                warn!("Failed to start {} session: {}", spec.image, error);
                if let Some(teardown) = teardown {
                    teardown.run().await;
                }
                Err(error)
            }
        }
    });

    let response = task
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Session start task failed: {}", e)))??;

    info!("Session {} ready at {}", response.id, response.url);
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let session = state
        .sessions
        .remove(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Session {} not found", id)))?;

    info!("Deleting session {}", id);
    tokio::spawn(session.into_teardown().run())
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Teardown task failed: {}", e)))?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let sessions = state.sessions.list();
    Json(StatusResponse {
        total: sessions.len(),
        sessions,
    })
}
