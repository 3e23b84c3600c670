use axum::{
    extract::Request,
    http::{header, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cancelled when the client goes away before its response is ready.
#[derive(Debug, Clone)]
pub struct ClientDisconnect {
    token: CancellationToken,
}

impl ClientDisconnect {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_disconnected(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Gives the request a `ClientDisconnect`. hyper drops the handler future when
/// the connection closes; the drop guard turns that into a cancellation.
pub async fn track_client_disconnect(mut request: Request, next: Next) -> Response {
    let token = CancellationToken::new();
    request.extensions_mut().insert(ClientDisconnect {
        token: token.clone(),
    });

    let guard = token.drop_guard();
    let response = next.run(request).await;
    guard.disarm();

    response
}

/// Rejects requests that arrive without a way to learn about client
/// disconnects.
pub async fn require_disconnect_notifier(request: Request, next: Next) -> Response {
    if request.extensions().get::<ClientDisconnect>().is_none() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "unable to handle client close notifications",
        )
            .into_response();
    }

    next.run(request).await
}

pub async fn require_post(request: Request, next: Next) -> Response {
    if request.method() != Method::POST {
        debug!(method = %request.method(), path = %request.uri().path(), "Rejected non-POST request");
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "POST")],
            "Method not allowed",
        )
            .into_response();
    }

    next.run(request).await
}
