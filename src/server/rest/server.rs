use anyhow::{Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::docker::{
    ContainerLifecycleManager, DockerClient, DockerConfig, HttpReadinessWaiter, TracingEvents,
};
use crate::server::rest::create_router;
use crate::shared::config::{BrowsersConfig, ServerConfig};
use crate::shared::models::AppState;

pub async fn run_rest_server(config: ServerConfig) -> Result<()> {
    info!("Starting browserd {} (PID {})", env!("CARGO_PKG_VERSION"), std::process::id());

    let browsers = BrowsersConfig::load(&config.browsers_path)
        .with_context(|| format!("Failed to load {}", config.browsers_path.display()))?;
    if browsers.is_empty() {
        warn!("No browsers configured in {}", config.browsers_path.display());
    }
    info!("Loaded {} browsers from {}", browsers.len(), config.browsers_path.display());

    info!("Connecting to Docker daemon...");
    let docker = match DockerClient::new(DockerConfig {
        socket_path: config.docker_socket.clone(),
    })
    .await
    {
        Ok(docker) => docker,
        Err(e) => {
            error!("Failed to connect to Docker: {:#}", e);
            error!("Please ensure Docker is running and the socket is accessible");
            return Err(e);
        }
    };

    let readiness = HttpReadinessWaiter::new(config.readiness.poll_interval)?;
    let manager = ContainerLifecycleManager::new(
        Arc::new(docker),
        Arc::new(readiness),
        Arc::new(TracingEvents),
        config.readiness.startup_timeout,
    );

    if config.sweep_on_start {
        match manager.sweep_orphans().await {
            Ok(0) => {}
            Ok(removed) => info!("Removed {} containers left over from a previous run", removed),
            Err(e) => warn!("Failed to sweep leftover containers: {:#}", e),
        }
    }

    let state = Arc::new(AppState::new(manager, browsers));
    let app = create_router(state.clone());

    let bind_addr = format!("{}:{}", config.host, config.port);
    info!("Binding to: {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;

    info!("Session endpoint: http://{}/session", bind_addr);
    info!("Ready to accept requests...");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    close_all_sessions(&state).await;

    result?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down browserd...");
}

/// Tears down every session still registered.
pub async fn close_all_sessions(state: &AppState) {
    if state.sessions.is_empty() {
        return;
    }
    let sessions = state.sessions.drain();

    info!("Tearing down {} active sessions", sessions.len());
    join_all(sessions.into_iter().map(|s| s.into_teardown().run())).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::testing::{CountingReadiness, FakeRuntime, RecordingEvents};
    use crate::docker::ServiceSpec;
    use crate::shared::models::ActiveSession;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_close_all_sessions_tears_everything_down() {
        let runtime = FakeRuntime::with_bindings(vec![("127.0.0.1", "32768")]);
        let manager = ContainerLifecycleManager::new(
            Arc::new(runtime.clone()),
            Arc::new(CountingReadiness::ready()),
            Arc::new(RecordingEvents::default()),
            Duration::from_secs(10),
        );
        let session = manager
            .start_session(
                &ServiceSpec::new("browser:1.0", "4444", "/wd/hub"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let state = AppState::new(manager, BrowsersConfig::default());
        state.sessions.insert(ActiveSession::new(
            session,
            "firefox".to_string(),
            "48.0".to_string(),
        ));
        assert_eq!(state.sessions.len(), 1);

        close_all_sessions(&state).await;

        assert!(state.sessions.is_empty());
        assert_eq!(runtime.removed(), vec![FakeRuntime::CONTAINER_ID.to_string()]);
    }
}
