use std::sync::Arc;

use crate::docker::ContainerLifecycleManager;
use crate::shared::config::BrowsersConfig;

pub mod session;

pub use session::{ActiveSession, CreateSessionRequest, SessionRegistry, SessionResponse};

// Application state
#[derive(Clone)]
pub struct AppState {
    pub manager: ContainerLifecycleManager,
    pub browsers: Arc<BrowsersConfig>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(manager: ContainerLifecycleManager, browsers: BrowsersConfig) -> Self {
        Self {
            manager,
            browsers: Arc::new(browsers),
            sessions: Arc::new(SessionRegistry::default()),
        }
    }
}
