//! Shared application state.

use crate::config::Config;
use parley_core::{ScenarioCatalog, SessionManager};
use std::sync::Arc;

pub struct AppState {
    pub session_manager: Arc<SessionManager>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let catalog = ScenarioCatalog::new(
            config.scenarios_dir.clone(),
            config.catalog.clone(),
            config.strictness(),
        );
        let session_manager = Arc::new(SessionManager::new(catalog, config.event_capacity));

        Self {
            session_manager,
            config,
        }
    }
}
