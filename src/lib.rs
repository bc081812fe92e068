//! LAN exam-room coordinator: a session registry kept in sync with remote
//! viewers through a websocket broadcast hub.

pub mod api;
pub mod config;
pub mod error;
pub mod hub;
pub mod persistence;
pub mod scan;
pub mod session;

use std::sync::Arc;

pub use api::AppState;
use config::Config;
use error::Result;
use hub::Hub;
use persistence::SessionStore;
use scan::ProcessScanner;
use session::SessionRegistry;

/// Starts the hub and restores the registry from `store`
pub async fn build_state(config: &Config, store: Arc<dyn SessionStore>) -> Result<AppState> {
    let hub = Hub::spawn();
    let registry = SessionRegistry::load(store, hub.clone()).await?;

    Ok(AppState {
        registry,
        hub,
        scanner: Arc::new(ProcessScanner::new(config.scan.forbidden_apps.clone())),
        viewer: config.viewer.clone(),
    })
}
