mod handlers;
mod routes;
mod viewer;

use std::sync::Arc;

use crate::config::ViewerConfig;
use crate::hub::HubHandle;
use crate::scan::ProcessScanner;
use crate::session::SessionRegistry;

pub use handlers::{CreateSessionRequest, SecretRequest, StatusRequest, UpdateSessionRequest};
pub use routes::routes;

/// Everything a request handler or viewer connection needs
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub hub: HubHandle,
    pub scanner: Arc<ProcessScanner>,
    pub viewer: ViewerConfig,
}
