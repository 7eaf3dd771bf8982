use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::GenerativeModel;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Default: `GeminiClient`. Tests swap in a scripted model.
    pub llm: Arc<dyn GenerativeModel>,
    pub config: Config,
}
