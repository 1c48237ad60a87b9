use crate::config::{MappingSource, Settings};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    // Enumerated per request so the status page reflects live configuration
    pub mappings: Arc<dyn MappingSource>,
}

impl AppState {
    pub fn new(settings: Arc<Settings>, mappings: Arc<dyn MappingSource>) -> Self {
        Self { settings, mappings }
    }
}
