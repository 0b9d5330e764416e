//! Application state shared by the request handlers.

use std::sync::Arc;

use dirsync_engine::SourceRegistry;

use crate::config::ServerConfig;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: ServerConfig,

    /// Registered sources.
    pub registry: Arc<SourceRegistry>,
}

impl AppState {
    /// Creates a new application state.
    #[must_use]
    pub fn new(config: ServerConfig, registry: Arc<SourceRegistry>) -> Self {
        Self { config, registry }
    }

    /// Returns the source registry.
    #[must_use]
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }
}
