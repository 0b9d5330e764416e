//! # dirsync-server
//!
//! Process wiring for the directory synchronization engine.
//!
//! The server:
//! - Builds the index collaborator (Elasticsearch-compatible HTTP or in-memory)
//! - Registers the sources from the sources file and starts their schedulers
//! - Serves the management API
//! - Stops every scheduler gracefully on SIGINT/SIGTERM
//!
//! ## Usage
//!
//! ```ignore
//! use dirsync_server::{Server, ServerConfig};
//!
//! let config = ServerConfig::from_env()?;
//! let server = Server::new(config)?;
//! server.run().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod router;
pub mod state;

pub use config::ServerConfig;
pub use error::{ApiError, ApiResult};
pub use router::create_router;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use dirsync_core::DocumentIndex;
use dirsync_engine::{SourceRegistry, SyncEngine};
use dirsync_index::{ElasticConfig, ElasticIndex, MemoryIndex};
use dirsync_ldap::LdapConnector;
use tokio::net::TcpListener;

/// The synchronization server.
pub struct Server {
    config: ServerConfig,
    registry: Arc<SourceRegistry>,
}

impl Server {
    /// Creates a server and starts the configured sources.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let index: Arc<dyn DocumentIndex> = match &config.index_url {
            Some(url) => {
                let index = ElasticIndex::new(
                    ElasticConfig::new(url).with_kind_field(&config.index_kind_field),
                )?;
                tracing::info!(url = %url, kind_field = %config.index_kind_field, "Using HTTP index");
                Arc::new(index)
            }
            None => {
                tracing::warn!("DIRSYNC_INDEX_URL not set; documents are kept in memory");
                Arc::new(MemoryIndex::new())
            }
        };

        let engine = SyncEngine::new(Arc::new(LdapConnector::new()), index);
        let registry = Arc::new(SourceRegistry::new(Arc::new(engine)));

        for source in config.load_sources()? {
            registry.add(source)?;
        }
        tracing::info!(sources = registry.len(), "Sources registered");

        Ok(Self { config, registry })
    }

    /// Runs the server until a shutdown signal arrives, then stops every
    /// source scheduler.
    pub async fn run(self) -> anyhow::Result<()> {
        let state = AppState::new(self.config.clone(), self.registry.clone());
        let app = create_router(state);

        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Management API listening on http://{}", addr);

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        self.registry.shutdown().await;
        served?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Returns the source registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Returns the server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Creates a router without starting the server.
    pub fn test_router(&self) -> Router {
        create_router(AppState::new(self.config.clone(), self.registry.clone()))
    }
}

/// Waits for a shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
