//! Server configuration.
//!
//! Server settings are loaded from environment variables (and `.env`) with
//! defaults. Directory sources come from an optional TOML file of
//! `[[source]]` tables.

use std::path::{Path, PathBuf};

use anyhow::Context;
use dirsync_core::{SourceConfig, SourceDefinition};
use dirsync_index::DEFAULT_KIND_FIELD;
use serde::Deserialize;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind the management API to.
    pub host: String,

    /// Management API port.
    pub port: u16,

    /// TOML file with `[[source]]` definitions.
    pub sources_file: Option<PathBuf>,

    /// Elasticsearch-compatible base URL; `None` uses the in-memory index.
    pub index_url: Option<String>,

    /// Field that stores the document kind in the index.
    pub index_kind_field: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Log filter directive.
    pub log_level: String,
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let host = std::env::var("DIRSYNC_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match std::env::var("DIRSYNC_PORT") {
            Ok(p) => p
                .parse()
                .with_context(|| format!("DIRSYNC_PORT is not a valid port: {p}"))?,
            Err(_) => 8088,
        };

        let sources_file = std::env::var("DIRSYNC_SOURCES_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let index_url = std::env::var("DIRSYNC_INDEX_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let index_kind_field = std::env::var("DIRSYNC_INDEX_KIND_FIELD")
            .unwrap_or_else(|_| DEFAULT_KIND_FIELD.to_string());

        let cors_origins = std::env::var("DIRSYNC_CORS_ORIGINS")
            .map(|s| s.split(',').map(str::trim).map(String::from).collect())
            .unwrap_or_else(|_| vec!["*".to_string()]);

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            host,
            port,
            sources_file,
            index_url,
            index_kind_field,
            cors_origins,
            log_level,
        })
    }

    /// Loads and validates the sources file, if configured.
    pub fn load_sources(&self) -> anyhow::Result<Vec<SourceConfig>> {
        match &self.sources_file {
            Some(path) => read_sources(path),
            None => Ok(Vec::new()),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8088,
            sources_file: None,
            index_url: None,
            index_kind_field: DEFAULT_KIND_FIELD.to_string(),
            cors_origins: vec!["*".to_string()],
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SourcesFile {
    #[serde(default, rename = "source")]
    sources: Vec<SourceDefinition>,
}

fn read_sources(path: &Path) -> anyhow::Result<Vec<SourceConfig>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read sources file {}", path.display()))?;
    parse_sources(&text).with_context(|| format!("invalid sources file {}", path.display()))
}

/// Parses `[[source]]` tables into validated configurations.
pub fn parse_sources(text: &str) -> anyhow::Result<Vec<SourceConfig>> {
    let file: SourcesFile = toml::from_str(text)?;
    file.sources
        .into_iter()
        .map(|definition| {
            let id = definition.id.clone();
            definition
                .into_config()
                .with_context(|| format!("source '{id}'"))
        })
        .collect()
}
