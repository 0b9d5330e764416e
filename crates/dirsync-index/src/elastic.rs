//! Elasticsearch-compatible bulk client.
//!
//! Documents are written with the `_bulk` endpoint as NDJSON `index` and
//! `delete` actions. Several kinds can share one index: the stored `_id` is
//! `{doc_kind}#{id}`, and the kind is also kept in a keyword field
//! (`doc_kind` by default) that the scroll search listing a kind's
//! identifiers filters on. Callers only ever see the plain identifier.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use dirsync_core::{
    DocumentIndex, IndexTarget, ItemResult, ItemStatus, MappedDocument, SyncResult,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{IndexError, IndexResult};

/// Default name of the field holding the document kind.
pub const DEFAULT_KIND_FIELD: &str = "doc_kind";

const SCROLL_KEEP_ALIVE: &str = "1m";

const KIND_SEPARATOR: char = '#';

/// Identifier under which a document of `target` is stored.
fn stored_id(target: &IndexTarget, id: &str) -> String {
    format!("{}{KIND_SEPARATOR}{id}", target.doc_kind)
}

/// Plain identifier of a stored document, if it belongs to `target`.
fn document_id<'a>(target: &IndexTarget, stored: &'a str) -> Option<&'a str> {
    stored
        .strip_prefix(target.doc_kind.as_str())?
        .strip_prefix(KIND_SEPARATOR)
}

/// Elasticsearch client settings.
#[derive(Debug, Clone)]
pub struct ElasticConfig {
    /// Base URL, e.g. `http://localhost:9200`.
    pub base_url: String,
    /// Field holding the document kind.
    pub kind_field: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Hits per scroll page when listing identifiers.
    pub scroll_size: usize,
    /// Refresh the index after each bulk request.
    pub refresh: bool,
}

impl ElasticConfig {
    /// Creates settings with defaults for everything but the URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            kind_field: DEFAULT_KIND_FIELD.to_string(),
            timeout: Duration::from_secs(30),
            scroll_size: 1000,
            refresh: false,
        }
    }

    /// Sets the kind field.
    #[must_use]
    pub fn with_kind_field(mut self, field: impl Into<String>) -> Self {
        self.kind_field = field.into();
        self
    }
}

/// Document index backed by an Elasticsearch-compatible HTTP API.
pub struct ElasticIndex {
    client: reqwest::Client,
    base_url: String,
    kind_field: String,
    scroll_size: usize,
    refresh: bool,
    prepared: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for ElasticIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticIndex")
            .field("base_url", &self.base_url)
            .field("kind_field", &self.kind_field)
            .finish_non_exhaustive()
    }
}

impl ElasticIndex {
    /// Creates a client.
    pub fn new(config: ElasticConfig) -> IndexResult<Self> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(IndexError::config(format!(
                "index URL must start with http:// or https://: '{base_url}'"
            )));
        }
        if config.kind_field.trim().is_empty() || config.kind_field.starts_with('_') {
            return Err(IndexError::config(format!(
                "invalid kind field '{}'",
                config.kind_field
            )));
        }
        if config.scroll_size == 0 {
            return Err(IndexError::config("scroll_size must be greater than zero"));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IndexError::config(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            kind_field: config.kind_field,
            scroll_size: config.scroll_size,
            refresh: config.refresh,
            prepared: Mutex::new(HashSet::new()),
        })
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates the index with a keyword mapping for the kind field, once
    /// per index and process. An existing index is left untouched.
    async fn ensure_index(&self, index: &str) -> IndexResult<()> {
        if self.prepared.lock().contains(index) {
            return Ok(());
        }

        let url = format!("{}/{}", self.base_url, index);
        let body = json!({
            "mappings": { "properties": { (self.kind_field.as_str()): { "type": "keyword" } } }
        });
        let response = self.client.put(&url).json(&body).send().await?;
        let status = response.status();

        if status.is_success() {
            tracing::info!(index, "Created index");
        } else if status.as_u16() == 400 {
            let text = response.text().await.unwrap_or_default();
            if !text.contains("resource_already_exists_exception") {
                return Err(IndexError::Http {
                    status: 400,
                    message: text,
                });
            }
        } else {
            return Err(error_from(response).await);
        }

        self.prepared.lock().insert(index.to_string());
        Ok(())
    }

    async fn send_bulk(&self, body: String) -> IndexResult<BulkResponse> {
        let mut url = format!("{}/_bulk", self.base_url);
        if self.refresh {
            url.push_str("?refresh=true");
        }
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from(response).await);
        }
        Ok(response.json::<BulkResponse>().await?)
    }

    async fn list_ids(&self, target: &IndexTarget) -> IndexResult<HashSet<String>> {
        let url = format!(
            "{}/{}/_search?scroll={SCROLL_KEEP_ALIVE}",
            self.base_url, target.index
        );
        let body = json!({
            "size": self.scroll_size,
            "_source": false,
            "sort": ["_doc"],
            "query": { "term": { (self.kind_field.as_str()): target.doc_kind } }
        });
        let response = self.client.post(&url).json(&body).send().await?;
        if response.status().as_u16() == 404 {
            return Ok(HashSet::new());
        }
        if !response.status().is_success() {
            return Err(error_from(response).await);
        }

        let mut page: ScrollResponse = response.json().await?;
        let mut ids = HashSet::new();
        let scroll_url = format!("{}/_search/scroll", self.base_url);

        loop {
            if page.hits.hits.is_empty() {
                break;
            }
            ids.extend(
                page.hits
                    .hits
                    .iter()
                    .filter_map(|hit| document_id(target, &hit.id))
                    .map(str::to_string),
            );

            let Some(scroll_id) = page.scroll_id.clone() else {
                break;
            };
            let response = self
                .client
                .post(&scroll_url)
                .json(&json!({ "scroll": SCROLL_KEEP_ALIVE, "scroll_id": scroll_id }))
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(error_from(response).await);
            }
            page = response.json().await?;
        }

        if let Some(scroll_id) = page.scroll_id {
            // Best effort; the scroll expires on its own.
            let _ = self
                .client
                .delete(&scroll_url)
                .json(&json!({ "scroll_id": [scroll_id] }))
                .send()
                .await;
        }

        Ok(ids)
    }
}

async fn error_from(response: reqwest::Response) -> IndexError {
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    IndexError::Http { status, message }
}

// ============================================================================
// Wire format
// ============================================================================

/// Builds the NDJSON body for indexing documents.
pub(crate) fn upsert_body(
    target: &IndexTarget,
    kind_field: &str,
    documents: &[MappedDocument],
) -> IndexResult<String> {
    let mut body = String::new();
    for document in documents {
        let action = json!({
            "index": { "_index": target.index, "_id": stored_id(target, &document.id) }
        });
        let mut source = document.to_json();
        if let Value::Object(map) = &mut source {
            map.insert(kind_field.to_string(), Value::String(target.doc_kind.clone()));
        }
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&source)?);
        body.push('\n');
    }
    Ok(body)
}

/// Builds the NDJSON body for deleting documents.
pub(crate) fn delete_body(target: &IndexTarget, ids: &[String]) -> IndexResult<String> {
    let mut body = String::new();
    for id in ids {
        let action = json!({ "delete": { "_index": target.index, "_id": stored_id(target, id) } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
    }
    Ok(body)
}

#[derive(Debug, Deserialize)]
pub(crate) struct BulkResponse {
    #[serde(default)]
    items: Vec<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(default)]
    status: u16,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ScrollResponse {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    hits: ScrollHits,
}

#[derive(Debug, Deserialize)]
struct ScrollHits {
    #[serde(default)]
    hits: Vec<ScrollHit>,
}

#[derive(Debug, Deserialize)]
struct ScrollHit {
    #[serde(rename = "_id")]
    id: String,
}

/// Maps bulk response items onto per-item results, in request order. Items
/// are reported under the requested (plain) identifiers.
pub(crate) fn item_results(response: BulkResponse, requested: &[&str]) -> Vec<ItemResult> {
    response
        .items
        .into_iter()
        .zip(requested)
        .map(|(mut wrapper, requested_id)| {
            let item = wrapper
                .values_mut()
                .next()
                .map(Value::take)
                .and_then(|v| serde_json::from_value::<BulkItem>(v).ok());

            let id = (*requested_id).to_string();
            let Some(item) = item else {
                return ItemResult::failed(id, "malformed bulk item");
            };

            if let Some(error) = item.error {
                let reason = error
                    .get("reason")
                    .and_then(Value::as_str)
                    .map_or_else(|| error.to_string(), str::to_string);
                return ItemResult::failed(id, reason);
            }

            let status = match item.result.as_deref() {
                Some("created") => ItemStatus::Created,
                Some("updated") => ItemStatus::Updated,
                Some("noop") => ItemStatus::Unchanged,
                Some("deleted") => ItemStatus::Deleted,
                Some("not_found") => ItemStatus::NotFound,
                _ if item.status == 404 => ItemStatus::NotFound,
                other => ItemStatus::Failed(format!(
                    "unexpected bulk result {other:?} (HTTP {})",
                    item.status
                )),
            };
            ItemResult::new(id, status)
        })
        .collect()
}

#[async_trait]
impl DocumentIndex for ElasticIndex {
    async fn bulk_upsert(
        &self,
        target: &IndexTarget,
        documents: &[MappedDocument],
    ) -> SyncResult<Vec<ItemResult>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_index(&target.index).await?;

        let body = upsert_body(target, &self.kind_field, documents)?;
        let response = self.send_bulk(body).await?;
        let ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();

        tracing::debug!(
            index = %target.index,
            doc_kind = %target.doc_kind,
            count = documents.len(),
            "Bulk upsert sent"
        );
        Ok(item_results(response, &ids))
    }

    async fn bulk_delete(
        &self,
        target: &IndexTarget,
        ids: &[String],
    ) -> SyncResult<Vec<ItemResult>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let body = delete_body(target, ids)?;
        let response = self.send_bulk(body).await?;
        let requested: Vec<&str> = ids.iter().map(String::as_str).collect();

        tracing::debug!(
            index = %target.index,
            doc_kind = %target.doc_kind,
            count = ids.len(),
            "Bulk delete sent"
        );
        Ok(item_results(response, &requested))
    }

    async fn list_document_ids(&self, target: &IndexTarget) -> SyncResult<HashSet<String>> {
        Ok(self.list_ids(target).await?)
    }
}
