//! In-memory document index.
//!
//! Keeps documents per [`IndexTarget`] in process memory. Besides the
//! [`DocumentIndex`] contract it offers a few read helpers (`count`, `get`,
//! `match_field`, `query_string`) with full-text style token matching, so
//! synchronized data can be inspected the way it would be searched.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use dirsync_core::{
    DocumentIndex, FieldValue, IndexTarget, ItemResult, ItemStatus, MappedDocument, SyncResult,
    ID_FIELD,
};
use parking_lot::RwLock;

type Fields = BTreeMap<String, FieldValue>;

/// Process-local document index.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    targets: RwLock<HashMap<IndexTarget, BTreeMap<String, Fields>>>,
}

impl MemoryIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts the documents stored for a target.
    #[must_use]
    pub fn count(&self, target: &IndexTarget) -> usize {
        self.targets.read().get(target).map_or(0, BTreeMap::len)
    }

    /// Gets a document's fields by identifier.
    #[must_use]
    pub fn get(&self, target: &IndexTarget, id: &str) -> Option<Fields> {
        self.targets.read().get(target)?.get(id).cloned()
    }

    /// Returns the identifiers stored for a target, sorted.
    #[must_use]
    pub fn ids(&self, target: &IndexTarget) -> Vec<String> {
        self.targets
            .read()
            .get(target)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Finds documents whose `field` shares a token with `query`.
    ///
    /// Tokens are lowercased alphanumeric runs, so `"clint"` matches
    /// `"Clint Eastwood"`. The field [`ID_FIELD`] matches the identifier.
    #[must_use]
    pub fn match_field(&self, target: &IndexTarget, field: &str, query: &str) -> Vec<String> {
        let wanted = tokens(query);
        if wanted.is_empty() {
            return Vec::new();
        }

        let guard = self.targets.read();
        let Some(docs) = guard.get(target) else {
            return Vec::new();
        };

        docs.iter()
            .filter(|(id, fields)| {
                if field == ID_FIELD {
                    return id.eq_ignore_ascii_case(query.trim());
                }
                fields
                    .get(field)
                    .is_some_and(|value| value.iter().any(|v| shares_token(v, &wanted)))
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Finds documents where any field shares a token with `query`.
    #[must_use]
    pub fn query_string(&self, target: &IndexTarget, query: &str) -> Vec<String> {
        let wanted = tokens(query);
        if wanted.is_empty() {
            return Vec::new();
        }

        let guard = self.targets.read();
        let Some(docs) = guard.get(target) else {
            return Vec::new();
        };

        docs.iter()
            .filter(|(_, fields)| {
                fields
                    .values()
                    .any(|value| value.iter().any(|v| shares_token(v, &wanted)))
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Removes every document of a target.
    pub fn clear(&self, target: &IndexTarget) {
        self.targets.write().remove(target);
    }

    /// Stores a document directly, bypassing bulk semantics.
    pub fn insert(&self, target: &IndexTarget, document: MappedDocument) {
        self.targets
            .write()
            .entry(target.clone())
            .or_default()
            .insert(document.id, document.fields);
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn shares_token(value: &str, wanted: &HashSet<String>) -> bool {
    tokens(value).iter().any(|t| wanted.contains(t))
}

fn validate(document: &MappedDocument) -> Result<(), String> {
    if document.id.trim().is_empty() {
        return Err("document identifier is empty".to_string());
    }
    if let Some(name) = document.fields.keys().find(|name| name.starts_with('_')) {
        return Err(format!("field name '{name}' is reserved"));
    }
    Ok(())
}

#[async_trait]
impl DocumentIndex for MemoryIndex {
    async fn bulk_upsert(
        &self,
        target: &IndexTarget,
        documents: &[MappedDocument],
    ) -> SyncResult<Vec<ItemResult>> {
        let mut guard = self.targets.write();
        let docs = guard.entry(target.clone()).or_default();

        let results = documents
            .iter()
            .map(|document| {
                if let Err(reason) = validate(document) {
                    return ItemResult::failed(&document.id, reason);
                }
                let status = match docs.insert(document.id.clone(), document.fields.clone()) {
                    None => ItemStatus::Created,
                    Some(previous) if previous == document.fields => ItemStatus::Unchanged,
                    Some(_) => ItemStatus::Updated,
                };
                ItemResult::new(&document.id, status)
            })
            .collect();

        Ok(results)
    }

    async fn bulk_delete(
        &self,
        target: &IndexTarget,
        ids: &[String],
    ) -> SyncResult<Vec<ItemResult>> {
        let mut guard = self.targets.write();
        let docs = guard.get_mut(target);

        let results = match docs {
            Some(docs) => ids
                .iter()
                .map(|id| {
                    let status = if docs.remove(id).is_some() {
                        ItemStatus::Deleted
                    } else {
                        ItemStatus::NotFound
                    };
                    ItemResult::new(id, status)
                })
                .collect(),
            None => ids
                .iter()
                .map(|id| ItemResult::new(id, ItemStatus::NotFound))
                .collect(),
        };

        Ok(results)
    }

    async fn list_document_ids(&self, target: &IndexTarget) -> SyncResult<HashSet<String>> {
        Ok(self
            .targets
            .read()
            .get(target)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default())
    }
}
