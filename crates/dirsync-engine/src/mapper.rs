//! Attribute Mapper.
//!
//! Turns a [`RawEntry`] into a [`MappedDocument`] using the source's
//! validated field mapping. Pure: no I/O, no shared state.

use dirsync_core::{
    FieldRule, FieldValue, IdentifierSource, MappedDocument, RawEntry, SourceConfig, SyncError,
    SyncResult,
};

/// Where the identifier is read from, owned.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Identifier {
    Attribute(String),
    Rdn,
}

/// Maps directory entries to documents.
#[derive(Debug, Clone)]
pub struct AttributeMapper {
    rules: Vec<FieldRule>,
    identifier: Identifier,
}

impl AttributeMapper {
    /// Creates a mapper for a source.
    #[must_use]
    pub fn new(config: &SourceConfig) -> Self {
        let identifier = match config.identifier_source() {
            IdentifierSource::Attribute(attr) => Identifier::Attribute(attr.to_string()),
            IdentifierSource::Rdn => Identifier::Rdn,
        };
        Self {
            rules: config.mapping.rules().to_vec(),
            identifier,
        }
    }

    /// Maps one entry.
    ///
    /// Missing attributes omit their field. Attributes sharing a field are
    /// concatenated in rule order.
    ///
    /// ## Errors
    ///
    /// [`SyncError::MissingIdentifier`] when the identifying attribute (or
    /// the RDN) has no non-empty value.
    pub fn map(&self, entry: &RawEntry) -> SyncResult<MappedDocument> {
        let id = self.identifier_of(entry)?;
        let mut document = MappedDocument::new(id, entry.dn.clone());

        for rule in &self.rules {
            let Some(values) = entry.get_attrs(&rule.attribute) else {
                continue;
            };
            if values.is_empty() {
                continue;
            }
            match document.fields.get_mut(&rule.field) {
                Some(existing) => existing.extend(values.iter().cloned()),
                None => {
                    document
                        .fields
                        .insert(rule.field.clone(), FieldValue::from_values(values.to_vec()));
                }
            }
        }

        Ok(document)
    }

    fn identifier_of(&self, entry: &RawEntry) -> SyncResult<String> {
        let (value, source) = match &self.identifier {
            Identifier::Attribute(attr) => (
                entry.get_attr(attr).map(str::to_string),
                attr.as_str(),
            ),
            Identifier::Rdn => (entry.rdn_value(), "RDN"),
        };

        match value {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(SyncError::missing_identifier(&entry.dn, source)),
        }
    }
}
