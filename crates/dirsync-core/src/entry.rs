//! Directory entries and index documents.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Name of the structural attribute listing an entry's object classes.
pub const OBJECT_CLASS: &str = "objectClass";

/// A directory search result.
///
/// Attribute names are kept as returned by the directory; lookups are
/// case-insensitive because directory attribute names are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    /// Distinguished Name.
    pub dn: String,

    /// Attributes (all values are multi-valued).
    pub attributes: HashMap<String, Vec<String>>,
}

impl RawEntry {
    /// Creates an entry without attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    /// Adds values for an attribute, appending to existing values.
    #[must_use]
    pub fn with_attr<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_values(name, values);
        self
    }

    /// Appends values for an attribute.
    pub fn push_values<I, S>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let key = self
            .attributes
            .keys()
            .find(|k| k.eq_ignore_ascii_case(&name))
            .cloned()
            .unwrap_or(name);
        self.attributes
            .entry(key)
            .or_default()
            .extend(values.into_iter().map(Into::into));
    }

    /// Gets a multi-valued attribute.
    #[must_use]
    pub fn get_attrs(&self, name: &str) -> Option<&[String]> {
        if let Some(values) = self.attributes.get(name) {
            return Some(values);
        }
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// Gets the first value of an attribute.
    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.get_attrs(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// Checks if the entry has a non-empty attribute.
    #[must_use]
    pub fn has_attr(&self, name: &str) -> bool {
        self.get_attrs(name).is_some_and(|v| !v.is_empty())
    }

    /// Returns the entry's object classes.
    #[must_use]
    pub fn object_classes(&self) -> &[String] {
        self.get_attrs(OBJECT_CLASS).unwrap_or(&[])
    }

    /// Checks object class membership (case-insensitive).
    #[must_use]
    pub fn has_object_class(&self, class: &str) -> bool {
        self.object_classes()
            .iter()
            .any(|c| c.eq_ignore_ascii_case(class))
    }

    /// Returns the attribute name and value of the leftmost RDN.
    #[must_use]
    pub fn rdn(&self) -> Option<(String, String)> {
        leftmost_rdn(&self.dn)
    }

    /// Returns the value of the leftmost RDN.
    #[must_use]
    pub fn rdn_value(&self) -> Option<String> {
        self.rdn().map(|(_, value)| value)
    }
}

/// Splits a DN into its RDN components, honouring `\` escapes.
#[must_use]
pub fn split_dn(dn: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in dn.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                parts.push(dn[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = dn[start..].trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts
}

/// Returns the parent DN, or `None` for a single-component DN.
#[must_use]
pub fn parent_dn(dn: &str) -> Option<String> {
    let parts = split_dn(dn);
    if parts.len() < 2 {
        return None;
    }
    Some(parts[1..].join(","))
}

/// Normalizes a DN for comparison: lowercased, no spaces around separators.
#[must_use]
pub fn normalize_dn(dn: &str) -> String {
    split_dn(dn)
        .into_iter()
        .map(|rdn| match rdn.split_once('=') {
            Some((attr, value)) => format!(
                "{}={}",
                attr.trim().to_lowercase(),
                value.trim().to_lowercase()
            ),
            None => rdn.to_lowercase(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn leftmost_rdn(dn: &str) -> Option<(String, String)> {
    let first = split_dn(dn).into_iter().next()?;
    // Multi-valued RDNs (a=1+b=2) use the first component.
    let first = first.split('+').next().unwrap_or(first);
    let (attr, value) = first.split_once('=')?;
    let value = unescape_dn_value(value.trim());
    if attr.trim().is_empty() || value.is_empty() {
        return None;
    }
    Some((attr.trim().to_string(), value))
}

fn unescape_dn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// A document field value.
///
/// Serializes as a plain string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Single-valued field.
    Single(String),
    /// Multi-valued field.
    Multi(Vec<String>),
}

impl FieldValue {
    /// Builds a value from directory values: one value stays single.
    #[must_use]
    pub fn from_values(mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            Self::Single(values.remove(0))
        } else {
            Self::Multi(values)
        }
    }

    /// Iterates over the contained values.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            Self::Single(v) => std::slice::from_ref(v),
            Self::Multi(vs) => vs,
        };
        slice.iter().map(String::as_str)
    }

    /// Appends values, promoting to multi-valued.
    pub fn extend(&mut self, more: impl IntoIterator<Item = String>) {
        let mut all: Vec<String> = self.iter().map(str::to_string).collect();
        all.extend(more);
        *self = Self::Multi(all);
    }
}

/// A flat document produced from one directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedDocument {
    /// Document identifier, derived from the entry.
    pub id: String,

    /// Source DN (kept for diagnostics, not written as a field).
    pub dn: String,

    /// Output fields.
    pub fields: BTreeMap<String, FieldValue>,
}

impl MappedDocument {
    /// Creates an empty document.
    #[must_use]
    pub fn new(id: impl Into<String>, dn: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dn: dn.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Returns the document body as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.fields).unwrap_or_else(|_| serde_json::json!({}))
    }
}
