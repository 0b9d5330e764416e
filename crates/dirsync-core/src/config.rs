//! Source configuration.
//!
//! A [`SourceConfig`] describes one directory source: where it lives, how it
//! is searched, how its entries become documents and where those documents
//! are written. It is built once through [`SourceConfigBuilder`] (or from a
//! deserialized [`SourceDefinition`]) and never mutated afterwards.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::entry::OBJECT_CLASS;
use crate::error::{SyncError, SyncResult};
use crate::filter::SearchFilter;

/// Output field name that routes an attribute to the document identifier.
pub const ID_FIELD: &str = "_id";

/// Default poll interval (the interval measured from one scan's end to the
/// next scan's start).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of entries requested per directory page.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Default number of documents per bulk request.
pub const DEFAULT_BULK_SIZE: usize = 100;

/// Object classes that mark container or referral entries by default.
pub const DEFAULT_SKIP_OBJECT_CLASSES: &[&str] = &[
    "referral",
    "organizationalUnit",
    "organization",
    "container",
    "domain",
    "dcObject",
];

// ============================================================================
// Enumerations
// ============================================================================

/// Directory search scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchScope {
    /// Search only the base DN.
    Base,
    /// Search one level below the base DN.
    OneLevel,
    /// Search the entire subtree.
    #[default]
    Subtree,
}

impl FromStr for SearchScope {
    type Err = SyncError;

    /// Parses a scope name; an empty string selects the default subtree scope.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "sub" | "subtree" => Ok(Self::Subtree),
            "one" | "onelevel" | "one-level" | "one_level" => Ok(Self::OneLevel),
            "base" | "object" => Ok(Self::Base),
            other => Err(SyncError::config(format!("unknown search scope '{other}'"))),
        }
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Base => "base",
            Self::OneLevel => "one-level",
            Self::Subtree => "subtree",
        })
    }
}

/// Reconciliation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Documents whose entry disappeared from the scan are deleted.
    #[default]
    Strict,
    /// Only upserts; nothing is ever deleted.
    AppendOnly,
}

impl SyncMode {
    /// Returns true if this mode deletes vanished documents.
    #[must_use]
    pub const fn deletes(&self) -> bool {
        matches!(self, Self::Strict)
    }
}

/// Wait policy after consecutive failed scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffPolicy {
    /// Retry on the normal poll interval.
    #[default]
    None,
    /// Double the interval per consecutive failure, up to `max_interval`.
    Exponential {
        /// Upper bound for the wait.
        max_interval: Duration,
    },
}

impl BackoffPolicy {
    /// Returns the wait before the next scan.
    #[must_use]
    pub fn delay(&self, interval: Duration, consecutive_failures: u32) -> Duration {
        match self {
            Self::None => interval,
            Self::Exponential { max_interval } => {
                if consecutive_failures == 0 {
                    return interval;
                }
                let factor = 1u32 << consecutive_failures.min(16);
                interval
                    .saturating_mul(factor)
                    .min((*max_interval).max(interval))
            }
        }
    }
}

// ============================================================================
// Credentials and target
// ============================================================================

/// Simple-bind credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindCredentials {
    /// Bind DN.
    pub bind_dn: String,

    /// Bind password.
    #[serde(skip_serializing)]
    pub password: String,
}

impl BindCredentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(bind_dn: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            bind_dn: bind_dn.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BindCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindCredentials")
            .field("bind_dn", &self.bind_dn)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Index and document kind a source writes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexTarget {
    /// Index identifier.
    pub index: String,
    /// Document kind identifier.
    pub doc_kind: String,
}

impl IndexTarget {
    /// Creates a target.
    #[must_use]
    pub fn new(index: impl Into<String>, doc_kind: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_kind: doc_kind.into(),
        }
    }
}

impl fmt::Display for IndexTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.doc_kind)
    }
}

// ============================================================================
// Field mapping
// ============================================================================

/// One attribute-to-field rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    /// Source attribute name.
    pub attribute: String,
    /// Output field name.
    pub field: String,
}

/// Validated attribute-to-field mapping table.
///
/// Built from two parallel lists: position *i* of `attributes` maps to
/// position *i* of `fields`. Several attributes may share one field. The
/// [`ID_FIELD`] target marks the identifying attribute and produces no field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping {
    rules: Vec<FieldRule>,
    id_attribute: Option<String>,
}

impl FieldMapping {
    /// Builds the table from parallel attribute and field lists.
    ///
    /// An empty `fields` list maps every attribute to a field of the same name.
    pub fn from_lists(attributes: &[String], fields: &[String]) -> SyncResult<Self> {
        if !fields.is_empty() && fields.len() != attributes.len() {
            return Err(SyncError::config(format!(
                "field mapping needs one field per attribute ({} attributes, {} fields)",
                attributes.len(),
                fields.len()
            )));
        }

        let mut mapping = Self::default();
        for (i, attribute) in attributes.iter().enumerate() {
            let attribute = attribute.trim();
            let field = fields.get(i).map_or(attribute, |f| f.trim());

            if attribute.is_empty() {
                return Err(SyncError::config("attribute names cannot be empty"));
            }
            if field.is_empty() {
                return Err(SyncError::config(format!(
                    "field name for attribute '{attribute}' cannot be empty"
                )));
            }

            if field == ID_FIELD {
                if mapping.id_attribute.is_some() {
                    return Err(SyncError::config(format!(
                        "only one attribute may map to '{ID_FIELD}'"
                    )));
                }
                mapping.id_attribute = Some(attribute.to_string());
            } else if field.starts_with('_') {
                return Err(SyncError::config(format!(
                    "field names starting with '_' are reserved: '{field}'"
                )));
            } else {
                mapping.rules.push(FieldRule {
                    attribute: attribute.to_string(),
                    field: field.to_string(),
                });
            }
        }
        Ok(mapping)
    }

    /// Returns the field rules in configuration order.
    #[must_use]
    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    /// Returns the attribute routed to [`ID_FIELD`], if any.
    #[must_use]
    pub fn id_attribute(&self) -> Option<&str> {
        self.id_attribute.as_deref()
    }

    /// Returns the distinct output field names in first-seen order.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for rule in &self.rules {
            if !out.contains(&rule.field.as_str()) {
                out.push(&rule.field);
            }
        }
        out
    }

    /// Checks if no attribute is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.id_attribute.is_none()
    }
}

/// Where a document identifier comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierSource<'a> {
    /// First value of an attribute.
    Attribute(&'a str),
    /// Value of the entry's leftmost RDN.
    Rdn,
}

// ============================================================================
// Source configuration
// ============================================================================

/// Immutable configuration for one directory source.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    // === Identity ===
    /// Source identifier (registry key).
    pub id: String,

    // === Connection ===
    /// Directory host.
    pub host: String,

    /// Directory port.
    pub port: u16,

    /// Use LDAPS (TLS from connection start).
    pub ssl: bool,

    /// Upgrade a plain connection with StartTLS.
    pub starttls: bool,

    /// Whether to validate server certificates.
    pub verify_certificates: bool,

    /// Connect timeout.
    pub connect_timeout: Duration,

    /// Timeout for each directory operation.
    pub operation_timeout: Duration,

    /// Bind credentials; `None` binds anonymously.
    pub credentials: Option<BindCredentials>,

    // === Search ===
    /// Base DN of the search.
    pub base_dn: String,

    /// Search scope.
    pub scope: SearchScope,

    /// Search filter, parenthesized.
    pub filter: String,

    /// Entries per page.
    pub page_size: u32,

    /// Safety cap on pages per scan.
    pub max_pages: Option<u32>,

    /// Object classes marking entries that are never indexed.
    ///
    /// Referral entries are dropped whether or not `referral` is listed.
    pub skip_object_classes: Vec<String>,

    // === Mapping ===
    /// Attribute-to-field table.
    pub mapping: FieldMapping,

    /// Explicit identifying attribute (overrides an `_id` mapping).
    pub id_attribute: Option<String>,

    // === Target ===
    /// Index and document kind.
    pub target: IndexTarget,

    /// Reconciliation mode.
    pub sync_mode: SyncMode,

    /// Documents per bulk request.
    pub bulk_size: usize,

    /// Bulk requests in flight at once.
    pub bulk_concurrency: usize,

    // === Scheduling ===
    /// Wait between the end of one scan and the start of the next.
    pub poll_interval: Duration,

    /// Wait policy after failed scans.
    pub backoff: BackoffPolicy,
}

impl SourceConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> SourceConfigBuilder {
        SourceConfigBuilder::new()
    }

    /// Returns the directory URL.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.ssl { "ldaps" } else { "ldap" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    /// Returns where document identifiers come from.
    #[must_use]
    pub fn identifier_source(&self) -> IdentifierSource<'_> {
        match self.id_attribute.as_deref().or(self.mapping.id_attribute()) {
            Some(attr) => IdentifierSource::Attribute(attr),
            None => IdentifierSource::Rdn,
        }
    }

    /// Returns the attributes requested from the directory.
    ///
    /// This is every mapped attribute, the identifying attribute and
    /// `objectClass`, without case-insensitive duplicates.
    #[must_use]
    pub fn fetch_attributes(&self) -> Vec<String> {
        let mut attrs: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            if !attrs.iter().any(|a| a.eq_ignore_ascii_case(name)) {
                attrs.push(name.to_string());
            }
        };
        for rule in self.mapping.rules() {
            push(&rule.attribute);
        }
        if let IdentifierSource::Attribute(attr) = self.identifier_source() {
            push(attr);
        }
        push(OBJECT_CLASS);
        attrs
    }

    /// Checks if an object class marks entries that are skipped.
    #[must_use]
    pub fn is_skipped_class(&self, class: &str) -> bool {
        self.skip_object_classes
            .iter()
            .any(|c| c.eq_ignore_ascii_case(class))
    }
}

// ============================================================================
// Configuration Builder
// ============================================================================

/// Builder for [`SourceConfig`].
#[derive(Debug, Default)]
pub struct SourceConfigBuilder {
    id: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    ssl: bool,
    starttls: bool,
    verify_certificates: bool,
    connect_timeout: Duration,
    operation_timeout: Duration,
    credentials: Option<BindCredentials>,
    base_dn: Option<String>,
    scope: SearchScope,
    filter: Option<String>,
    page_size: u32,
    max_pages: Option<u32>,
    skip_object_classes: Vec<String>,
    attributes: Vec<String>,
    fields: Vec<String>,
    id_attribute: Option<String>,
    target: Option<IndexTarget>,
    sync_mode: SyncMode,
    bulk_size: usize,
    bulk_concurrency: usize,
    poll_interval: Duration,
    backoff: BackoffPolicy,
}

impl SourceConfigBuilder {
    /// Creates a new builder with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            verify_certificates: true,
            connect_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(30),
            page_size: DEFAULT_PAGE_SIZE,
            skip_object_classes: DEFAULT_SKIP_OBJECT_CLASSES
                .iter()
                .map(|c| (*c).to_string())
                .collect(),
            bulk_size: DEFAULT_BULK_SIZE,
            bulk_concurrency: 1,
            poll_interval: DEFAULT_POLL_INTERVAL,
            ..Default::default()
        }
    }

    /// Sets the source identifier.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the directory host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the directory port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Enables LDAPS.
    #[must_use]
    pub const fn ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    /// Enables StartTLS.
    #[must_use]
    pub const fn starttls(mut self, starttls: bool) -> Self {
        self.starttls = starttls;
        self
    }

    /// Sets whether to validate certificates.
    #[must_use]
    pub const fn verify_certificates(mut self, verify: bool) -> Self {
        self.verify_certificates = verify;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-operation timeout.
    #[must_use]
    pub const fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets simple-bind credentials.
    #[must_use]
    pub fn credentials(mut self, bind_dn: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(BindCredentials::new(bind_dn, password));
        self
    }

    /// Sets the base DN.
    #[must_use]
    pub fn base_dn(mut self, dn: impl Into<String>) -> Self {
        self.base_dn = Some(dn.into());
        self
    }

    /// Sets the search scope.
    #[must_use]
    pub const fn scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the search filter.
    #[must_use]
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// Caps the number of pages per scan.
    #[must_use]
    pub const fn max_pages(mut self, max: u32) -> Self {
        self.max_pages = Some(max);
        self
    }

    /// Replaces the skipped object classes. Referral entries are dropped regardless.
    #[must_use]
    pub fn skip_object_classes(mut self, classes: Vec<String>) -> Self {
        self.skip_object_classes = classes;
        self
    }

    /// Sets the attributes to fetch and map.
    #[must_use]
    pub fn attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the output field names, parallel to the attributes.
    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the identifying attribute.
    #[must_use]
    pub fn id_attribute(mut self, attr: impl Into<String>) -> Self {
        self.id_attribute = Some(attr.into());
        self
    }

    /// Sets the index target.
    #[must_use]
    pub fn target(mut self, index: impl Into<String>, doc_kind: impl Into<String>) -> Self {
        self.target = Some(IndexTarget::new(index, doc_kind));
        self
    }

    /// Sets the reconciliation mode.
    #[must_use]
    pub const fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Sets the bulk request size.
    #[must_use]
    pub const fn bulk_size(mut self, size: usize) -> Self {
        self.bulk_size = size;
        self
    }

    /// Sets how many bulk requests may run at once.
    #[must_use]
    pub const fn bulk_concurrency(mut self, concurrency: usize) -> Self {
        self.bulk_concurrency = concurrency;
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the failure backoff policy.
    #[must_use]
    pub const fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// ## Errors
    ///
    /// Returns [`SyncError::Configuration`] if:
    /// - Required fields (id, host, base DN, target) are missing or empty
    /// - The filter does not parse
    /// - The field mapping is inconsistent
    /// - Sizes or intervals are zero, or both LDAPS and StartTLS are set
    pub fn build(self) -> SyncResult<SourceConfig> {
        let id = required(self.id, "id")?;
        let host = required(self.host, "host")?;
        let base_dn = required(self.base_dn, "base_dn")?;
        let target = self
            .target
            .ok_or_else(|| SyncError::config("index target is required"))?;
        if target.index.trim().is_empty() || target.doc_kind.trim().is_empty() {
            return Err(SyncError::config("index and document kind cannot be empty"));
        }

        if self.ssl && self.starttls {
            return Err(SyncError::config("ssl and starttls are mutually exclusive"));
        }
        if self.page_size == 0 {
            return Err(SyncError::config("page_size must be greater than zero"));
        }
        if self.max_pages == Some(0) {
            return Err(SyncError::config("max_pages must be greater than zero"));
        }
        if self.bulk_size == 0 {
            return Err(SyncError::config("bulk_size must be greater than zero"));
        }
        if self.bulk_concurrency == 0 {
            return Err(SyncError::config("bulk_concurrency must be greater than zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(SyncError::config("poll_interval must be greater than zero"));
        }

        let filter = self.filter.unwrap_or_else(|| "(objectClass=*)".to_string());
        SearchFilter::parse(&filter)?;

        let mapping = FieldMapping::from_lists(&self.attributes, &self.fields)?;
        let id_attribute = match self.id_attribute {
            Some(attr) if attr.trim().is_empty() => {
                return Err(SyncError::config("id_attribute cannot be empty"))
            }
            other => other.map(|a| a.trim().to_string()),
        };

        let port = self
            .port
            .unwrap_or(if self.ssl { 636 } else { 389 });

        Ok(SourceConfig {
            id,
            host,
            port,
            ssl: self.ssl,
            starttls: self.starttls,
            verify_certificates: self.verify_certificates,
            connect_timeout: self.connect_timeout,
            operation_timeout: self.operation_timeout,
            credentials: self.credentials,
            base_dn,
            scope: self.scope,
            filter: SearchFilter::normalize(&filter),
            page_size: self.page_size,
            max_pages: self.max_pages,
            skip_object_classes: self.skip_object_classes,
            mapping,
            id_attribute,
            target,
            sync_mode: self.sync_mode,
            bulk_size: self.bulk_size,
            bulk_concurrency: self.bulk_concurrency,
            poll_interval: self.poll_interval,
            backoff: self.backoff,
        })
    }
}

fn required(value: Option<String>, name: &str) -> SyncResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(SyncError::config(format!("{name} is required"))),
    }
}

// ============================================================================
// Serialized definition
// ============================================================================

fn default_true() -> bool {
    true
}

/// Serialized form of a source, as found in configuration files and
/// management requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceDefinition {
    /// Source identifier.
    pub id: String,
    /// Directory host.
    pub host: String,
    /// Directory port (default 389, or 636 with `ssl`).
    #[serde(default)]
    pub port: Option<u16>,
    /// Use LDAPS.
    #[serde(default)]
    pub ssl: bool,
    /// Use StartTLS.
    #[serde(default)]
    pub starttls: bool,
    /// Validate server certificates.
    #[serde(default = "default_true")]
    pub verify_certificates: bool,
    /// Bind DN; absent binds anonymously.
    #[serde(default)]
    pub bind_dn: Option<String>,
    /// Bind password.
    #[serde(default, skip_serializing)]
    pub credentials: Option<String>,
    /// Base DN.
    pub base_dn: String,
    /// Search scope name; empty means subtree.
    #[serde(default)]
    pub scope: Option<String>,
    /// Search filter.
    #[serde(default)]
    pub filter: Option<String>,
    /// Attributes to fetch and map.
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Output fields, parallel to `attributes`.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Identifying attribute.
    #[serde(default)]
    pub id_attribute: Option<String>,
    /// Object classes never indexed.
    #[serde(default)]
    pub skip_object_classes: Option<Vec<String>>,
    /// Entries per page.
    #[serde(default)]
    pub page_size: Option<u32>,
    /// Page cap per scan.
    #[serde(default)]
    pub max_pages: Option<u32>,
    /// Poll interval in milliseconds.
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    /// Enables exponential backoff up to this many milliseconds.
    #[serde(default)]
    pub backoff_max_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    /// Operation timeout in milliseconds.
    #[serde(default)]
    pub operation_timeout_ms: Option<u64>,
    /// Index identifier.
    pub index: String,
    /// Document kind.
    pub doc_kind: String,
    /// Reconciliation mode.
    #[serde(default)]
    pub sync_mode: SyncMode,
    /// Documents per bulk request.
    #[serde(default)]
    pub bulk_size: Option<usize>,
    /// Concurrent bulk requests.
    #[serde(default)]
    pub bulk_concurrency: Option<usize>,
}

impl SourceDefinition {
    /// Validates the definition into a [`SourceConfig`].
    pub fn into_config(self) -> SyncResult<SourceConfig> {
        let scope = self.scope.as_deref().unwrap_or("").parse::<SearchScope>()?;

        let mut builder = SourceConfig::builder()
            .id(self.id)
            .host(self.host)
            .ssl(self.ssl)
            .starttls(self.starttls)
            .verify_certificates(self.verify_certificates)
            .base_dn(self.base_dn)
            .scope(scope)
            .attributes(self.attributes)
            .fields(self.fields)
            .target(self.index, self.doc_kind)
            .sync_mode(self.sync_mode);

        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(bind_dn) = self.bind_dn.filter(|dn| !dn.trim().is_empty()) {
            builder = builder.credentials(bind_dn, self.credentials.unwrap_or_default());
        }
        if let Some(filter) = self.filter.filter(|f| !f.trim().is_empty()) {
            builder = builder.filter(filter);
        }
        if let Some(attr) = self.id_attribute {
            builder = builder.id_attribute(attr);
        }
        if let Some(classes) = self.skip_object_classes {
            builder = builder.skip_object_classes(classes);
        }
        if let Some(size) = self.page_size {
            builder = builder.page_size(size);
        }
        if let Some(max) = self.max_pages {
            builder = builder.max_pages(max);
        }
        if let Some(ms) = self.poll_interval_ms {
            builder = builder.poll_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = self.backoff_max_ms {
            builder = builder.backoff(BackoffPolicy::Exponential {
                max_interval: Duration::from_millis(ms),
            });
        }
        if let Some(ms) = self.connect_timeout_ms {
            builder = builder.connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.operation_timeout_ms {
            builder = builder.operation_timeout(Duration::from_millis(ms));
        }
        if let Some(size) = self.bulk_size {
            builder = builder.bulk_size(size);
        }
        if let Some(concurrency) = self.bulk_concurrency {
            builder = builder.bulk_concurrency(concurrency);
        }

        builder.build()
    }
}
