//! In-process directory loaded from LDIF.
//!
//! [`LdifDirectory`] answers scoped, filtered and paged searches over a set
//! of entries held in memory. It behaves like a server without ManageDsaIT:
//! entries with the `referral` object class come back as search result
//! references rather than as entries. Used for demos, local runs and tests.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use dirsync_core::entry::{normalize_dn, parent_dn};
use dirsync_core::{
    BindCredentials, DirectoryConnector, DirectorySession, PageCookie, RawEntry, SearchFilter,
    SearchPage, SearchRequest, SearchScope, SourceConfig, SyncError, SyncResult,
};
use parking_lot::RwLock;

use crate::error::{LdapError, LdapResult, RC_NO_SUCH_OBJECT};

/// Parses LDIF content records.
///
/// Supports comments, line folding, `version:` headers and base64 values
/// (`attr:: ...`). Change records are rejected.
pub fn parse_ldif(input: &str) -> LdapResult<Vec<RawEntry>> {
    let mut entries = Vec::new();
    let mut current: Option<RawEntry> = None;
    let mut logical: Vec<(usize, String)> = Vec::new();

    // Unfold continuation lines first.
    for (i, line) in input.lines().enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(rest) = line.strip_prefix(' ') {
            match logical.last_mut() {
                Some((_, prev)) if !prev.is_empty() => prev.push_str(rest),
                _ => return Err(LdapError::ldif(i + 1, "continuation without a line")),
            }
        } else {
            logical.push((i + 1, line.to_string()));
        }
    }

    for (line_no, line) in logical {
        if line.trim().is_empty() {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let (name, value) = parse_line(line_no, &line)?;
        match current.as_mut() {
            None if name.eq_ignore_ascii_case("version") => {}
            None if name.eq_ignore_ascii_case("dn") => current = Some(RawEntry::new(value)),
            None => return Err(LdapError::ldif(line_no, "record must start with 'dn:'")),
            Some(_) if name.eq_ignore_ascii_case("changetype") => {
                return Err(LdapError::ldif(line_no, "change records are not supported"));
            }
            Some(entry) => entry.push_values(name, [value]),
        }
    }
    if let Some(entry) = current.take() {
        entries.push(entry);
    }
    Ok(entries)
}

fn parse_line(line_no: usize, line: &str) -> LdapResult<(String, String)> {
    let (name, rest) = line
        .split_once(':')
        .ok_or_else(|| LdapError::ldif(line_no, "expected 'attribute: value'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(LdapError::ldif(line_no, "empty attribute name"));
    }

    let value = if let Some(encoded) = rest.strip_prefix(':') {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| LdapError::ldif(line_no, format!("invalid base64: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|_| LdapError::ldif(line_no, "base64 value is not UTF-8"))?
    } else if rest.starts_with('<') {
        return Err(LdapError::ldif(line_no, "URL values are not supported"));
    } else {
        rest.trim_start().to_string()
    };
    Ok((name.to_string(), value))
}

/// In-memory directory that serves searches like an LDAP server.
#[derive(Debug, Clone, Default)]
pub struct LdifDirectory {
    entries: Arc<RwLock<Vec<RawEntry>>>,
    credentials: Option<BindCredentials>,
}

impl LdifDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a directory from LDIF.
    pub fn from_ldif(input: &str) -> LdapResult<Self> {
        let directory = Self::new();
        for entry in parse_ldif(input)? {
            directory.add(entry);
        }
        Ok(directory)
    }

    /// Requires simple binds to use these credentials.
    #[must_use]
    pub fn with_credentials(mut self, bind_dn: &str, password: &str) -> Self {
        self.credentials = Some(BindCredentials::new(bind_dn, password));
        self
    }

    /// Adds or replaces an entry (matched by normalized DN).
    pub fn add(&self, entry: RawEntry) {
        let key = normalize_dn(&entry.dn);
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| normalize_dn(&e.dn) == key) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    /// Removes an entry; returns whether it existed.
    pub fn remove(&self, dn: &str) -> bool {
        let key = normalize_dn(dn);
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| normalize_dn(&e.dn) != key);
        entries.len() != before
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Checks if the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Runs a search and returns every result, references included, in
    /// directory order. `Err` when the base DN does not exist.
    fn search_all(&self, request: &SearchRequest) -> LdapResult<Vec<SearchItem>> {
        let filter = SearchFilter::parse(&request.filter)
            .map_err(|e| LdapError::from_result_code(crate::error::RC_FILTER_ERROR, e.to_string()))?;
        let base = normalize_dn(&request.base_dn);
        let entries = self.entries.read();

        if !entries.iter().any(|e| normalize_dn(&e.dn) == base) {
            return Err(LdapError::from_result_code(
                RC_NO_SUCH_OBJECT,
                format!("no such object: {}", request.base_dn),
            ));
        }

        Ok(entries
            .iter()
            .filter(|e| in_scope(&normalize_dn(&e.dn), &base, request.scope))
            .filter(|e| filter.matches(e))
            .map(|e| {
                if e.has_object_class("referral") {
                    SearchItem::Reference
                } else {
                    SearchItem::Entry(project(e, &request.attributes))
                }
            })
            .collect())
    }
}

enum SearchItem {
    Entry(RawEntry),
    Reference,
}

fn in_scope(dn: &str, base: &str, scope: SearchScope) -> bool {
    match scope {
        SearchScope::Base => dn == base,
        SearchScope::OneLevel => parent_dn(dn).as_deref() == Some(base),
        SearchScope::Subtree => {
            dn == base || base.is_empty() || dn.ends_with(&format!(",{base}"))
        }
    }
}

fn project(entry: &RawEntry, attributes: &[String]) -> RawEntry {
    if attributes.is_empty() || attributes.iter().any(|a| a == "*") {
        return entry.clone();
    }
    let mut out = RawEntry::new(entry.dn.clone());
    for name in attributes {
        if let Some(values) = entry.get_attrs(name) {
            out.push_values(name.clone(), values.iter().cloned());
        }
    }
    out
}

#[async_trait]
impl DirectoryConnector for LdifDirectory {
    async fn connect(&self, _config: &SourceConfig) -> SyncResult<Box<dyn DirectorySession>> {
        Ok(Box::new(LdifSession {
            directory: self.clone(),
            bound: false,
        }))
    }
}

/// Session over an [`LdifDirectory`].
#[derive(Debug)]
pub struct LdifSession {
    directory: LdifDirectory,
    bound: bool,
}

#[async_trait]
impl DirectorySession for LdifSession {
    async fn bind(&mut self, credentials: Option<&BindCredentials>) -> SyncResult<()> {
        if let Some(required) = &self.directory.credentials {
            if credentials != Some(required) {
                return Err(LdapError::Bind("invalid credentials".to_string()).into());
            }
        }
        self.bound = true;
        Ok(())
    }

    async fn search_page(
        &mut self,
        request: &SearchRequest,
        cookie: Option<PageCookie>,
    ) -> SyncResult<SearchPage> {
        if !self.bound {
            return Err(SyncError::protocol("search before bind"));
        }

        let offset = match cookie {
            None => 0,
            Some(cookie) => {
                let bytes: [u8; 8] = cookie
                    .as_bytes()
                    .try_into()
                    .map_err(|_| SyncError::protocol("invalid paged results cookie"))?;
                usize::try_from(u64::from_be_bytes(bytes))
                    .map_err(|_| SyncError::protocol("invalid paged results cookie"))?
            }
        };

        let items = self.directory.search_all(request)?;
        let total = items.len();
        let size = usize::try_from(request.page_size).unwrap_or(usize::MAX).max(1);
        let end = offset.saturating_add(size).min(total);

        let mut page = SearchPage::default();
        for item in items.into_iter().skip(offset).take(end.saturating_sub(offset)) {
            match item {
                SearchItem::Entry(entry) => page.entries.push(entry),
                SearchItem::Reference => page.referrals += 1,
            }
        }
        if end < total {
            page.next = PageCookie::new((end as u64).to_be_bytes().to_vec());
        }
        Ok(page)
    }

    async fn unbind(&mut self) -> SyncResult<()> {
        self.bound = false;
        Ok(())
    }
}
