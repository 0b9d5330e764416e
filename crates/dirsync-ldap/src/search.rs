//! Paged LDAP search.
//!
//! Uses the Simple Paged Results control (RFC 2696). The server's cookie is
//! handed back unchanged on the next request; an empty or missing cookie
//! ends the search. Search result references are counted and never chased.

use base64::Engine as _;
use dirsync_core::{PageCookie, RawEntry, SearchPage, SearchRequest, SearchScope};
use ldap3::controls::{ControlType, PagedResults};
use ldap3::{ResultEntry, SearchEntry, SearchResult};

use crate::connection::LdapConnection;
use crate::error::{LdapError, LdapResult, RC_FILTER_ERROR, RC_SIZE_LIMIT_EXCEEDED, RC_SUCCESS};

/// Converts a scope to its `ldap3` form.
#[must_use]
pub const fn to_ldap3(scope: SearchScope) -> ldap3::Scope {
    match scope {
        SearchScope::Base => ldap3::Scope::Base,
        SearchScope::OneLevel => ldap3::Scope::OneLevel,
        SearchScope::Subtree => ldap3::Scope::Subtree,
    }
}

/// Converts a search entry. Binary values are base64-encoded.
#[must_use]
pub fn raw_entry(entry: SearchEntry) -> RawEntry {
    let mut raw = RawEntry::new(entry.dn);
    for (name, values) in entry.attrs {
        raw.push_values(name, values);
    }
    for (name, values) in entry.bin_attrs {
        raw.push_values(
            name,
            values
                .iter()
                .map(|v| base64::engine::general_purpose::STANDARD.encode(v)),
        );
    }
    raw
}

/// LDAP search helper.
pub struct LdapSearcher<'a> {
    conn: &'a mut LdapConnection,
}

impl<'a> LdapSearcher<'a> {
    /// Creates a new searcher.
    pub fn new(conn: &'a mut LdapConnection) -> Self {
        Self { conn }
    }

    /// Fetches one page.
    pub async fn fetch_page(
        &mut self,
        request: &SearchRequest,
        cookie: Option<PageCookie>,
    ) -> LdapResult<SearchPage> {
        let control = PagedResults {
            size: i32::try_from(request.page_size).unwrap_or(i32::MAX),
            cookie: cookie.map(|c| c.0).unwrap_or_default(),
        };

        let SearchResult(results, result) = self
            .conn
            .ldap_mut()
            .with_timeout(request.timeout)
            .with_controls(control)
            .search(
                &request.base_dn,
                to_ldap3(request.scope),
                &request.filter,
                request.attributes.clone(),
            )
            .await
            .map_err(classify_search_error)?;

        let truncated = check_result_code(result.rc, &result.text)?;

        let mut page = build_page(results, next_cookie(&result));
        if truncated {
            page.next = None;
            page.truncated = true;
        }
        Ok(page)
    }
}

/// Checks a search result code. Returns `true` when the server hit its
/// size limit and the result set is incomplete.
pub fn check_result_code(rc: u32, text: &str) -> LdapResult<bool> {
    match rc {
        RC_SUCCESS => Ok(false),
        RC_SIZE_LIMIT_EXCEEDED => {
            tracing::warn!(%text, "LDAP size limit exceeded; result set is incomplete");
            Ok(true)
        }
        code => Err(LdapError::from_result_code(code, text)),
    }
}

fn next_cookie(result: &ldap3::LdapResult) -> Option<PageCookie> {
    result
        .ctrls
        .iter()
        .find_map(|ctrl| match ctrl {
            ldap3::controls::Control(Some(ControlType::PagedResults), raw) => {
                Some(raw.parse::<PagedResults>().cookie)
            }
            _ => None,
        })
        .and_then(PageCookie::new)
}

fn build_page(results: Vec<ResultEntry>, next: Option<PageCookie>) -> SearchPage {
    let mut page = SearchPage {
        next,
        ..SearchPage::default()
    };
    for result in results {
        if result.is_ref() {
            page.referrals += 1;
        } else if !result.is_intermediate() {
            page.entries.push(raw_entry(SearchEntry::construct(result)));
        }
    }
    page
}

fn classify_search_error(err: ldap3::LdapError) -> LdapError {
    match err {
        ldap3::LdapError::Timeout { .. } => LdapError::Timeout,
        ldap3::LdapError::FilterParsing => {
            LdapError::from_result_code(RC_FILTER_ERROR, "invalid search filter")
        }
        ldap3::LdapError::InvalidScopeString(scope) => {
            LdapError::config(format!("invalid search scope '{scope}'"))
        }
        ldap3::LdapError::LdapResult { result } => {
            LdapError::from_result_code(result.rc, result.text)
        }
        ldap3::LdapError::DecodingUTF8 => LdapError::protocol("invalid UTF-8 in search result"),
        other => LdapError::connection(other.to_string()),
    }
}
