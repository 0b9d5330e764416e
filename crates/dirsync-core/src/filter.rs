//! LDAP search filter parsing and evaluation (RFC 4515).
//!
//! Filters are parsed when a source is configured so that a malformed
//! filter is a configuration error instead of a failure on every scan.
//! Evaluation against a [`RawEntry`] is used by in-process directories.

use crate::entry::RawEntry;
use crate::error::{SyncError, SyncResult};

const MAX_DEPTH: usize = 64;

/// A parsed search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchFilter {
    /// `(&...)`; an empty list is absolute true.
    And(Vec<SearchFilter>),
    /// `(|...)`; an empty list is absolute false.
    Or(Vec<SearchFilter>),
    /// `(!...)`.
    Not(Box<SearchFilter>),
    /// `(attr=value)`.
    Equal {
        /// Attribute description.
        attribute: String,
        /// Assertion value (unescaped).
        value: String,
    },
    /// `(attr=*)`.
    Present(String),
    /// `(attr=ini*any*fin)`.
    Substring {
        /// Attribute description.
        attribute: String,
        /// Leading fragment.
        initial: Option<String>,
        /// Middle fragments, in order.
        any: Vec<String>,
        /// Trailing fragment.
        last: Option<String>,
    },
    /// `(attr>=value)`.
    GreaterOrEqual {
        /// Attribute description.
        attribute: String,
        /// Assertion value.
        value: String,
    },
    /// `(attr<=value)`.
    LessOrEqual {
        /// Attribute description.
        attribute: String,
        /// Assertion value.
        value: String,
    },
    /// `(attr~=value)`.
    Approx {
        /// Attribute description.
        attribute: String,
        /// Assertion value.
        value: String,
    },
    /// `(attr:rule:=value)`; only evaluated as equality on `attribute`.
    Extensible {
        /// Attribute description, if any.
        attribute: Option<String>,
        /// Matching rule OID or name, if any.
        rule: Option<String>,
        /// Assertion value.
        value: String,
    },
}

impl SearchFilter {
    /// Parses a filter string.
    ///
    /// A bare item such as `objectClass=person` is accepted and treated as
    /// if it were parenthesized.
    pub fn parse(input: &str) -> SyncResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(SyncError::config("search filter cannot be empty"));
        }
        let owned;
        let text = if trimmed.starts_with('(') {
            trimmed
        } else {
            owned = format!("({trimmed})");
            owned.as_str()
        };

        let mut parser = Parser {
            input: text.as_bytes(),
            pos: 0,
            depth: 0,
        };
        let filter = parser.filter()?;
        if parser.pos != parser.input.len() {
            return Err(parser.error("trailing characters after filter"));
        }
        Ok(filter)
    }

    /// Returns the filter in its canonical parenthesized form.
    #[must_use]
    pub fn normalize(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.starts_with('(') {
            trimmed.to_string()
        } else {
            format!("({trimmed})")
        }
    }

    /// Evaluates the filter against an entry.
    ///
    /// Matching is case-insensitive, which is the equality rule of the
    /// common directory string syntaxes.
    #[must_use]
    pub fn matches(&self, entry: &RawEntry) -> bool {
        match self {
            Self::And(items) => items.iter().all(|f| f.matches(entry)),
            Self::Or(items) => items.iter().any(|f| f.matches(entry)),
            Self::Not(inner) => !inner.matches(entry),
            Self::Equal { attribute, value } => {
                any_value(entry, attribute, |v| v.eq_ignore_ascii_case(value))
            }
            Self::Present(attribute) => {
                attribute.eq_ignore_ascii_case(crate::entry::OBJECT_CLASS)
                    || entry.has_attr(attribute)
            }
            Self::Substring {
                attribute,
                initial,
                any,
                last,
            } => any_value(entry, attribute, |v| {
                substring_match(&v.to_lowercase(), initial.as_deref(), any, last.as_deref())
            }),
            Self::GreaterOrEqual { attribute, value } => {
                any_value(entry, attribute, |v| ordering(v, value).is_ge())
            }
            Self::LessOrEqual { attribute, value } => {
                any_value(entry, attribute, |v| ordering(v, value).is_le())
            }
            Self::Approx { attribute, value } => {
                let wanted = squash(value);
                any_value(entry, attribute, |v| squash(v) == wanted)
            }
            Self::Extensible {
                attribute, value, ..
            } => attribute.as_deref().is_some_and(|attribute| {
                any_value(entry, attribute, |v| v.eq_ignore_ascii_case(value))
            }),
        }
    }
}

fn any_value(entry: &RawEntry, attribute: &str, pred: impl Fn(&str) -> bool) -> bool {
    // Attribute options (cn;lang-en) are matched on the base name.
    let base = attribute.split(';').next().unwrap_or(attribute);
    entry
        .get_attrs(base)
        .is_some_and(|values| values.iter().any(|v| pred(v)))
}

fn substring_match(value: &str, initial: Option<&str>, any: &[String], last: Option<&str>) -> bool {
    let mut rest = value;
    if let Some(initial) = initial {
        let initial = initial.to_lowercase();
        match rest.strip_prefix(initial.as_str()) {
            Some(r) => rest = r,
            None => return false,
        }
    }
    for fragment in any {
        let fragment = fragment.to_lowercase();
        match rest.find(fragment.as_str()) {
            Some(i) => rest = &rest[i + fragment.len()..],
            None => return false,
        }
    }
    match last {
        Some(last) => rest.ends_with(last.to_lowercase().as_str()),
        None => true,
    }
}

fn ordering(value: &str, assertion: &str) -> std::cmp::Ordering {
    match (value.parse::<i64>(), assertion.parse::<i64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => value.to_lowercase().cmp(&assertion.to_lowercase()),
    }
}

fn squash(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn error(&self, msg: &str) -> SyncError {
        SyncError::config(format!("invalid search filter at offset {}: {msg}", self.pos))
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> SyncResult<()> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn filter(&mut self) -> SyncResult<SearchFilter> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("filter nested too deeply"));
        }
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                SearchFilter::And(self.filter_list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                SearchFilter::Or(self.filter_list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                SearchFilter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(self.error("unexpected end of filter")),
        };
        self.expect(b')')?;
        self.depth -= 1;
        Ok(filter)
    }

    fn filter_list(&mut self) -> SyncResult<Vec<SearchFilter>> {
        let mut items = Vec::new();
        while self.peek() == Some(b'(') {
            items.push(self.filter()?);
        }
        Ok(items)
    }

    fn item(&mut self) -> SyncResult<SearchFilter> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b'=' | b'~' | b'>' | b'<' | b'(' | b')') {
                break;
            }
            self.pos += 1;
        }
        let description = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("attribute is not valid UTF-8"))?
            .trim()
            .to_string();

        let op = match self.peek() {
            Some(b'=') => {
                self.pos += 1;
                "="
            }
            Some(b'~') => {
                self.pos += 1;
                self.expect(b'=')?;
                "~="
            }
            Some(b'>') => {
                self.pos += 1;
                self.expect(b'=')?;
                ">="
            }
            Some(b'<') => {
                self.pos += 1;
                self.expect(b'=')?;
                "<="
            }
            _ => return Err(self.error("expected a comparison operator")),
        };

        let raw_start = self.pos;
        while let Some(b) = self.peek() {
            if b == b')' || b == b'(' {
                break;
            }
            self.pos += 1;
        }
        let raw = &self.input[raw_start..self.pos];

        if op == "=" && description.ends_with(':') {
            return self.extensible(&description[..description.len() - 1], raw);
        }
        if description.is_empty() {
            return Err(self.error("missing attribute description"));
        }
        if !is_attribute_description(&description) {
            return Err(self.error("invalid attribute description"));
        }

        match op {
            "=" => self.equality_or_substring(description, raw),
            "~=" => Ok(SearchFilter::Approx {
                attribute: description,
                value: self.unescape(raw)?,
            }),
            ">=" => Ok(SearchFilter::GreaterOrEqual {
                attribute: description,
                value: self.unescape(raw)?,
            }),
            _ => Ok(SearchFilter::LessOrEqual {
                attribute: description,
                value: self.unescape(raw)?,
            }),
        }
    }

    fn equality_or_substring(&self, attribute: String, raw: &[u8]) -> SyncResult<SearchFilter> {
        if raw == b"*" {
            return Ok(SearchFilter::Present(attribute));
        }
        if !raw.contains(&b'*') {
            return Ok(SearchFilter::Equal {
                attribute,
                value: self.unescape(raw)?,
            });
        }

        let pieces: Vec<&[u8]> = raw.split(|b| *b == b'*').collect();
        let first = pieces[0];
        let final_piece = pieces[pieces.len() - 1];
        let initial = if first.is_empty() {
            None
        } else {
            Some(self.unescape(first)?)
        };
        let last = if final_piece.is_empty() {
            None
        } else {
            Some(self.unescape(final_piece)?)
        };
        let mut any = Vec::new();
        for piece in &pieces[1..pieces.len() - 1] {
            if piece.is_empty() {
                return Err(self.error("empty substring fragment"));
            }
            any.push(self.unescape(piece)?);
        }
        Ok(SearchFilter::Substring {
            attribute,
            initial,
            any,
            last,
        })
    }

    fn extensible(&self, description: &str, raw: &[u8]) -> SyncResult<SearchFilter> {
        // attr[:dn][:rule] or [:dn]:rule
        let mut parts = description.split(':');
        let attribute = parts
            .next()
            .filter(|a| !a.is_empty())
            .map(str::to_string);
        let rule = parts
            .filter(|p| !p.is_empty() && !p.eq_ignore_ascii_case("dn"))
            .last()
            .map(str::to_string);
        if attribute.is_none() && rule.is_none() {
            return Err(self.error("extensible match needs an attribute or a rule"));
        }
        Ok(SearchFilter::Extensible {
            attribute,
            rule,
            value: self.unescape(raw)?,
        })
    }

    fn unescape(&self, raw: &[u8]) -> SyncResult<String> {
        let mut out = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            if raw[i] == b'\\' {
                let hex = raw
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| self.error("invalid escape sequence"))?;
                out.push(hex);
                i += 3;
            } else {
                out.push(raw[i]);
                i += 1;
            }
        }
        String::from_utf8(out).map_err(|_| self.error("assertion value is not valid UTF-8"))
    }
}

fn is_attribute_description(description: &str) -> bool {
    description
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | ';' | '.' | '_'))
}
