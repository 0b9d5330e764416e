//! # dirsync-ldap
//!
//! LDAP directory source for dirsync.
//!
//! [`LdapConnector`] talks to a real server through `ldap3`: plain, LDAPS or
//! StartTLS transport, simple bind and paged search with the Simple Paged
//! Results control. [`LdifDirectory`] serves the same contract from entries
//! loaded out of LDIF.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod connection;
pub mod error;
pub mod ldif;
pub mod search;
pub mod source;

pub use config::LdapSettings;
pub use error::{LdapError, LdapResult};
pub use ldif::{parse_ldif, LdifDirectory};
pub use source::{LdapConnector, LdapSession};
