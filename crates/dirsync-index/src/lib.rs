//! # dirsync-index
//!
//! Document index collaborators.
//!
//! - [`MemoryIndex`]: process-local index with token queries
//! - [`ElasticIndex`]: Elasticsearch-compatible `_bulk` client over `reqwest`

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod elastic;
pub mod error;
pub mod memory;

pub use elastic::{ElasticConfig, ElasticIndex, DEFAULT_KIND_FIELD};
pub use error::{IndexError, IndexResult};
pub use memory::MemoryIndex;
