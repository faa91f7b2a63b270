//! Storage traits and implementations
//!
//! Folder summaries go through [`SummaryStore`]; full message sources go
//! through [`MessageCache`]. Both have an in-memory implementation for tests
//! and a persistent one (SQLite, zstd-compressed files).

mod file_cache;
mod memory;
mod sqlite;
mod traits;

pub use file_cache::FileMessageCache;
pub use memory::{InMemoryMessageCache, InMemorySummaryStore};
pub use sqlite::SqliteSummaryStore;
pub use traits::{CacheKey, CacheNamespace, MessageCache, SummaryStore};
