//! Storage trait definitions

use crate::models::{SummaryRecord, Uid};
use anyhow::Result;

/// Persistence for folder summaries
///
/// A folder calls `save` only at defined points (after invalidating its
/// local cache and after a completed merge), so implementations can treat
/// each call as one consistent snapshot.
pub trait SummaryStore: Send + Sync {
    /// Load the summary saved for a folder path
    fn load(&self, folder_path: &str) -> Result<Option<SummaryRecord>>;

    /// Replace the saved summary for a folder path
    fn save(&self, folder_path: &str, record: &SummaryRecord) -> Result<()>;

    /// Move a saved summary to a new folder path
    fn rename(&self, old_path: &str, new_path: &str) -> Result<()>;

    /// Forget a folder's summary
    fn delete(&self, folder_path: &str) -> Result<()>;

    /// Folder paths that have a saved summary
    fn list_folders(&self) -> Result<Vec<String>>;
}

/// Namespaces of the on-disk message cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    /// Messages known to the server, keyed by UID
    Settled,
    /// Messages appended locally and not yet acknowledged by the server
    PendingUpload,
}

impl CacheNamespace {
    /// Directory name of the namespace
    pub fn dir_name(&self) -> &'static str {
        match self {
            CacheNamespace::Settled => "cur",
            CacheNamespace::PendingUpload => "new",
        }
    }
}

/// Key of one cached message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub folder_path: String,
    pub namespace: CacheNamespace,
    /// UID for settled messages, a local id for pending uploads
    pub id: String,
}

impl CacheKey {
    pub fn settled(folder_path: &str, uid: Uid) -> Self {
        Self {
            folder_path: folder_path.to_string(),
            namespace: CacheNamespace::Settled,
            id: uid.to_string(),
        }
    }

    pub fn pending(folder_path: &str, local_id: &str) -> Self {
        Self {
            folder_path: folder_path.to_string(),
            namespace: CacheNamespace::PendingUpload,
            id: local_id.to_string(),
        }
    }
}

/// Cache of full message sources
///
/// Implementations handle compression internally.
pub trait MessageCache: Send + Sync {
    /// Store a message
    fn put(&self, key: &CacheKey, data: &[u8]) -> Result<()>;

    /// Retrieve a message, None if it is not cached
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;

    /// Check if a message is cached
    fn exists(&self, key: &CacheKey) -> Result<bool>;

    /// Remove one message
    fn remove(&self, key: &CacheKey) -> Result<()>;

    /// Ids cached in one namespace of a folder
    fn list(&self, folder_path: &str, namespace: CacheNamespace) -> Result<Vec<String>>;

    /// Drop every message in one namespace of a folder
    fn clear(&self, folder_path: &str, namespace: CacheNamespace) -> Result<()>;

    /// Move all cached messages of a folder to a new path
    fn rename_folder(&self, old_path: &str, new_path: &str) -> Result<()>;
}
