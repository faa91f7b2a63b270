//! In-memory storage implementations
//!
//! Used for tests and for stores that do not keep anything across runs.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{CacheKey, CacheNamespace, MessageCache, SummaryStore};
use crate::models::SummaryRecord;

/// In-memory implementation of SummaryStore
pub struct InMemorySummaryStore {
    records: RwLock<HashMap<String, SummaryRecord>>,
}

impl InMemorySummaryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySummaryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SummaryStore for InMemorySummaryStore {
    fn load(&self, folder_path: &str) -> Result<Option<SummaryRecord>> {
        Ok(self.records.read().unwrap().get(folder_path).cloned())
    }

    fn save(&self, folder_path: &str, record: &SummaryRecord) -> Result<()> {
        self.records
            .write()
            .unwrap()
            .insert(folder_path.to_string(), record.clone());
        Ok(())
    }

    fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        let mut records = self.records.write().unwrap();
        if let Some(record) = records.remove(old_path) {
            records.insert(new_path.to_string(), record);
        }
        Ok(())
    }

    fn delete(&self, folder_path: &str) -> Result<()> {
        self.records.write().unwrap().remove(folder_path);
        Ok(())
    }

    fn list_folders(&self) -> Result<Vec<String>> {
        let mut paths: Vec<String> = self.records.read().unwrap().keys().cloned().collect();
        paths.sort();
        Ok(paths)
    }
}

/// In-memory implementation of MessageCache
pub struct InMemoryMessageCache {
    messages: RwLock<HashMap<CacheKey, Vec<u8>>>,
}

impl InMemoryMessageCache {
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryMessageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageCache for InMemoryMessageCache {
    fn put(&self, key: &CacheKey, data: &[u8]) -> Result<()> {
        self.messages
            .write()
            .unwrap()
            .insert(key.clone(), data.to_vec());
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        Ok(self.messages.read().unwrap().get(key).cloned())
    }

    fn exists(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.messages.read().unwrap().contains_key(key))
    }

    fn remove(&self, key: &CacheKey) -> Result<()> {
        self.messages.write().unwrap().remove(key);
        Ok(())
    }

    fn list(&self, folder_path: &str, namespace: CacheNamespace) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .messages
            .read()
            .unwrap()
            .keys()
            .filter(|k| k.folder_path == folder_path && k.namespace == namespace)
            .map(|k| k.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn clear(&self, folder_path: &str, namespace: CacheNamespace) -> Result<()> {
        self.messages
            .write()
            .unwrap()
            .retain(|k, _| !(k.folder_path == folder_path && k.namespace == namespace));
        Ok(())
    }

    fn rename_folder(&self, old_path: &str, new_path: &str) -> Result<()> {
        let mut messages = self.messages.write().unwrap();
        let moved: Vec<CacheKey> = messages
            .keys()
            .filter(|k| k.folder_path == old_path)
            .cloned()
            .collect();
        for key in moved {
            if let Some(data) = messages.remove(&key) {
                let new_key = CacheKey {
                    folder_path: new_path.to_string(),
                    ..key
                };
                messages.insert(new_key, data);
            }
        }
        Ok(())
    }
}
