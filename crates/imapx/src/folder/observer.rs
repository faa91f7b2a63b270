//! Folder change observers

use std::sync::Mutex;

use crate::models::ChangeSet;

/// Receives a folder's change notifications
///
/// Called synchronously on the thread that completed the operation, after
/// the summary reflects the change.
pub trait FolderObserver: Send + Sync {
    fn folder_changed(&self, folder_path: &str, changes: &ChangeSet);
}

/// Observer that keeps every notification, in delivery order
#[derive(Default)]
pub struct ChangeLog {
    entries: Mutex<Vec<(String, ChangeSet)>>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(String, ChangeSet)> {
        self.entries.lock().unwrap().clone()
    }

    /// All notifications folded into one change set
    pub fn merged(&self) -> ChangeSet {
        let mut merged = ChangeSet::new();
        for (_, changes) in self.entries.lock().unwrap().iter() {
            merged.merge(changes.clone());
        }
        merged
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl FolderObserver for ChangeLog {
    fn folder_changed(&self, folder_path: &str, changes: &ChangeSet) {
        self.entries
            .lock()
            .unwrap()
            .push((folder_path.to_string(), changes.clone()));
    }
}
