//! IMAP folder: local summary, mailbox binding, search and synchronization
//!
//! A [`Folder`] is opened through [`crate::Store::open_folder`]. Every
//! remote call goes through the store's retry-once wrapper and re-resolves
//! the mailbox binding on each attempt.

mod binding;
mod messages;
mod observer;
mod search;
mod summary;
mod sync;

pub use observer::{ChangeLog, FolderObserver};
pub use summary::{MergeOutcome, Summary};
pub use sync::RefreshReport;

use std::collections::BTreeSet;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, RwLock, Weak};

use log::{debug, warn};

use crate::connection::{CancellationToken, Connection};
use crate::error::Result;
use crate::models::{ChangeSet, Mailbox, MessageFlags, Uid, same_mailbox_name};
use crate::search::SearchResultCache;
use crate::storage::CacheKey;
use crate::store::Store;

/// Where a pending move sends its messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveTarget {
    RealJunk,
    RealTrash,
    Inbox,
}

/// UIDs waiting for copy-then-delete; a UID sits in at most one set
#[derive(Debug, Default)]
struct PendingMoves {
    to_real_junk: BTreeSet<Uid>,
    to_real_trash: BTreeSet<Uid>,
    to_inbox: BTreeSet<Uid>,
}

impl PendingMoves {
    fn set_mut(&mut self, target: MoveTarget) -> &mut BTreeSet<Uid> {
        match target {
            MoveTarget::RealJunk => &mut self.to_real_junk,
            MoveTarget::RealTrash => &mut self.to_real_trash,
            MoveTarget::Inbox => &mut self.to_inbox,
        }
    }

    fn add(&mut self, target: MoveTarget, uid: Uid) {
        self.forget(uid);
        self.set_mut(target).insert(uid);
    }

    fn forget(&mut self, uid: Uid) {
        self.to_real_junk.remove(&uid);
        self.to_real_trash.remove(&uid);
        self.to_inbox.remove(&uid);
    }

    /// Take every UID of one set, leaving it empty
    fn claim(&mut self, target: MoveTarget) -> Vec<Uid> {
        std::mem::take(self.set_mut(target)).into_iter().collect()
    }

    /// Put back UIDs from a failed move unless they were re-targeted meanwhile
    fn restore(&mut self, target: MoveTarget, uids: &[Uid]) {
        for uid in uids {
            if !self.to_real_junk.contains(uid)
                && !self.to_real_trash.contains(uid)
                && !self.to_inbox.contains(uid)
            {
                self.set_mut(target).insert(*uid);
            }
        }
    }
}

/// A local proxy for one remote IMAP mailbox
pub struct Folder {
    store: Arc<Store>,
    path: RwLock<String>,
    summary: Summary,
    /// Non-owning; the store's mailbox table owns the mailbox
    binding: RwLock<Weak<Mailbox>>,
    search_cache: SearchResultCache,
    pending: Mutex<PendingMoves>,
    decode_lock: Mutex<()>,
    append_seq: AtomicU64,
    observers: RwLock<Vec<Arc<dyn FolderObserver>>>,
}

impl Folder {
    pub(crate) fn new(store: Arc<Store>, path: &str, summary: Summary) -> Self {
        Self {
            store,
            path: RwLock::new(path.to_string()),
            summary,
            binding: RwLock::new(Weak::new()),
            search_cache: SearchResultCache::new(),
            pending: Mutex::new(PendingMoves::default()),
            decode_lock: Mutex::new(()),
            append_seq: AtomicU64::new(0),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Full folder path, e.g. `INBOX` or `Lists/rust`
    pub fn path(&self) -> String {
        self.path.read().unwrap().clone()
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn search_cache(&self) -> &SearchResultCache {
        &self.search_cache
    }

    pub fn subscribe(&self, observer: Arc<dyn FolderObserver>) {
        self.observers.write().unwrap().push(observer);
    }

    /// Whether this folder is the configured real junk folder
    pub fn is_real_junk_folder(&self) -> bool {
        self.store
            .settings()
            .junk_destination()
            .is_some_and(|junk| same_mailbox_name(junk, &self.path()))
    }

    /// Whether this folder is the configured real trash folder
    pub fn is_real_trash_folder(&self) -> bool {
        self.store
            .settings()
            .trash_destination()
            .is_some_and(|trash| same_mailbox_name(trash, &self.path()))
    }

    /// Set or clear local flags on one message
    ///
    /// The change reaches the server on the next `synchronize`. Returns
    /// whether the flags changed.
    pub fn set_message_flags(&self, uid: Uid, mask: MessageFlags, value: bool) -> bool {
        let changed = self.summary.set_flags(uid, mask, value);
        if changed {
            let mut changes = ChangeSet::new();
            changes.change(uid);
            self.notify(changes);
        }
        changed
    }

    /// Queue a message for the real junk folder; false if the UID is unknown
    pub fn add_move_to_real_junk(&self, uid: Uid) -> bool {
        self.add_move(MoveTarget::RealJunk, uid)
    }

    /// Queue a message for the real trash folder; false if the UID is unknown
    pub fn add_move_to_real_trash(&self, uid: Uid) -> bool {
        self.add_move(MoveTarget::RealTrash, uid)
    }

    /// Queue a message for the inbox; false if the UID is unknown
    pub fn add_move_to_inbox(&self, uid: Uid) -> bool {
        self.add_move(MoveTarget::Inbox, uid)
    }

    fn add_move(&self, target: MoveTarget, uid: Uid) -> bool {
        if !self.summary.contains(uid) {
            return false;
        }
        self.pending.lock().unwrap().add(target, uid);
        true
    }

    /// UIDs currently queued for one move target
    pub fn pending_moves(&self, target: MoveTarget) -> Vec<Uid> {
        self.pending
            .lock()
            .unwrap()
            .set_mut(target)
            .iter()
            .copied()
            .collect()
    }

    /// Re-key this folder under a new path after the server-side rename
    ///
    /// Observers and pending moves are kept; the binding and search cache
    /// are dropped because the path now names a different mailbox.
    pub fn rename(&self, new_path: &str) -> Result<()> {
        let old_path = self.path();
        if old_path == new_path {
            return Ok(());
        }

        self.store.summaries().rename(&old_path, new_path)?;
        self.store.cache().rename_folder(&old_path, new_path)?;
        self.store.rename_folder_entry(&old_path, new_path);

        *self.path.write().unwrap() = new_path.to_string();
        *self.binding.write().unwrap() = Weak::new();
        self.search_cache.clear();

        debug!("[FOLDER] Renamed {} to {}", old_path, new_path);
        Ok(())
    }

    /// Run `op` through the store's retry-once wrapper for this folder
    pub(crate) fn with_connection<T>(
        &self,
        cancel: &CancellationToken,
        op: impl FnMut(&dyn Connection) -> Result<T>,
    ) -> Result<T> {
        self.store.with_connection(&self.path(), cancel, op)
    }

    /// Persist the summary
    pub(crate) fn save_summary(&self) -> Result<()> {
        self.store
            .summaries()
            .save(&self.path(), &self.summary.to_record())?;
        Ok(())
    }

    /// Deliver a change set to observers; removals also drop pending moves
    /// and cached message files
    pub(crate) fn notify(&self, changes: ChangeSet) {
        if changes.is_empty() {
            return;
        }

        let path = self.path();
        if !changes.removed.is_empty() {
            {
                let mut pending = self.pending.lock().unwrap();
                for uid in &changes.removed {
                    pending.forget(*uid);
                }
            }
            for uid in &changes.removed {
                if let Err(e) = self.store.cache().remove(&CacheKey::settled(&path, *uid)) {
                    warn!("[FOLDER] Failed to purge cached message {} in {}: {}", uid, path, e);
                }
            }
        }

        let observers = self.observers.read().unwrap().clone();
        for observer in observers {
            observer.folder_changed(&path, &changes);
        }
    }
}
