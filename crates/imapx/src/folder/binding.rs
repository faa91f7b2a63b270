//! Mailbox binding and UIDVALIDITY invalidation

use std::sync::Arc;

use log::{debug, info};

use super::Folder;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::models::{ChangeSet, Mailbox, same_mailbox_name};
use crate::storage::CacheNamespace;

impl Folder {
    /// The bound mailbox, if the binding is still alive
    pub fn mailbox(&self) -> Option<Arc<Mailbox>> {
        self.binding.read().unwrap().upgrade()
    }

    /// Resolve the remote mailbox for this folder
    ///
    /// Tries the current binding, then the store's mailbox table, then a
    /// LIST on `connection`.
    pub fn list_mailbox(&self, connection: &dyn Connection) -> Result<Arc<Mailbox>> {
        // 1. Still bound
        if let Some(mailbox) = self.mailbox() {
            return Ok(mailbox);
        }

        let path = self.path();
        let name = self.store.mailbox_name(&path);

        // 2. Known to the store
        if let Some(mailbox) = self.store.mailbox(&name) {
            self.set_mailbox(&mailbox)?;
            return Ok(mailbox);
        }

        // 3. Ask the server
        debug!("[FOLDER] Listing mailbox {} for {}", name, path);
        let listing = connection
            .list(&name)?
            .into_iter()
            .find(|listing| same_mailbox_name(&listing.name, &name))
            .ok_or_else(|| Error::NoMailbox(path.clone()))?;

        let mailbox = self.store.register_mailbox(&listing);
        self.set_mailbox(&mailbox)?;
        Ok(mailbox)
    }

    /// Bind this folder to `mailbox`
    ///
    /// Binding a different mailbox clears the search cache. A UIDVALIDITY
    /// that differs from the summary's recorded value invalidates the
    /// local cache; a summary that never recorded one adopts it.
    pub fn set_mailbox(&self, mailbox: &Arc<Mailbox>) -> Result<()> {
        let rebound = {
            let mut binding = self.binding.write().unwrap();
            let same = binding
                .upgrade()
                .is_some_and(|current| Arc::ptr_eq(&current, mailbox));
            if !same {
                *binding = Arc::downgrade(mailbox);
            }
            !same
        };

        if rebound {
            debug!("[FOLDER] {} bound to mailbox {}", self.path(), mailbox.name());
            self.search_cache.clear();
        }

        let remote = mailbox.uidvalidity();
        let recorded = self.summary.uidvalidity();
        if remote == 0 || remote == recorded {
            return Ok(());
        }

        if recorded == 0 {
            self.summary.set_uidvalidity(remote);
            return self.save_summary();
        }

        self.invalidate_local_cache(remote)
    }

    /// Drop everything cached for the previous UIDVALIDITY epoch
    ///
    /// Every summary entry is marked changed (stale until the server reports
    /// it again), both message cache namespaces and the search cache are
    /// cleared, and the new UIDVALIDITY is saved.
    pub fn invalidate_local_cache(&self, uidvalidity: u32) -> Result<()> {
        let path = self.path();
        info!(
            "[FOLDER] UIDVALIDITY of {} changed {} -> {}, dropping local cache",
            path,
            self.summary.uidvalidity(),
            uidvalidity
        );

        // 1. Nothing in the summary is trusted any more
        let uids = self.summary.mark_all_stale();

        // 2. Record the new epoch
        self.summary.set_uidvalidity(uidvalidity);
        self.summary.touch();

        // 3. Clear cached messages and search results
        self.store.cache().clear(&path, CacheNamespace::Settled)?;
        self.store.cache().clear(&path, CacheNamespace::PendingUpload)?;
        self.search_cache.clear();

        // 4. Persist before anything reads the new state
        self.save_summary()?;

        let mut changes = ChangeSet::new();
        for uid in uids {
            changes.change(uid);
        }
        self.notify(changes);
        Ok(())
    }
}
