//! Folder synchronization: refresh, flag push, real-folder moves and expunge

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};

use super::{Folder, MergeOutcome, MoveTarget};
use crate::connection::{CancellationToken, Connection};
use crate::error::{Error, Result};
use crate::models::{ChangeSet, Mailbox, MessageFlags, Uid, same_mailbox_name};

/// Outcome of a refresh
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// What the merge did to the summary
    pub changes: ChangeSet,
    /// Records the server sent that could not be merged
    pub errors: Vec<Error>,
    pub duration_ms: u64,
}

impl Folder {
    /// Fetch changes from the server and merge them into the summary
    ///
    /// No-op while offline. Per-message failures are collected in the report
    /// instead of aborting the merge. Cancellation is honoured before the
    /// merge starts, never in the middle of it.
    pub fn refresh_info(&self, cancel: &CancellationToken) -> Result<RefreshReport> {
        let start = Instant::now();
        let mut report = RefreshReport::default();

        if !self.store.is_online() {
            debug!("[SYNC] Offline, skipping refresh of {}", self.path());
            return Ok(report);
        }

        // 1. Fetch what changed since the UIDs we trust
        let (mailbox, changes) = self.with_connection(cancel, |conn| {
            let mailbox = self.list_mailbox(conn)?;
            let known = self.summary.known_uids();
            let changes = conn.fetch_changes(&mailbox, &known)?;
            Ok((mailbox, changes))
        })?;

        cancel.check()?;

        // 2. A new epoch reported on SELECT invalidates before merging
        let mut invalidated = false;
        if changes.uidvalidity != 0 && changes.uidvalidity != mailbox.uidvalidity() {
            mailbox.set_uidvalidity(changes.uidvalidity);
            invalidated = self.summary.uidvalidity() != 0;
            self.set_mailbox(&mailbox)?;
        }

        // 3. Merge
        for record in changes.records {
            match record {
                Ok(info) => {
                    let uid = info.uid;
                    match self.summary.merge(info) {
                        MergeOutcome::Added => report.changes.add(uid),
                        MergeOutcome::Changed => report.changes.change(uid),
                        MergeOutcome::Unchanged => {}
                    }
                }
                Err(e) => {
                    warn!("[SYNC] Skipping unusable record in {}: {}", self.path(), e);
                    report.errors.push(e);
                }
            }
        }

        for uid in changes.vanished {
            if self.summary.remove(uid).is_some() {
                report.changes.remove(uid);
            }
        }

        // Stale entries were not in `known`, so the server reported all it
        // has; anything still stale is gone
        if !invalidated {
            for uid in self.summary.remove_stale() {
                report.changes.remove(uid);
            }
        }

        // 4. Persist the completed merge, then tell observers
        self.summary.touch();
        self.save_summary()?;
        self.notify(report.changes.clone());

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "[SYNC] Refreshed {}: {} added, {} changed, {} removed, {} errors in {}ms",
            self.path(),
            report.changes.added.len(),
            report.changes.changed.len(),
            report.changes.removed.len(),
            report.errors.len(),
            report.duration_ms
        );
        Ok(report)
    }

    /// Push local changes to the server
    ///
    /// Order: flag push (without deletions), junk move, trash move, inbox
    /// move, then expunge. Any move forces the expunge; `expunge` requests
    /// it regardless. No-op while offline.
    pub fn synchronize(&self, expunge: bool, cancel: &CancellationToken) -> Result<()> {
        if !self.store.is_online() {
            debug!("[SYNC] Offline, skipping synchronize of {}", self.path());
            return Ok(());
        }

        // 1. Queue moves implied by the pending flag changes, then push flags
        self.queue_flagged_moves();
        self.with_connection(cancel, |conn| {
            let mailbox = self.list_mailbox(conn)?;
            self.push_flags(conn, &mailbox, false)
        })?;

        // 2. Moves to real folders
        let mut need_expunge = self
            .move_to_real_junk(cancel)
            .map_err(|e| e.in_phase("Unable to move junk messages"))?;
        need_expunge |= self
            .move_to_real_trash(cancel)
            .map_err(|e| e.in_phase("Unable to move deleted messages"))?;
        need_expunge |= self
            .move_to_inbox(cancel)
            .map_err(|e| e.in_phase("Unable to move messages to Inbox"))?;

        // 3. Expunge; pushes flags again, deletions included
        if need_expunge || expunge {
            self.expunge_remote(cancel)?;
        } else {
            self.save_summary()?;
        }

        Ok(())
    }

    /// Remove deleted messages on the server and from the summary
    ///
    /// In the real trash folder of a store without virtual trash, every
    /// message is marked deleted first. Returns the expunged UIDs.
    pub fn expunge(&self, cancel: &CancellationToken) -> Result<Vec<Uid>> {
        if !self.store.is_online() {
            return Err(Error::Offline);
        }

        if self.is_real_trash_folder() && !self.store.settings().has_virtual_trash {
            for uid in self.summary.uids() {
                self.summary.set_flags(uid, MessageFlags::DELETED, true);
            }
        }

        self.expunge_remote(cancel)
    }

    /// Push flags with deletions, EXPUNGE, and prune what the server removed
    fn expunge_remote(&self, cancel: &CancellationToken) -> Result<Vec<Uid>> {
        let expunged = self.with_connection(cancel, |conn| {
            let mailbox = self.list_mailbox(conn)?;
            self.push_flags(conn, &mailbox, true)?;
            conn.expunge(&mailbox)
        })?;

        let mut changes = ChangeSet::new();
        for uid in &expunged {
            if self.summary.remove(*uid).is_some() {
                changes.remove(*uid);
            }
        }

        self.save_summary()?;
        debug!("[SYNC] Expunged {} messages from {}", changes.removed.len(), self.path());
        self.notify(changes);
        Ok(expunged)
    }

    /// UID STORE the pending flag changes and mark them acknowledged
    fn push_flags(
        &self,
        conn: &dyn Connection,
        mailbox: &Mailbox,
        include_deleted: bool,
    ) -> Result<()> {
        let updates = self.summary.pending_updates(include_deleted);
        if updates.is_empty() {
            return Ok(());
        }

        debug!(
            "[SYNC] Pushing flag changes for {} messages in {}",
            updates.len(),
            self.path()
        );
        conn.sync_changes(mailbox, &updates)?;
        self.summary.acknowledge(&updates);
        Ok(())
    }

    /// Queue junk/trash/inbox moves for messages whose pending flags ask for one
    fn queue_flagged_moves(&self) {
        let settings = self.store.settings();
        let in_real_junk = self.is_real_junk_folder();
        let in_real_trash = self.is_real_trash_folder();

        for info in self.summary.snapshot() {
            if !info.has_pending_flags() {
                continue;
            }

            if settings.use_real_trash_path
                && !in_real_trash
                && info.flags.contains(MessageFlags::DELETED)
            {
                self.add_move_to_real_trash(info.uid);
            } else if settings.use_real_junk_path
                && !in_real_junk
                && info.flags.contains(MessageFlags::JUNK)
            {
                self.add_move_to_real_junk(info.uid);
            } else if in_real_junk && info.flags.contains(MessageFlags::NOTJUNK) {
                self.add_move_to_inbox(info.uid);
            }
        }
    }

    fn move_to_real_junk(&self, cancel: &CancellationToken) -> Result<bool> {
        let settings = self.store.settings();
        if !settings.use_real_junk_path {
            return Ok(false);
        }
        let destination = settings.junk_destination().map(str::to_string);
        self.move_pending(MoveTarget::RealJunk, destination, cancel)
    }

    fn move_to_real_trash(&self, cancel: &CancellationToken) -> Result<bool> {
        let settings = self.store.settings();
        if !settings.use_real_trash_path {
            return Ok(false);
        }
        let destination = settings.trash_destination().map(str::to_string);
        self.move_pending(MoveTarget::RealTrash, destination, cancel)
    }

    fn move_to_inbox(&self, cancel: &CancellationToken) -> Result<bool> {
        let destination = Some(self.store.settings().inbox_path.clone())
            .filter(|path| !path.is_empty());
        self.move_pending(MoveTarget::Inbox, destination, cancel)
    }

    /// Claim one pending set and copy-with-delete it to `destination`
    ///
    /// Returns whether an expunge is now needed. On failure the claimed UIDs
    /// go back into the set.
    fn move_pending(
        &self,
        target: MoveTarget,
        destination: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let uids = self.pending.lock().unwrap().claim(target);
        if uids.is_empty() {
            return Ok(false);
        }

        let result = self.copy_pending(target, &uids, destination, cancel);
        if result.is_err() {
            self.pending.lock().unwrap().restore(target, &uids);
        }
        result
    }

    fn copy_pending(
        &self,
        target: MoveTarget,
        uids: &[Uid],
        destination: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let destination = destination
            .ok_or_else(|| Error::PathInvalid("No destination folder specified".to_string()))?;

        if same_mailbox_name(&destination, &self.path()) {
            debug!("[SYNC] {} is its own {:?} destination", destination, target);
            return Ok(target == MoveTarget::RealTrash);
        }

        let destination_folder = self.store.open_folder(&destination)?;
        let moved = self.with_connection(cancel, |conn| {
            let source = self.list_mailbox(conn)?;
            let target_mailbox = destination_folder.list_mailbox(conn)?;
            if Arc::ptr_eq(&source, &target_mailbox) {
                return Ok(false);
            }
            conn.copy(&source, &target_mailbox, uids, true)?;
            Ok(true)
        })?;

        if !moved {
            return Ok(target == MoveTarget::RealTrash);
        }

        // The server flagged the originals deleted as part of the move
        for uid in uids {
            self.summary.update(*uid, |info| {
                info.flags.insert(MessageFlags::DELETED);
                info.server_flags.insert(MessageFlags::DELETED);
            });
        }

        info!(
            "[SYNC] Moved {} messages from {} to {}",
            uids.len(),
            self.path(),
            destination
        );
        Ok(true)
    }
}
