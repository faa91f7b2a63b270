//! Message passthroughs backed by the local message cache

use std::sync::atomic::Ordering;

use chrono::Utc;
use log::{debug, warn};
use mail_parser::MessageParser;

use super::Folder;
use crate::connection::CancellationToken;
use crate::error::{Error, Result};
use crate::models::{ChangeSet, FlagUpdate, MessageFlags, MessageInfo, QuotaInfo, Uid};
use crate::search::raw_header;
use crate::storage::CacheKey;

/// Build a summary entry from a message source
fn info_from_source(uid: Uid, source: &[u8], flags: MessageFlags) -> MessageInfo {
    let mut builder = MessageInfo::builder(uid)
        .flags(flags)
        .size(source.len() as u32);

    if let Some(message) = MessageParser::default().parse(source) {
        let header = |name: &str| {
            raw_header(&message, name)
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };
        builder = builder
            .from(header("From"))
            .to(header("To"))
            .cc(header("Cc"))
            .subject(message.subject().unwrap_or_default());
        if message.attachment_count() > 0 {
            let mut info = builder.build();
            info.flags.insert(MessageFlags::ATTACHMENTS);
            return info;
        }
    }

    builder.build()
}

impl Folder {
    /// Upload a message, returning the UID the server assigned
    ///
    /// The source is staged in the pending-upload cache namespace and moved
    /// to the settled namespace under its UID once the server accepts it.
    pub fn append(
        &self,
        message: &[u8],
        flags: MessageFlags,
        cancel: &CancellationToken,
    ) -> Result<Uid> {
        if !self.store.is_online() {
            return Err(Error::Offline);
        }

        let path = self.path();
        let local_id = format!(
            "local-{}-{}",
            Utc::now().timestamp_millis(),
            self.append_seq.fetch_add(1, Ordering::Relaxed)
        );
        let pending_key = CacheKey::pending(&path, &local_id);
        self.store.cache().put(&pending_key, message)?;

        let uploaded = self.with_connection(cancel, |conn| {
            let mailbox = self.list_mailbox(conn)?;
            conn.append(&mailbox, message, flags & MessageFlags::SERVER)
        });
        let uid = match uploaded {
            Ok(uid) => uid,
            Err(e) => {
                self.store.cache().remove(&pending_key)?;
                return Err(e);
            }
        };

        // Settle the staged copy under its UID
        self.store.cache().put(&CacheKey::settled(&path, uid), message)?;
        self.store.cache().remove(&pending_key)?;

        self.summary.merge(info_from_source(uid, message, flags));
        self.save_summary()?;

        let mut changes = ChangeSet::new();
        changes.add(uid);
        self.notify(changes);

        debug!("[FOLDER] Appended message {} to {}", uid, path);
        Ok(uid)
    }

    /// Full source of one message, from the cache when possible
    ///
    /// A fetched message is cached and decoded once to refresh the
    /// attachments flag.
    pub fn get_message(&self, uid: Uid, cancel: &CancellationToken) -> Result<Vec<u8>> {
        if !self.summary.contains(uid) {
            return Err(Error::InvalidUid(uid.to_string()));
        }

        let path = self.path();
        let key = CacheKey::settled(&path, uid);
        if let Some(source) = self.store.cache().get(&key)? {
            return Ok(source);
        }

        if !self.store.is_online() {
            return Err(Error::Offline);
        }

        let source = self.with_connection(cancel, |conn| {
            let mailbox = self.list_mailbox(conn)?;
            conn.get_message(&mailbox, uid)
        })?;
        self.store.cache().put(&key, &source)?;

        let has_attachments = {
            let _guard = self.decode_lock.lock().unwrap();
            match MessageParser::default().parse(&source) {
                Some(message) => Some(message.attachment_count() > 0),
                None => {
                    warn!("[FOLDER] Could not decode message {} in {}", uid, path);
                    None
                }
            }
        };

        if let Some(has_attachments) = has_attachments
            && self
                .summary
                .set_flags(uid, MessageFlags::ATTACHMENTS, has_attachments)
        {
            let mut changes = ChangeSet::new();
            changes.change(uid);
            self.notify(changes);
        }

        Ok(source)
    }

    /// UIDs among `uids` whose source is not in the settled cache
    pub fn get_uncached_uids(&self, uids: &[Uid]) -> Result<Vec<Uid>> {
        let path = self.path();
        let mut uncached = Vec::new();
        for uid in uids {
            if !self.store.cache().exists(&CacheKey::settled(&path, *uid))? {
                uncached.push(*uid);
            }
        }
        Ok(uncached)
    }

    /// Copy (or move) messages to another folder, returning the new UIDs
    ///
    /// Cached sources follow the messages. Moved originals are flagged
    /// deleted and disappear on the next expunge.
    pub fn transfer_to(
        &self,
        destination: &Folder,
        uids: &[Uid],
        delete_originals: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<Uid>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        if !self.store.is_online() {
            return Err(Error::Offline);
        }

        let new_uids = self.with_connection(cancel, |conn| {
            let source = self.list_mailbox(conn)?;
            let target = destination.list_mailbox(conn)?;
            conn.copy(&source, &target, uids, delete_originals)
        })?;

        let source_path = self.path();
        let destination_path = destination.path();
        for (old_uid, new_uid) in uids.iter().zip(&new_uids) {
            if let Some(source) = self
                .store
                .cache()
                .get(&CacheKey::settled(&source_path, *old_uid))?
            {
                self.store
                    .cache()
                    .put(&CacheKey::settled(&destination_path, *new_uid), &source)?;
            }
        }

        if delete_originals {
            let updates: Vec<FlagUpdate> = uids
                .iter()
                .map(|uid| FlagUpdate {
                    uid: *uid,
                    set: MessageFlags::DELETED,
                    unset: MessageFlags::empty(),
                })
                .collect();
            let mut changes = ChangeSet::new();
            for update in &updates {
                if self.summary.set_flags(update.uid, MessageFlags::DELETED, true) {
                    changes.change(update.uid);
                }
            }
            self.summary.acknowledge(&updates);
            self.notify(changes);
        }

        Ok(new_uids)
    }

    /// Usage of the first quota root of this folder's mailbox
    pub fn get_quota_info(&self, cancel: &CancellationToken) -> Result<QuotaInfo> {
        if !self.store.is_online() {
            return Err(Error::Offline);
        }

        let mailbox = self.with_connection(cancel, |conn| {
            let mailbox = self.list_mailbox(conn)?;
            let report = conn.refresh_quota(&mailbox)?;
            mailbox.set_quota_roots(report.roots);
            for quota in report.quotas {
                self.store.cache_quota(quota);
            }
            Ok(mailbox)
        })?;

        mailbox
            .quota_roots()
            .first()
            .and_then(|root| self.store.quota(root))
            .ok_or_else(|| Error::NoQuota(self.path()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_from_source() {
        let source = b"From: Alice <alice@example.com>\r\n\
To: bob@example.com\r\n\
Subject: Hello there\r\n\
\r\n\
Hi Bob\r\n";

        let info = info_from_source(Uid(7), source, MessageFlags::SEEN);

        assert_eq!(info.uid, Uid(7));
        assert_eq!(info.from, "Alice <alice@example.com>");
        assert_eq!(info.to, "bob@example.com");
        assert_eq!(info.subject, "Hello there");
        assert_eq!(info.size, source.len() as u32);
        assert!(info.flags.contains(MessageFlags::SEEN));
        assert!(!info.flags.contains(MessageFlags::ATTACHMENTS));
    }

    #[test]
    fn test_info_from_garbage_keeps_uid_and_flags() {
        let info = info_from_source(Uid(1), b"", MessageFlags::DRAFT);
        assert_eq!(info.uid, Uid(1));
        assert!(info.flags.contains(MessageFlags::DRAFT));
    }
}
