//! Connection trait definitions

use std::sync::Arc;

use crate::error::Result;
use crate::models::{
    FlagUpdate, Mailbox, MailboxChanges, MailboxListing, MessageFlags, QuotaReport, Uid,
};

/// A live IMAP session able to run commands against one mailbox at a time
///
/// Implementations own the wire protocol (command pipelining, literals,
/// SELECT state). Every method blocks the calling thread. A dropped
/// connection must be reported as [`crate::Error::TransportLost`] so the
/// caller can reconnect and retry once.
pub trait Connection: Send + Sync {
    /// LIST mailboxes matching `pattern`
    fn list(&self, pattern: &str) -> Result<Vec<MailboxListing>>;

    /// UID SEARCH with already-rendered criteria
    fn search(&self, mailbox: &Mailbox, criteria: &str) -> Result<Vec<Uid>>;

    /// Fetch new and updated messages plus vanished UIDs
    ///
    /// `known` lists the UIDs the local summary trusts; anything else the
    /// server holds should be reported in full.
    fn fetch_changes(&self, mailbox: &Mailbox, known: &[Uid]) -> Result<MailboxChanges>;

    /// UID STORE the given flag changes
    fn sync_changes(&self, mailbox: &Mailbox, updates: &[FlagUpdate]) -> Result<()>;

    /// EXPUNGE, returning the UIDs that were removed
    fn expunge(&self, mailbox: &Mailbox) -> Result<Vec<Uid>>;

    /// UID COPY (or MOVE when `delete_originals` is set), returning destination UIDs
    fn copy(
        &self,
        source: &Mailbox,
        destination: &Mailbox,
        uids: &[Uid],
        delete_originals: bool,
    ) -> Result<Vec<Uid>>;

    /// APPEND a message, returning the UID the server assigned
    fn append(&self, mailbox: &Mailbox, message: &[u8], flags: MessageFlags) -> Result<Uid>;

    /// UID FETCH the full message source
    fn get_message(&self, mailbox: &Mailbox, uid: Uid) -> Result<Vec<u8>>;

    /// GETQUOTAROOT for the mailbox
    fn refresh_quota(&self, mailbox: &Mailbox) -> Result<QuotaReport>;
}

/// Hands out connections and takes back broken ones
pub trait ConnectionManager: Send + Sync {
    /// Get a connection suitable for operating on `folder_path`
    fn acquire(&self, folder_path: &str) -> Result<Arc<dyn Connection>>;

    /// Drop a connection that reported a lost transport
    fn discard(&self, connection: &Arc<dyn Connection>);
}

/// Lifecycle hook signalled around every connection attempt
///
/// Used by schedulers to keep one busy folder from starving the others.
pub trait OperationHook: Send + Sync {
    fn op_started(&self, folder_path: &str);

    fn op_finished(&self, folder_path: &str, succeeded: bool);
}

/// Hook that ignores every signal
pub struct NoopHook;

impl OperationHook for NoopHook {
    fn op_started(&self, _folder_path: &str) {}

    fn op_finished(&self, _folder_path: &str, _succeeded: bool) {}
}
