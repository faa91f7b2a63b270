//! IMAP folder synchronization and search engine
//!
//! This crate keeps a local mirror of IMAP mailboxes consistent with the
//! server and answers folder searches, locally when it can:
//! - Folder summaries, persisted through [`storage::SummaryStore`]
//! - A compressed message cache ([`storage::MessageCache`])
//! - Mailbox binding with UIDVALIDITY invalidation
//! - Search expressions translated to IMAP UID SEARCH, with a per-folder
//!   result cache and a local evaluator
//! - Folder synchronization: flag push, moves to real junk/trash folders,
//!   expunge, append, fetch and quota
//! - A retry-once-on-reconnect wrapper around every server call
//!
//! The wire protocol is not part of this crate: callers provide a
//! [`Connection`] and a [`ConnectionManager`]. Every operation blocks the
//! calling thread and all types are `Send + Sync`.

pub mod config;
pub mod connection;
pub mod error;
pub mod folder;
pub mod models;
pub mod search;
pub mod storage;
pub mod store;

pub use config::StoreSettings;
pub use connection::{
    CancellationToken, Connection, ConnectionManager, NoopHook, OperationHook, RetryContext,
    retry_once,
};
pub use error::{Error, Result};
pub use folder::{ChangeLog, Folder, FolderObserver, MoveTarget, RefreshReport, Summary};
pub use models::{
    ChangeSet, FlagUpdate, Mailbox, MailboxChanges, MailboxListing, MessageFlags, MessageInfo,
    QuotaInfo, QuotaReport, SummaryRecord, Uid,
};
pub use search::{EvaluationMode, Evaluator, Expression, LocalMatcher, SearchCriteria};
pub use storage::{
    CacheKey, CacheNamespace, FileMessageCache, InMemoryMessageCache, InMemorySummaryStore,
    MessageCache, SqliteSummaryStore, SummaryStore,
};
pub use store::{Store, StoreBuilder};
