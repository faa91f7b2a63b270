//! Persisted form of a folder summary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MessageInfo;

/// Snapshot of one folder's summary as written to a summary store
///
/// Saved only after invalidation or after a completed merge, never
/// while a merge is in progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    /// UIDVALIDITY the message UIDs belong to, 0 if never bound
    pub uidvalidity: u32,
    /// When the folder last completed a refresh
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub messages: Vec<MessageInfo>,
}

impl SummaryRecord {
    pub fn new(uidvalidity: u32, messages: Vec<MessageInfo>) -> Self {
        Self {
            uidvalidity,
            last_refresh_at: None,
            messages,
        }
    }
}
