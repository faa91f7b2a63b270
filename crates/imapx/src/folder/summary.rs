//! In-memory folder summary: UID-ordered MessageInfo records plus the
//! UIDVALIDITY they belong to

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::models::{FlagUpdate, MessageFlags, MessageInfo, SummaryRecord, Uid};

/// How a server record changed the summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Added,
    Changed,
    Unchanged,
}

#[derive(Debug, Default)]
struct SummaryState {
    uidvalidity: u32,
    last_refresh_at: Option<DateTime<Utc>>,
    messages: BTreeMap<Uid, MessageInfo>,
}

/// Folder summary, safe to share between threads
///
/// Readers get snapshots; nothing iterates under the lock.
#[derive(Debug, Default)]
pub struct Summary {
    state: RwLock<SummaryState>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_record(record: SummaryRecord) -> Self {
        let messages = record
            .messages
            .into_iter()
            .map(|info| (info.uid, info))
            .collect();
        Self {
            state: RwLock::new(SummaryState {
                uidvalidity: record.uidvalidity,
                last_refresh_at: record.last_refresh_at,
                messages,
            }),
        }
    }

    pub fn to_record(&self) -> SummaryRecord {
        let state = self.state.read().unwrap();
        SummaryRecord {
            uidvalidity: state.uidvalidity,
            last_refresh_at: state.last_refresh_at,
            messages: state.messages.values().cloned().collect(),
        }
    }

    /// Copy of every MessageInfo, ascending by UID
    pub fn snapshot(&self) -> Vec<MessageInfo> {
        self.state.read().unwrap().messages.values().cloned().collect()
    }

    pub fn uids(&self) -> Vec<Uid> {
        self.state.read().unwrap().messages.keys().copied().collect()
    }

    /// UIDs still trusted in the current epoch
    pub fn known_uids(&self) -> Vec<Uid> {
        self.state
            .read()
            .unwrap()
            .messages
            .values()
            .filter(|info| !info.stale)
            .map(|info| info.uid)
            .collect()
    }

    pub fn get(&self, uid: Uid) -> Option<MessageInfo> {
        self.state.read().unwrap().messages.get(&uid).cloned()
    }

    pub fn contains(&self, uid: Uid) -> bool {
        self.state.read().unwrap().messages.contains_key(&uid)
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn uidvalidity(&self) -> u32 {
        self.state.read().unwrap().uidvalidity
    }

    pub fn set_uidvalidity(&self, uidvalidity: u32) {
        self.state.write().unwrap().uidvalidity = uidvalidity;
    }

    pub fn last_refresh_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().unwrap().last_refresh_at
    }

    pub fn touch(&self) {
        self.state.write().unwrap().last_refresh_at = Some(Utc::now());
    }

    /// Messages carrying the deleted flag locally
    pub fn deleted_count(&self) -> usize {
        self.state
            .read()
            .unwrap()
            .messages
            .values()
            .filter(|info| info.flags.contains(MessageFlags::DELETED))
            .count()
    }

    /// Merge a record reported by the server
    ///
    /// Local flag changes not yet pushed survive the merge; the local-only
    /// attachments flag is kept.
    pub fn merge(&self, record: MessageInfo) -> MergeOutcome {
        let mut state = self.state.write().unwrap();
        let server_flags = record.flags & MessageFlags::SERVER;

        match state.messages.get_mut(&record.uid) {
            Some(existing) => {
                let local_set = existing.flags_to_set();
                let local_unset = existing.flags_to_unset();
                let attachments = existing.flags & MessageFlags::ATTACHMENTS;

                let merged = MessageInfo {
                    flags: ((server_flags | local_set) & !local_unset) | attachments,
                    server_flags,
                    stale: false,
                    ..record
                };

                if *existing == merged {
                    MergeOutcome::Unchanged
                } else {
                    *existing = merged;
                    MergeOutcome::Changed
                }
            }
            None => {
                let info = MessageInfo {
                    server_flags,
                    stale: false,
                    ..record
                };
                state.messages.insert(info.uid, info);
                MergeOutcome::Added
            }
        }
    }

    /// Apply `update` to one message; false when the UID is unknown
    pub fn update(&self, uid: Uid, update: impl FnOnce(&mut MessageInfo)) -> bool {
        match self.state.write().unwrap().messages.get_mut(&uid) {
            Some(info) => {
                update(info);
                true
            }
            None => false,
        }
    }

    /// Set or clear local flags; returns whether anything changed
    pub fn set_flags(&self, uid: Uid, mask: MessageFlags, value: bool) -> bool {
        let mut changed = false;
        self.update(uid, |info| {
            let before = info.flags;
            info.flags.set(mask, value);
            changed = before != info.flags;
        });
        changed
    }

    pub fn remove(&self, uid: Uid) -> Option<MessageInfo> {
        self.state.write().unwrap().messages.remove(&uid)
    }

    /// Mark every message stale and return all UIDs
    pub fn mark_all_stale(&self) -> Vec<Uid> {
        let mut state = self.state.write().unwrap();
        for info in state.messages.values_mut() {
            info.stale = true;
        }
        state.messages.keys().copied().collect()
    }

    /// Drop messages the server did not re-report after an epoch change
    pub fn remove_stale(&self) -> Vec<Uid> {
        let mut state = self.state.write().unwrap();
        let stale: Vec<Uid> = state
            .messages
            .values()
            .filter(|info| info.stale)
            .map(|info| info.uid)
            .collect();
        for uid in &stale {
            state.messages.remove(uid);
        }
        stale
    }

    /// Flag changes waiting to be pushed
    ///
    /// Without `include_deleted` the deleted flag is held back so that a
    /// later junk/trash move can still claim the message.
    pub fn pending_updates(&self, include_deleted: bool) -> Vec<FlagUpdate> {
        let state = self.state.read().unwrap();
        state
            .messages
            .values()
            .filter(|info| info.has_pending_flags())
            .filter_map(|info| {
                let mut set = info.flags_to_set();
                let mut unset = info.flags_to_unset();
                if !include_deleted {
                    set.remove(MessageFlags::DELETED);
                    unset.remove(MessageFlags::DELETED);
                }
                if set.is_empty() && unset.is_empty() {
                    None
                } else {
                    Some(FlagUpdate {
                        uid: info.uid,
                        set,
                        unset,
                    })
                }
            })
            .collect()
    }

    /// Record pushed flag changes as acknowledged by the server
    pub fn acknowledge(&self, updates: &[FlagUpdate]) {
        let mut state = self.state.write().unwrap();
        for update in updates {
            if let Some(info) = state.messages.get_mut(&update.uid) {
                info.server_flags = (info.server_flags | update.set) & !update.unset;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(uid: u32, flags: MessageFlags) -> MessageInfo {
        MessageInfo::builder(Uid(uid))
            .subject(format!("message {}", uid))
            .flags(flags)
            .build()
    }

    #[test]
    fn test_record_round_trip_keeps_order() {
        let record = SummaryRecord::new(
            9,
            vec![info(3, MessageFlags::empty()), info(1, MessageFlags::SEEN)],
        );

        let summary = Summary::from_record(record);

        assert_eq!(summary.uids(), vec![Uid(1), Uid(3)]);
        assert_eq!(summary.to_record().uidvalidity, 9);
    }

    #[test]
    fn test_merge_added_changed_unchanged() {
        let summary = Summary::new();
        assert_eq!(summary.merge(info(1, MessageFlags::empty())), MergeOutcome::Added);
        assert_eq!(summary.merge(info(1, MessageFlags::empty())), MergeOutcome::Unchanged);
        assert_eq!(summary.merge(info(1, MessageFlags::SEEN)), MergeOutcome::Changed);
        assert_eq!(summary.len(), 1);
    }

    #[test]
    fn test_merge_preserves_pending_local_flags() {
        let summary = Summary::new();
        summary.merge(info(1, MessageFlags::SEEN));
        summary.set_flags(Uid(1), MessageFlags::FLAGGED, true);
        summary.set_flags(Uid(1), MessageFlags::SEEN, false);
        summary.update(Uid(1), |i| i.flags.insert(MessageFlags::ATTACHMENTS));

        // Server still reports the old state plus a new answered flag
        summary.merge(info(1, MessageFlags::SEEN | MessageFlags::ANSWERED));

        let merged = summary.get(Uid(1)).unwrap();
        assert!(merged.flags.contains(MessageFlags::FLAGGED));
        assert!(merged.flags.contains(MessageFlags::ANSWERED));
        assert!(merged.flags.contains(MessageFlags::ATTACHMENTS));
        assert!(!merged.flags.contains(MessageFlags::SEEN));
        assert_eq!(merged.server_flags, MessageFlags::SEEN | MessageFlags::ANSWERED);
    }

    #[test]
    fn test_pending_updates_hold_back_deleted() {
        let summary = Summary::new();
        summary.merge(info(1, MessageFlags::empty()));
        summary.merge(info(2, MessageFlags::empty()));
        summary.set_flags(Uid(1), MessageFlags::DELETED, true);
        summary.set_flags(Uid(2), MessageFlags::SEEN | MessageFlags::DELETED, true);

        let without = summary.pending_updates(false);
        assert_eq!(without.len(), 1);
        assert_eq!(without[0].uid, Uid(2));
        assert_eq!(without[0].set, MessageFlags::SEEN);

        let with = summary.pending_updates(true);
        assert_eq!(with.len(), 2);
        assert_eq!(summary.deleted_count(), 2);
    }

    #[test]
    fn test_acknowledge_clears_pending() {
        let summary = Summary::new();
        summary.merge(info(1, MessageFlags::SEEN));
        summary.set_flags(Uid(1), MessageFlags::SEEN, false);
        summary.set_flags(Uid(1), MessageFlags::FLAGGED, true);

        let updates = summary.pending_updates(true);
        summary.acknowledge(&updates);

        assert!(summary.pending_updates(true).is_empty());
        assert!(!summary.get(Uid(1)).unwrap().has_pending_flags());
    }

    #[test]
    fn test_stale_lifecycle() {
        let summary = Summary::new();
        summary.merge(info(1, MessageFlags::empty()));
        summary.merge(info(2, MessageFlags::empty()));

        assert_eq!(summary.mark_all_stale(), vec![Uid(1), Uid(2)]);
        assert!(summary.known_uids().is_empty());

        summary.merge(info(2, MessageFlags::empty()));
        assert_eq!(summary.known_uids(), vec![Uid(2)]);

        assert_eq!(summary.remove_stale(), vec![Uid(1)]);
        assert_eq!(summary.uids(), vec![Uid(2)]);
    }

    #[test]
    fn test_set_flags_unknown_uid() {
        let summary = Summary::new();
        assert!(!summary.set_flags(Uid(4), MessageFlags::SEEN, true));
        assert!(!summary.update(Uid(4), |_| {}));
    }
}
