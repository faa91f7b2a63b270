//! Change notifications and flag updates exchanged with the server

use super::{MessageFlags, MessageInfo, Uid};
use crate::error::Result;

/// UIDs added, changed and removed by one folder operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<Uid>,
    pub changed: Vec<Uid>,
    pub removed: Vec<Uid>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn add(&mut self, uid: Uid) {
        if !self.added.contains(&uid) {
            self.added.push(uid);
        }
    }

    pub fn change(&mut self, uid: Uid) {
        if !self.added.contains(&uid) && !self.changed.contains(&uid) {
            self.changed.push(uid);
        }
    }

    /// Record a removal; a UID that is gone is no longer added or changed
    pub fn remove(&mut self, uid: Uid) {
        self.added.retain(|u| *u != uid);
        self.changed.retain(|u| *u != uid);
        if !self.removed.contains(&uid) {
            self.removed.push(uid);
        }
    }

    pub fn merge(&mut self, other: ChangeSet) {
        for uid in other.added {
            self.add(uid);
        }
        for uid in other.changed {
            self.change(uid);
        }
        for uid in other.removed {
            self.remove(uid);
        }
    }
}

/// Flags to add and remove on one message (UID STORE +FLAGS / -FLAGS)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagUpdate {
    pub uid: Uid,
    pub set: MessageFlags,
    pub unset: MessageFlags,
}

/// Result of an incremental fetch against a mailbox
#[derive(Debug, Default)]
pub struct MailboxChanges {
    /// UIDVALIDITY reported on SELECT, 0 if unknown
    pub uidvalidity: u32,
    /// New or updated messages; an entry fails when the server sent something unusable
    pub records: Vec<Result<MessageInfo>>,
    /// UIDs the server no longer has
    pub vanished: Vec<Uid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_wins_over_added() {
        let mut changes = ChangeSet::new();
        changes.add(Uid(1));
        changes.change(Uid(2));
        changes.remove(Uid(1));
        changes.remove(Uid(2));
        assert!(changes.added.is_empty());
        assert!(changes.changed.is_empty());
        assert_eq!(changes.removed, vec![Uid(1), Uid(2)]);
    }

    #[test]
    fn test_added_is_not_also_changed() {
        let mut changes = ChangeSet::new();
        changes.add(Uid(5));
        changes.change(Uid(5));
        assert_eq!(changes.added, vec![Uid(5)]);
        assert!(changes.changed.is_empty());
    }

    #[test]
    fn test_merge() {
        let mut first = ChangeSet::new();
        first.add(Uid(1));
        let mut second = ChangeSet::new();
        second.change(Uid(2));
        second.remove(Uid(3));
        first.merge(second);
        assert_eq!(first.added, vec![Uid(1)]);
        assert_eq!(first.changed, vec![Uid(2)]);
        assert_eq!(first.removed, vec![Uid(3)]);
        assert!(!first.is_empty());
    }
}
