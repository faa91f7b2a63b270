//! Remote mailbox identity and quota records

use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

/// A remote IMAP mailbox as known to the live connection
///
/// Owned by the store's mailbox table. Folders only hold a weak
/// reference, so clearing the table unbinds every folder at once.
#[derive(Debug)]
pub struct Mailbox {
    name: String,
    uidvalidity: AtomicU32,
    quota_roots: RwLock<Vec<String>>,
}

impl Mailbox {
    pub fn new(name: impl Into<String>, uidvalidity: u32) -> Self {
        Self {
            name: name.into(),
            uidvalidity: AtomicU32::new(uidvalidity),
            quota_roots: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// UIDVALIDITY epoch, 0 when the server has not reported one yet
    pub fn uidvalidity(&self) -> u32 {
        self.uidvalidity.load(Ordering::SeqCst)
    }

    pub fn set_uidvalidity(&self, uidvalidity: u32) {
        self.uidvalidity.store(uidvalidity, Ordering::SeqCst);
    }

    pub fn quota_roots(&self) -> Vec<String> {
        self.quota_roots.read().unwrap().clone()
    }

    pub fn set_quota_roots(&self, roots: Vec<String>) {
        *self.quota_roots.write().unwrap() = roots;
    }

    /// Whether `name` refers to this mailbox (INBOX is case-insensitive)
    pub fn is_named(&self, name: &str) -> bool {
        same_mailbox_name(&self.name, name)
    }
}

/// Whether two mailbox names or folder paths refer to the same mailbox
///
/// Names compare exactly, except that every spelling of INBOX is INBOX.
pub fn same_mailbox_name(a: &str, b: &str) -> bool {
    a == b || (a.eq_ignore_ascii_case("INBOX") && b.eq_ignore_ascii_case("INBOX"))
}

/// A LIST response entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxListing {
    pub name: String,
    pub uidvalidity: u32,
}

impl MailboxListing {
    pub fn new(name: impl Into<String>, uidvalidity: u32) -> Self {
        Self {
            name: name.into(),
            uidvalidity,
        }
    }
}

/// Usage of one quota root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaInfo {
    pub root: String,
    pub used: u64,
    pub total: u64,
}

impl QuotaInfo {
    pub fn new(root: impl Into<String>, used: u64, total: u64) -> Self {
        Self {
            root: root.into(),
            used,
            total,
        }
    }
}

/// GETQUOTAROOT response: the roots covering a mailbox plus their usage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaReport {
    pub roots: Vec<String>,
    pub quotas: Vec<QuotaInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbox_name_is_case_insensitive() {
        let inbox = Mailbox::new("INBOX", 1);
        assert!(inbox.is_named("inbox"));

        let other = Mailbox::new("Archive", 1);
        assert!(other.is_named("Archive"));
        assert!(!other.is_named("archive"));
    }

    #[test]
    fn test_same_mailbox_name() {
        assert!(same_mailbox_name("Inbox", "INBOX"));
        assert!(same_mailbox_name("Junk", "Junk"));
        assert!(!same_mailbox_name("Junk", "junk"));
        assert!(!same_mailbox_name("INBOX", "INBOX/Sub"));
    }

    #[test]
    fn test_quota_roots() {
        let mailbox = Mailbox::new("INBOX", 1);
        assert!(mailbox.quota_roots().is_empty());
        mailbox.set_quota_roots(vec!["".to_string(), "user".to_string()]);
        assert_eq!(mailbox.quota_roots(), vec!["".to_string(), "user".to_string()]);
    }
}
