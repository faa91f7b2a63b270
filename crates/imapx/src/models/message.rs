//! Message summary model: UID, flag bitset and summary-resident headers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

/// IMAP message UID, unique within one mailbox epoch (UIDVALIDITY)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub u32);

impl Uid {
    pub fn new(uid: u32) -> Self {
        Self(uid)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for Uid {
    fn from(uid: u32) -> Self {
        Self(uid)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message flag bitset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageFlags(u32);

impl MessageFlags {
    pub const ANSWERED: Self = Self(1 << 0);
    pub const DELETED: Self = Self(1 << 1);
    pub const DRAFT: Self = Self(1 << 2);
    pub const FLAGGED: Self = Self(1 << 3);
    pub const SEEN: Self = Self(1 << 4);
    /// Local-only: the message has at least one attachment
    pub const ATTACHMENTS: Self = Self(1 << 5);
    pub const JUNK: Self = Self(1 << 7);
    pub const NOTJUNK: Self = Self(1 << 8);

    /// Flags that are stored on the server and pushed by flag sync
    pub const SERVER: Self = Self(
        Self::ANSWERED.0
            | Self::DELETED.0
            | Self::DRAFT.0
            | Self::FLAGGED.0
            | Self::SEEN.0
            | Self::JUNK.0
            | Self::NOTJUNK.0,
    );

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Set or clear every bit in `mask`
    pub fn set(&mut self, mask: Self, value: bool) {
        if value {
            self.insert(mask);
        } else {
            self.remove(mask);
        }
    }
}

impl BitOr for MessageFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for MessageFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for MessageFlags {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

/// Summary headers that are always available locally
pub const SUMMARY_HEADERS: [&str; 4] = ["From", "To", "Cc", "Subject"];

/// Per-message metadata kept in a folder summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub uid: Uid,
    /// Local view of the flags, including changes not yet pushed
    pub flags: MessageFlags,
    /// Flags as last acknowledged by the server
    pub server_flags: MessageFlags,
    pub from: String,
    pub to: String,
    pub cc: String,
    pub subject: String,
    pub size: u32,
    /// Set when the mailbox epoch changed; cleared once the server re-reports the UID
    #[serde(default)]
    pub stale: bool,
}

impl MessageInfo {
    /// Create a new message info builder
    pub fn builder(uid: Uid) -> MessageInfoBuilder {
        MessageInfoBuilder::new(uid)
    }

    /// Value of a summary-resident header, or None for any other header
    pub fn summary_header(&self, name: &str) -> Option<&str> {
        if name.eq_ignore_ascii_case("From") {
            Some(&self.from)
        } else if name.eq_ignore_ascii_case("To") {
            Some(&self.to)
        } else if name.eq_ignore_ascii_case("Cc") {
            Some(&self.cc)
        } else if name.eq_ignore_ascii_case("Subject") {
            Some(&self.subject)
        } else {
            None
        }
    }

    /// Server flags that were set locally and not pushed yet
    pub fn flags_to_set(&self) -> MessageFlags {
        self.flags & !self.server_flags & MessageFlags::SERVER
    }

    /// Server flags that were cleared locally and not pushed yet
    pub fn flags_to_unset(&self) -> MessageFlags {
        self.server_flags & !self.flags & MessageFlags::SERVER
    }

    /// Whether local flag changes are waiting to be pushed
    pub fn has_pending_flags(&self) -> bool {
        !self.flags_to_set().is_empty() || !self.flags_to_unset().is_empty()
    }
}

/// Builder for creating MessageInfo instances
pub struct MessageInfoBuilder {
    uid: Uid,
    flags: MessageFlags,
    from: String,
    to: String,
    cc: String,
    subject: String,
    size: u32,
}

impl MessageInfoBuilder {
    fn new(uid: Uid) -> Self {
        Self {
            uid,
            flags: MessageFlags::empty(),
            from: String::new(),
            to: String::new(),
            cc: String::new(),
            subject: String::new(),
            size: 0,
        }
    }

    pub fn flags(mut self, flags: MessageFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = to.into();
        self
    }

    pub fn cc(mut self, cc: impl Into<String>) -> Self {
        self.cc = cc.into();
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Build the info as reported by the server (no pending flag changes)
    pub fn build(self) -> MessageInfo {
        MessageInfo {
            uid: self.uid,
            flags: self.flags,
            server_flags: self.flags & MessageFlags::SERVER,
            from: self.from,
            to: self.to,
            cc: self.cc,
            subject: self.subject,
            size: self.size,
            stale: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_set_and_clear() {
        let mut flags = MessageFlags::SEEN;
        flags.set(MessageFlags::FLAGGED | MessageFlags::JUNK, true);
        assert!(flags.contains(MessageFlags::SEEN | MessageFlags::FLAGGED));
        flags.set(MessageFlags::SEEN, false);
        assert!(!flags.contains(MessageFlags::SEEN));
        assert!(flags.intersects(MessageFlags::JUNK));
    }

    #[test]
    fn test_pending_flags() {
        let mut info = MessageInfo::builder(Uid(7))
            .flags(MessageFlags::SEEN)
            .subject("hello")
            .build();
        assert!(!info.has_pending_flags());

        info.flags.insert(MessageFlags::FLAGGED);
        info.flags.remove(MessageFlags::SEEN);
        assert_eq!(info.flags_to_set(), MessageFlags::FLAGGED);
        assert_eq!(info.flags_to_unset(), MessageFlags::SEEN);
        assert!(info.has_pending_flags());
    }

    #[test]
    fn test_attachments_flag_is_local_only() {
        let mut info = MessageInfo::builder(Uid(1)).build();
        info.flags.insert(MessageFlags::ATTACHMENTS);
        assert!(!info.has_pending_flags());
    }

    #[test]
    fn test_summary_header_case_insensitive() {
        let info = MessageInfo::builder(Uid(1))
            .from("Alice <alice@example.com>")
            .cc("bob@example.com")
            .subject("Quarterly report")
            .build();
        assert_eq!(info.summary_header("SUBJECT"), Some("Quarterly report"));
        assert_eq!(info.summary_header("cc"), Some("bob@example.com"));
        assert_eq!(info.summary_header("X-Mailer"), None);
    }
}
