//! Domain models for folders, messages and mailboxes

mod changes;
mod mailbox;
mod message;
mod summary_record;

pub use changes::{ChangeSet, FlagUpdate, MailboxChanges};
pub use mailbox::{Mailbox, MailboxListing, QuotaInfo, QuotaReport, same_mailbox_name};
pub use message::{MessageFlags, MessageInfo, MessageInfoBuilder, SUMMARY_HEADERS, Uid};
pub use summary_record::SummaryRecord;
