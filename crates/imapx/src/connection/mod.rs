//! Connection seam: the external IMAP client, its manager and the retry policy
//!
//! The wire protocol lives outside this crate. Folders drive it through
//! the [`Connection`] trait, always via [`retry_once`].

mod cancel;
mod retry;
mod traits;

pub use cancel::CancellationToken;
pub use retry::{RetryContext, retry_once};
pub use traits::{Connection, ConnectionManager, NoopHook, OperationHook};
