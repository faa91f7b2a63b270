//! Retry-once-on-reconnect wrapper around connection calls

use std::sync::Arc;

use log::{debug, warn};

use super::{CancellationToken, Connection, ConnectionManager, OperationHook};
use crate::error::Result;

/// Everything a wrapped call needs besides the operation itself
pub struct RetryContext<'a> {
    pub manager: &'a dyn ConnectionManager,
    pub hook: &'a dyn OperationHook,
    pub folder_path: &'a str,
    pub cancel: &'a CancellationToken,
}

/// Run `op` on a connection, reconnecting and retrying exactly once if the
/// transport was lost.
///
/// On a lost transport the stale connection is discarded and `on_reconnect`
/// runs (the store uses it to tear down its mailbox table, which unbinds
/// every folder) before a fresh connection is acquired. Any failure of the
/// second attempt is returned as-is. The hook sees every attempt.
pub fn retry_once<T>(
    ctx: &RetryContext<'_>,
    on_reconnect: impl Fn(),
    mut op: impl FnMut(&dyn Connection) -> Result<T>,
) -> Result<T> {
    ctx.cancel.check()?;
    let connection = ctx.manager.acquire(ctx.folder_path)?;

    match attempt(ctx, &connection, &mut op) {
        Err(err) if err.is_transport_lost() => {
            warn!(
                "[RETRY] Connection lost for {} ({}), reconnecting",
                ctx.folder_path, err
            );
            ctx.manager.discard(&connection);
            on_reconnect();

            ctx.cancel.check()?;
            let connection = ctx.manager.acquire(ctx.folder_path)?;
            let result = attempt(ctx, &connection, &mut op);
            if let Err(err) = &result
                && err.is_transport_lost()
            {
                warn!("[RETRY] Second attempt for {} also lost its connection", ctx.folder_path);
                ctx.manager.discard(&connection);
                on_reconnect();
            }
            result
        }
        result => result,
    }
}

fn attempt<T>(
    ctx: &RetryContext<'_>,
    connection: &Arc<dyn Connection>,
    op: &mut impl FnMut(&dyn Connection) -> Result<T>,
) -> Result<T> {
    ctx.hook.op_started(ctx.folder_path);
    let result = op(connection.as_ref());
    ctx.hook.op_finished(ctx.folder_path, result.is_ok());
    if let Err(err) = &result {
        debug!("[RETRY] Operation on {} failed: {}", ctx.folder_path, err);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::{
        FlagUpdate, Mailbox, MailboxChanges, MailboxListing, MessageFlags, QuotaReport, Uid,
    };
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct IdleConnection;

    impl Connection for IdleConnection {
        fn list(&self, _pattern: &str) -> Result<Vec<MailboxListing>> {
            Ok(Vec::new())
        }
        fn search(&self, _mailbox: &Mailbox, _criteria: &str) -> Result<Vec<Uid>> {
            Ok(Vec::new())
        }
        fn fetch_changes(&self, _mailbox: &Mailbox, _known: &[Uid]) -> Result<MailboxChanges> {
            Ok(MailboxChanges::default())
        }
        fn sync_changes(&self, _mailbox: &Mailbox, _updates: &[FlagUpdate]) -> Result<()> {
            Ok(())
        }
        fn expunge(&self, _mailbox: &Mailbox) -> Result<Vec<Uid>> {
            Ok(Vec::new())
        }
        fn copy(&self, _s: &Mailbox, _d: &Mailbox, _u: &[Uid], _del: bool) -> Result<Vec<Uid>> {
            Ok(Vec::new())
        }
        fn append(&self, _mailbox: &Mailbox, _m: &[u8], _f: MessageFlags) -> Result<Uid> {
            Ok(Uid(1))
        }
        fn get_message(&self, _mailbox: &Mailbox, _uid: Uid) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        fn refresh_quota(&self, _mailbox: &Mailbox) -> Result<QuotaReport> {
            Ok(QuotaReport::default())
        }
    }

    #[derive(Default)]
    struct CountingManager {
        acquired: AtomicUsize,
        discarded: AtomicUsize,
    }

    impl ConnectionManager for CountingManager {
        fn acquire(&self, _folder_path: &str) -> Result<Arc<dyn Connection>> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(IdleConnection))
        }
        fn discard(&self, _connection: &Arc<dyn Connection>) {
            self.discarded.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct RecordingHook {
        events: Mutex<Vec<String>>,
    }

    impl OperationHook for RecordingHook {
        fn op_started(&self, _folder_path: &str) {
            self.events.lock().unwrap().push("enter".to_string());
        }
        fn op_finished(&self, _folder_path: &str, succeeded: bool) {
            let event = if succeeded { "succeed" } else { "fail" };
            self.events.lock().unwrap().push(event.to_string());
        }
    }

    fn context<'a>(
        manager: &'a CountingManager,
        hook: &'a RecordingHook,
        cancel: &'a CancellationToken,
    ) -> RetryContext<'a> {
        RetryContext {
            manager,
            hook,
            folder_path: "INBOX",
            cancel,
        }
    }

    #[test]
    fn test_success_first_time() {
        let manager = CountingManager::default();
        let hook = RecordingHook::default();
        let cancel = CancellationToken::new();

        let value = retry_once(&context(&manager, &hook, &cancel), || {}, |_| Ok(42)).unwrap();

        assert_eq!(value, 42);
        assert_eq!(manager.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(manager.discarded.load(Ordering::SeqCst), 0);
        assert_eq!(*hook.events.lock().unwrap(), vec!["enter", "succeed"]);
    }

    #[test]
    fn test_transport_lost_then_success() {
        let manager = CountingManager::default();
        let hook = RecordingHook::default();
        let cancel = CancellationToken::new();
        let reconnects = AtomicUsize::new(0);
        let mut calls = 0;

        let value = retry_once(
            &context(&manager, &hook, &cancel),
            || {
                reconnects.fetch_add(1, Ordering::SeqCst);
            },
            |_| {
                calls += 1;
                if calls == 1 {
                    Err(Error::TransportLost("connection reset".into()))
                } else {
                    Ok("done")
                }
            },
        )
        .unwrap();

        assert_eq!(value, "done");
        assert_eq!(manager.acquired.load(Ordering::SeqCst), 2);
        assert_eq!(manager.discarded.load(Ordering::SeqCst), 1);
        assert_eq!(reconnects.load(Ordering::SeqCst), 1);
        assert_eq!(
            *hook.events.lock().unwrap(),
            vec!["enter", "fail", "enter", "succeed"]
        );
    }

    #[test]
    fn test_second_transport_lost_is_surfaced() {
        let manager = CountingManager::default();
        let hook = RecordingHook::default();
        let cancel = CancellationToken::new();
        let mut calls = 0;

        let result: Result<()> = retry_once(&context(&manager, &hook, &cancel), || {}, |_| {
            calls += 1;
            Err(Error::TransportLost(format!("attempt {}", calls)))
        });

        assert_eq!(calls, 2);
        match result {
            Err(Error::TransportLost(msg)) => assert_eq!(msg, "attempt 2"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(hook.events.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_other_errors_are_not_retried() {
        let manager = CountingManager::default();
        let hook = RecordingHook::default();
        let cancel = CancellationToken::new();
        let mut calls = 0;

        let result: Result<()> = retry_once(&context(&manager, &hook, &cancel), || {}, |_| {
            calls += 1;
            Err(Error::RemoteRejected("BAD criteria".into()))
        });

        assert_eq!(calls, 1);
        assert!(matches!(result, Err(Error::RemoteRejected(_))));
        assert_eq!(manager.discarded.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_before_second_attempt() {
        let manager = CountingManager::default();
        let hook = RecordingHook::default();
        let cancel = CancellationToken::new();
        let mut calls = 0;

        let result: Result<()> = retry_once(
            &context(&manager, &hook, &cancel),
            || cancel.cancel(),
            |_| {
                calls += 1;
                Err(Error::TransportLost("gone".into()))
            },
        );

        assert_eq!(calls, 1);
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(manager.acquired.load(Ordering::SeqCst), 1);
    }
}
