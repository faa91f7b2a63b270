//! Folder-level search entry points

use std::collections::BTreeSet;
use std::sync::Arc;

use log::debug;

use super::Folder;
use crate::connection::CancellationToken;
use crate::error::{Error, Result};
use crate::models::{MessageInfo, Uid};
use crate::search::{Evaluator, Expression, LocalMatcher, RemoteSearch, SearchCriteria};

/// Server searches for one folder, through its result cache
struct FolderSearch<'a> {
    folder: &'a Folder,
    cancel: &'a CancellationToken,
}

impl FolderSearch<'_> {
    /// Re-resolve a binding that died with its connection
    ///
    /// A new binding clears the result cache, so nothing cached under the
    /// old session is served.
    fn ensure_bound(&self) -> Result<()> {
        if self.folder.mailbox().is_some() {
            return Ok(());
        }
        self.folder
            .with_connection(self.cancel, |conn| self.folder.list_mailbox(conn))?;
        Ok(())
    }
}

impl RemoteSearch for FolderSearch<'_> {
    fn search(&self, criteria: &SearchCriteria) -> Result<Arc<BTreeSet<Uid>>> {
        self.ensure_bound()?;
        self.folder.search_cache.get_or_search(criteria, |criteria| {
            let rendered = criteria.render();
            self.folder.with_connection(self.cancel, |conn| {
                let mailbox = self.folder.list_mailbox(conn)?;
                conn.search(&mailbox, &rendered)
            })
        })
    }

    fn cached(&self, criteria: &SearchCriteria) -> Option<Arc<BTreeSet<Uid>>> {
        self.folder.mailbox()?;
        self.folder.search_cache.lookup(criteria)
    }
}

impl Folder {
    /// UIDs of the messages matching `expression`, ascending
    pub fn search(&self, expression: &str, cancel: &CancellationToken) -> Result<Vec<Uid>> {
        let expr = Expression::parse(expression)?;
        let candidates = self.summary.snapshot();
        self.evaluate(&expr, &candidates, cancel)
    }

    /// Like [`Folder::search`], restricted to `uids`
    pub fn search_by_uids(
        &self,
        expression: &str,
        uids: &[Uid],
        cancel: &CancellationToken,
    ) -> Result<Vec<Uid>> {
        let expr = Expression::parse(expression)?;
        let wanted: BTreeSet<Uid> = uids.iter().copied().collect();
        let candidates: Vec<MessageInfo> = self
            .summary
            .snapshot()
            .into_iter()
            .filter(|info| wanted.contains(&info.uid))
            .collect();
        self.evaluate(&expr, &candidates, cancel)
    }

    /// Number of messages matching `expression`
    pub fn count_by_expression(&self, expression: &str, cancel: &CancellationToken) -> Result<usize> {
        Ok(self.search(expression, cancel)?.len())
    }

    /// Whether one message matches `expression`
    pub fn matches(&self, uid: Uid, expression: &str, cancel: &CancellationToken) -> Result<bool> {
        let expr = Expression::parse(expression)?;
        let info = self
            .summary
            .get(uid)
            .ok_or_else(|| Error::InvalidUid(uid.to_string()))?;

        let path = self.path();
        let remote = FolderSearch {
            folder: self,
            cancel,
        };
        let candidates = [info];
        let evaluator = Evaluator::new(
            &candidates,
            LocalMatcher::new(Some(self.store.cache()), &path),
            self.remote_search(&remote),
        );
        evaluator.matches(&expr, &candidates[0])
    }

    fn evaluate(
        &self,
        expr: &Expression,
        candidates: &[MessageInfo],
        cancel: &CancellationToken,
    ) -> Result<Vec<Uid>> {
        let path = self.path();
        let remote = FolderSearch {
            folder: self,
            cancel,
        };
        let evaluator = Evaluator::new(
            candidates,
            LocalMatcher::new(Some(self.store.cache()), &path),
            self.remote_search(&remote),
        );

        let uids = evaluator.search(expr)?;
        debug!(
            "[SEARCH] '{}' matched {} of {} messages in {}",
            expr,
            uids.len(),
            candidates.len(),
            path
        );
        Ok(uids)
    }

    /// The remote side of a search, unless the store is offline
    fn remote_search<'a>(&self, remote: &'a FolderSearch<'a>) -> Option<&'a dyn RemoteSearch> {
        if self.store.is_online() {
            Some(remote)
        } else {
            None
        }
    }
}
