//! Expression evaluation over a folder's messages
//!
//! A search first probes whether the whole expression can be decided from
//! the summary. If so it runs locally with zero server round trips;
//! otherwise every remote leaf becomes a (cached) UID SEARCH and the
//! combinators become set operations over the folder's UIDs. With no
//! remote available (offline) everything is decided locally.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::debug;

use super::local::LocalMatcher;
use super::translate::{
    EvaluationMode, Scope, SearchCriteria, Translation, translate_body_contains,
    translate_header_contains, translate_header_exists,
};
use super::Expression;
use crate::error::Result;
use crate::models::{MessageInfo, Uid};

/// Server-side search, typically backed by the folder's result cache
pub trait RemoteSearch {
    /// UIDs matching `criteria`, searching the server on a cache miss
    fn search(&self, criteria: &SearchCriteria) -> Result<Arc<BTreeSet<Uid>>>;

    /// Cached UIDs for `criteria`, without touching the server
    fn cached(&self, criteria: &SearchCriteria) -> Option<Arc<BTreeSet<Uid>>>;
}

/// Translate one leaf, None for combinators
pub fn translate_leaf(
    leaf: &Expression,
    mode: EvaluationMode,
    scope: Scope,
    summary_empty: bool,
) -> Option<Translation> {
    match leaf {
        Expression::HeaderContains { name, words } => Some(translate_header_contains(
            name,
            words,
            mode,
            scope,
            summary_empty,
        )),
        Expression::HeaderExists(names) => {
            Some(translate_header_exists(names, mode, scope, summary_empty))
        }
        Expression::BodyContains(words) => {
            Some(translate_body_contains(words, mode, scope, summary_empty))
        }
        _ => None,
    }
}

/// Evaluates expressions over a set of candidate messages
pub struct Evaluator<'a> {
    candidates: &'a [MessageInfo],
    local: LocalMatcher<'a>,
    remote: Option<&'a dyn RemoteSearch>,
}

impl<'a> Evaluator<'a> {
    /// `remote` is None when the store is offline
    pub fn new(
        candidates: &'a [MessageInfo],
        local: LocalMatcher<'a>,
        remote: Option<&'a dyn RemoteSearch>,
    ) -> Self {
        Self {
            candidates,
            local,
            remote,
        }
    }

    /// UIDs of the candidates matching `expr`, ascending
    pub fn search(&self, expr: &Expression) -> Result<Vec<Uid>> {
        let Some(first) = self.candidates.first() else {
            return Ok(Vec::new());
        };

        if self.is_locally_feasible(expr, first) {
            debug!("[SEARCH] '{}' decided from the summary", expr);
            return self.evaluate_locally(expr);
        }

        match self.remote {
            Some(remote) => self.evaluate_remote(expr, remote),
            None => {
                debug!("[SEARCH] Offline, evaluating '{}' locally", expr);
                self.evaluate_locally(expr)
            }
        }
    }

    /// Whether `info` matches `expr`, for single-message scope
    pub fn matches(&self, expr: &Expression, info: &MessageInfo) -> Result<bool> {
        if self.is_locally_feasible(expr, info) {
            return self.matches_locally(expr, info);
        }

        match self.remote {
            Some(remote) => self.matches_remote(expr, info, remote),
            None => self.matches_locally(expr, info),
        }
    }

    /// Probe every leaf against a representative message
    ///
    /// All leaves are visited; a single infeasible leaf fails the probe.
    pub fn is_locally_feasible(&self, expr: &Expression, representative: &MessageInfo) -> bool {
        match expr {
            Expression::Bool(_) | Expression::MatchAll(None) => true,
            Expression::And(items) | Expression::Or(items) => items
                .iter()
                .map(|item| self.is_locally_feasible(item, representative))
                .fold(true, |acc, feasible| acc && feasible),
            Expression::Not(inner) => self.is_locally_feasible(inner, representative),
            Expression::MatchAll(Some(inner)) => self.is_locally_feasible(inner, representative),
            leaf => !matches!(
                translate_leaf(
                    leaf,
                    EvaluationMode::Probe,
                    Scope::Message(representative.uid),
                    false
                ),
                Some(Translation::Infeasible)
            ),
        }
    }

    /// Decide `expr` for every candidate from local data only
    pub fn evaluate_locally(&self, expr: &Expression) -> Result<Vec<Uid>> {
        let mut uids = Vec::new();
        for info in self.candidates {
            if self.matches_locally(expr, info)? {
                uids.push(info.uid);
            }
        }
        Ok(uids)
    }

    /// Decide `expr` with server searches for the remote leaves
    pub fn evaluate_remote(&self, expr: &Expression, remote: &dyn RemoteSearch) -> Result<Vec<Uid>> {
        Ok(self.remote_set(expr, remote)?.into_iter().collect())
    }

    fn all_uids(&self) -> BTreeSet<Uid> {
        self.candidates.iter().map(|info| info.uid).collect()
    }

    fn matches_locally(&self, expr: &Expression, info: &MessageInfo) -> Result<bool> {
        match expr {
            Expression::Bool(value) => Ok(*value),
            Expression::And(items) => {
                for item in items {
                    if !self.matches_locally(item, info)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Expression::Or(items) => {
                for item in items {
                    if self.matches_locally(item, info)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Expression::Not(inner) => Ok(!self.matches_locally(inner, info)?),
            Expression::MatchAll(None) => Ok(true),
            Expression::MatchAll(Some(inner)) => self.matches_locally(inner, info),
            leaf => match translate_leaf(
                leaf,
                EvaluationMode::LocalFallback,
                Scope::Message(info.uid),
                false,
            ) {
                Some(Translation::MatchAll) => Ok(true),
                Some(Translation::MatchNone) | None => Ok(false),
                Some(_) => self.local.matches_leaf(leaf, info),
            },
        }
    }

    fn remote_set(&self, expr: &Expression, remote: &dyn RemoteSearch) -> Result<BTreeSet<Uid>> {
        match expr {
            Expression::Bool(true) | Expression::MatchAll(None) => Ok(self.all_uids()),
            Expression::Bool(false) => Ok(BTreeSet::new()),
            Expression::And(items) => {
                let mut acc = self.all_uids();
                for item in items {
                    if acc.is_empty() {
                        break;
                    }
                    let matched = self.remote_set(item, remote)?;
                    acc.retain(|uid| matched.contains(uid));
                }
                Ok(acc)
            }
            Expression::Or(items) => {
                let mut acc = BTreeSet::new();
                for item in items {
                    acc.extend(self.remote_set(item, remote)?);
                }
                Ok(acc)
            }
            Expression::Not(inner) => {
                let matched = self.remote_set(inner, remote)?;
                let mut all = self.all_uids();
                all.retain(|uid| !matched.contains(uid));
                Ok(all)
            }
            Expression::MatchAll(Some(inner)) => self.remote_set(inner, remote),
            leaf => {
                let translation = translate_leaf(
                    leaf,
                    EvaluationMode::Remote,
                    Scope::Folder,
                    self.candidates.is_empty(),
                );
                match translation {
                    Some(Translation::MatchAll) => Ok(self.all_uids()),
                    Some(Translation::Remote(criteria)) => {
                        let found = remote.search(&criteria)?;
                        let mut all = self.all_uids();
                        all.retain(|uid| found.contains(uid));
                        Ok(all)
                    }
                    Some(Translation::Local) => {
                        let mut matched = BTreeSet::new();
                        for info in self.candidates {
                            if self.local.matches_leaf(leaf, info)? {
                                matched.insert(info.uid);
                            }
                        }
                        Ok(matched)
                    }
                    Some(Translation::MatchNone | Translation::Infeasible) | None => {
                        Ok(BTreeSet::new())
                    }
                }
            }
        }
    }

    fn matches_remote(
        &self,
        expr: &Expression,
        info: &MessageInfo,
        remote: &dyn RemoteSearch,
    ) -> Result<bool> {
        match expr {
            Expression::Bool(value) => Ok(*value),
            Expression::And(items) => {
                for item in items {
                    if !self.matches_remote(item, info, remote)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Expression::Or(items) => {
                for item in items {
                    if self.matches_remote(item, info, remote)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Expression::Not(inner) => Ok(!self.matches_remote(inner, info, remote)?),
            Expression::MatchAll(None) => Ok(true),
            Expression::MatchAll(Some(inner)) => self.matches_remote(inner, info, remote),
            leaf => {
                let translation = translate_leaf(
                    leaf,
                    EvaluationMode::Remote,
                    Scope::Message(info.uid),
                    false,
                );
                match translation {
                    Some(Translation::MatchAll) => Ok(true),
                    Some(Translation::Remote(criteria)) => {
                        // A folder-wide result already answers membership
                        if let Some(found) = remote.cached(&criteria.folder_scope()) {
                            return Ok(found.contains(&info.uid));
                        }
                        Ok(remote.search(&criteria)?.contains(&info.uid))
                    }
                    Some(Translation::Local) => self.local.matches_leaf(leaf, info),
                    Some(Translation::MatchNone | Translation::Infeasible) | None => Ok(false),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageFlags;
    use std::cell::RefCell;

    /// Answers searches by evaluating the criteria against the same messages
    struct ScriptedServer<'a> {
        messages: &'a [MessageInfo],
        bodies: Vec<(Uid, &'static str)>,
        searches: RefCell<Vec<String>>,
    }

    impl<'a> ScriptedServer<'a> {
        fn new(messages: &'a [MessageInfo]) -> Self {
            Self {
                messages,
                bodies: Vec::new(),
                searches: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.searches.borrow().len()
        }
    }

    impl RemoteSearch for ScriptedServer<'_> {
        fn search(&self, criteria: &SearchCriteria) -> Result<Arc<BTreeSet<Uid>>> {
            self.searches.borrow_mut().push(criteria.render());

            let mut found = BTreeSet::new();
            for info in self.messages {
                if criteria.uid.is_some_and(|uid| uid != info.uid) {
                    continue;
                }
                let text = match criteria.keyword.as_deref() {
                    Some("SUBJECT") => info.subject.clone(),
                    Some("FROM") => info.from.clone(),
                    Some("TO") => info.to.clone(),
                    Some("CC") => info.cc.clone(),
                    Some("BODY") => self
                        .bodies
                        .iter()
                        .find(|(uid, _)| *uid == info.uid)
                        .map(|(_, body)| body.to_string())
                        .unwrap_or_default(),
                    _ => String::new(),
                };
                let text = text.to_lowercase();
                if criteria
                    .words
                    .iter()
                    .all(|word| text.contains(&word.to_lowercase()))
                {
                    found.insert(info.uid);
                }
            }
            Ok(Arc::new(found))
        }

        fn cached(&self, _criteria: &SearchCriteria) -> Option<Arc<BTreeSet<Uid>>> {
            None
        }
    }

    fn inbox() -> Vec<MessageInfo> {
        vec![
            MessageInfo::builder(Uid(1))
                .from("alice@example.com")
                .subject("Urgent: server down")
                .build(),
            MessageInfo::builder(Uid(2))
                .from("bob@example.com")
                .subject("Lunch")
                .flags(MessageFlags::SEEN)
                .build(),
            MessageInfo::builder(Uid(3))
                .from("carol@example.com")
                .cc("alice@example.com")
                .subject("re: urgent matters")
                .build(),
        ]
    }

    fn parse(text: &str) -> Expression {
        Expression::parse(text).unwrap()
    }

    #[test]
    fn test_summary_only_search_never_hits_server() {
        let messages = inbox();
        let server = ScriptedServer::new(&messages);
        let evaluator = Evaluator::new(&messages, LocalMatcher::summary_only(), Some(&server));

        let uids = evaluator
            .search(&parse(r#"(header-contains "Subject" "urgent")"#))
            .unwrap();

        assert_eq!(uids, vec![Uid(1), Uid(3)]);
        assert_eq!(server.calls(), 0);
    }

    #[test]
    fn test_probe_result_equals_remote_result() {
        let messages = inbox();
        let server = ScriptedServer::new(&messages);
        let evaluator = Evaluator::new(&messages, LocalMatcher::summary_only(), Some(&server));

        for text in [
            r#"(header-contains "Subject" "urgent")"#,
            r#"(and (header-contains "From" "example") (not (header-contains "Subject" "lunch")))"#,
            r#"(or (header-contains "Cc" "alice") (header-contains "From" "bob"))"#,
            r#"(match-all (header-contains "subject" "URGENT server"))"#,
        ] {
            let expr = parse(text);
            assert!(evaluator.is_locally_feasible(&expr, &messages[0]), "{}", text);
            let local = evaluator.evaluate_locally(&expr).unwrap();
            let remote = evaluator.evaluate_remote(&expr, &server).unwrap();
            assert_eq!(local, remote, "{}", text);
        }
    }

    #[test]
    fn test_probe_visits_every_leaf() {
        let messages = inbox();
        let evaluator = Evaluator::new(&messages, LocalMatcher::summary_only(), None);

        let expr = parse(r#"(or #t (body-contains "x"))"#);
        assert!(!evaluator.is_locally_feasible(&expr, &messages[0]));
    }

    #[test]
    fn test_body_search_goes_remote() {
        let messages = inbox();
        let mut server = ScriptedServer::new(&messages);
        server.bodies = vec![(Uid(2), "the invoice is due"), (Uid(3), "no invoice here")];
        let evaluator = Evaluator::new(&messages, LocalMatcher::summary_only(), Some(&server));

        let uids = evaluator
            .search(&parse(r#"(and (body-contains "invoice due") (not (header-contains "From" "carol")))"#))
            .unwrap();

        assert_eq!(uids, vec![Uid(2)]);
        assert_eq!(
            server.searches.borrow().as_slice(),
            &[
                r#"BODY "invoice" BODY "due""#.to_string(),
                r#"FROM "carol""#.to_string()
            ]
        );
    }

    #[test]
    fn test_empty_body_word_matches_everything_without_server() {
        let messages = inbox();
        let server = ScriptedServer::new(&messages);
        let evaluator = Evaluator::new(&messages, LocalMatcher::summary_only(), Some(&server));

        let uids = evaluator.search(&parse(r#"(body-contains "")"#)).unwrap();

        assert_eq!(uids, vec![Uid(1), Uid(2), Uid(3)]);
        assert_eq!(server.calls(), 0);
    }

    #[test]
    fn test_and_stops_once_empty() {
        let messages = inbox();
        let server = ScriptedServer::new(&messages);
        let evaluator = Evaluator::new(&messages, LocalMatcher::summary_only(), Some(&server));

        let uids = evaluator
            .search(&parse(r#"(and #f (body-contains "anything"))"#))
            .unwrap();

        assert!(uids.is_empty());
        assert_eq!(server.calls(), 0);
    }

    #[test]
    fn test_offline_falls_back_to_local() {
        let messages = inbox();
        let evaluator = Evaluator::new(&messages, LocalMatcher::summary_only(), None);

        // Uncached bodies never match locally
        let uids = evaluator
            .search(&parse(r#"(or (body-contains "invoice") (header-contains "From" "bob"))"#))
            .unwrap();

        assert_eq!(uids, vec![Uid(2)]);
    }

    #[test]
    fn test_empty_folder() {
        let evaluator = Evaluator::new(&[], LocalMatcher::summary_only(), None);
        assert!(evaluator.search(&parse("(not #f)")).unwrap().is_empty());
    }

    #[test]
    fn test_single_message_scope() {
        let messages = inbox();
        let mut server = ScriptedServer::new(&messages);
        server.bodies = vec![(Uid(3), "invoice")];
        let evaluator = Evaluator::new(&messages, LocalMatcher::summary_only(), Some(&server));
        let expr = parse(r#"(body-contains "invoice")"#);

        assert!(evaluator.matches(&expr, &messages[2]).unwrap());
        assert!(!evaluator.matches(&expr, &messages[0]).unwrap());
        assert_eq!(
            server.searches.borrow().first().map(String::as_str),
            Some(r#"UID 3 BODY "invoice""#)
        );
    }
}
