//! Per-folder cache of server search results

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;

use super::SearchCriteria;
use crate::error::Result;
use crate::models::Uid;

/// Cache of UID sets keyed by normalized search criteria
///
/// Valid only while the folder stays bound to the same mailbox within one
/// UIDVALIDITY epoch; the folder clears it on every re-bind and on
/// invalidation. Failed searches are never cached.
#[derive(Default)]
pub struct SearchResultCache {
    entries: Mutex<Entries>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Default)]
struct Entries {
    results: HashMap<SearchCriteria, Arc<BTreeSet<Uid>>>,
    /// Bumped by every clear
    generation: u64,
}

impl SearchResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, criteria: &SearchCriteria) -> Option<Arc<BTreeSet<Uid>>> {
        self.entries.lock().unwrap().results.get(criteria).cloned()
    }

    pub fn insert(&self, criteria: SearchCriteria, uids: BTreeSet<Uid>) -> Arc<BTreeSet<Uid>> {
        let uids = Arc::new(uids);
        self.entries
            .lock()
            .unwrap()
            .results
            .insert(criteria, Arc::clone(&uids));
        uids
    }

    /// Return the cached result, or run `search` and cache its result
    ///
    /// The lock is not held while `search` runs, so two racing misses may
    /// both reach the server. A result whose search overlapped a `clear` is
    /// returned to the caller but not cached.
    pub fn get_or_search(
        &self,
        criteria: &SearchCriteria,
        search: impl FnOnce(&SearchCriteria) -> Result<Vec<Uid>>,
    ) -> Result<Arc<BTreeSet<Uid>>> {
        let generation = {
            let entries = self.entries.lock().unwrap();
            if let Some(uids) = entries.results.get(criteria) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("[SEARCH] Cache hit for '{}'", criteria);
                return Ok(Arc::clone(uids));
            }
            entries.generation
        };

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("[SEARCH] Cache miss for '{}'", criteria);
        let uids: Arc<BTreeSet<Uid>> = Arc::new(search(criteria)?.into_iter().collect());

        let mut entries = self.entries.lock().unwrap();
        if entries.generation == generation {
            entries.results.insert(criteria.clone(), Arc::clone(&uids));
        } else {
            debug!("[SEARCH] Not caching '{}', cache was cleared meanwhile", criteria);
        }
        Ok(uids)
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap();
        if !entries.results.is_empty() {
            debug!("[SEARCH] Dropping {} cached results", entries.results.len());
        }
        entries.results.clear();
        entries.generation += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::search::{EvaluationMode, Scope, Translation, translate_body_contains};
    use std::cell::Cell;

    fn body_criteria(word: &str) -> SearchCriteria {
        match translate_body_contains(
            &[word.to_string()],
            EvaluationMode::Remote,
            Scope::Folder,
            false,
        ) {
            Translation::Remote(criteria) => criteria,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_second_lookup_hits() {
        let cache = SearchResultCache::new();
        let calls = Cell::new(0);
        let criteria = body_criteria("invoice");

        for _ in 0..2 {
            let uids = cache
                .get_or_search(&criteria, |_| {
                    calls.set(calls.get() + 1);
                    Ok(vec![Uid(3), Uid(1)])
                })
                .unwrap();
            assert_eq!(uids.iter().copied().collect::<Vec<_>>(), vec![Uid(1), Uid(3)]);
        }

        assert_eq!(calls.get(), 1);
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn test_clear_forces_new_search() {
        let cache = SearchResultCache::new();
        let criteria = body_criteria("invoice");
        cache.insert(criteria.clone(), BTreeSet::new());
        assert_eq!(cache.len(), 1);

        cache.clear();

        assert!(cache.is_empty());
        assert!(cache.lookup(&criteria).is_none());
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = SearchResultCache::new();
        let criteria = body_criteria("invoice");

        let result = cache.get_or_search(&criteria, |_| {
            Err(Error::RemoteRejected("BAD".to_string()))
        });

        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_result_of_search_overlapping_clear_is_not_cached() {
        let cache = SearchResultCache::new();
        let criteria = body_criteria("invoice");
        cache.insert(body_criteria("other"), BTreeSet::from([Uid(9)]));

        let uids = cache
            .get_or_search(&criteria, |_| {
                // Invalidated while the server was answering
                cache.clear();
                Ok(vec![Uid(1)])
            })
            .unwrap();

        assert_eq!(uids.iter().copied().collect::<Vec<_>>(), vec![Uid(1)]);
        assert!(cache.is_empty());

        // The next miss caches normally again
        cache.get_or_search(&criteria, |_| Ok(vec![Uid(2)])).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_different_words_are_different_keys() {
        let cache = SearchResultCache::new();
        cache.insert(body_criteria("a"), BTreeSet::from([Uid(1)]));
        assert!(cache.lookup(&body_criteria("b")).is_none());
    }
}
