//! Tuple stores: set-semantics storage and the grouped-requirement query
//! primitive.
//!
//! [`TupleStore`] is the minimal backend contract: writes are set union,
//! deletes are set difference, and `scan` returns everything matching a
//! predicate. [`TupleQuery`] layers the two grouped queries on top of any
//! backend: plain grouping, and "requirement coverage over a partitioned
//! tuple set", which answers "which resources satisfy this whole
//! conjunction of relational facts" without a graph-traversal query
//! language.
//!
//! [`InMemoryTupleStore`] is the deterministic implementation used by the
//! in-memory replicator and the test harness. It keeps secondary indexes
//! by resource id and subject id so pinned scans do not walk the whole
//! set.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use super::predicate::{TupleField, TuplePredicate};
use super::tuple::RelationTuple;
use crate::error::TupleStoreError;

// ═══════════════════════════════════════════════════════════════════════════════
// Store contract
// ═══════════════════════════════════════════════════════════════════════════════

/// Backend contract for a set of relation tuples.
#[async_trait]
pub trait TupleStore: Send + Sync {
    /// Add tuples (set union). Writing an already-present tuple is a
    /// no-op. Returns the number of tuples actually added.
    async fn write(&self, tuples: Vec<RelationTuple>) -> Result<usize, TupleStoreError>;

    /// Remove tuples (set difference). Deleting an absent tuple is a
    /// no-op. Returns the number of tuples actually removed.
    async fn delete(&self, tuples: Vec<RelationTuple>) -> Result<usize, TupleStoreError>;

    /// Exact-match membership test.
    async fn contains(&self, tuple: &RelationTuple) -> Result<bool, TupleStoreError>;

    /// All tuples matching the predicate.
    async fn scan(&self, predicate: &TuplePredicate) -> Result<Vec<RelationTuple>, TupleStoreError>;

    /// Total number of stored tuples.
    async fn count(&self) -> Result<usize, TupleStoreError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Grouped queries
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a requirement-coverage query: the groups in which the
/// requirements were satisfied, and the keys of the groups that failed
/// (kept for diagnostic reporting).
#[derive(Debug)]
pub struct RequirementMatch<K> {
    pub matched: HashMap<K, Vec<RelationTuple>>,
    pub unmatched: Vec<K>,
}

/// Grouped queries over any [`TupleStore`].
#[async_trait]
pub trait TupleQuery: TupleStore {
    /// All tuples matching `predicate`, partitioned by `group_by`.
    async fn find_tuples_grouped<K, F>(
        &self,
        predicate: &TuplePredicate,
        group_by: F,
    ) -> Result<HashMap<K, Vec<RelationTuple>>, TupleStoreError>
    where
        K: Eq + Hash + Send,
        F: Fn(&RelationTuple) -> K + Send + Sync,
    {
        let mut groups: HashMap<K, Vec<RelationTuple>> = HashMap::new();
        for tuple in self.scan(predicate).await? {
            groups.entry(group_by(&tuple)).or_default().push(tuple);
        }
        Ok(groups)
    }

    /// Requirement coverage over a partitioned tuple set.
    ///
    /// Groups the full tuple set by `group_by`, keeps groups passing
    /// `group_filter`, and matches each requirement predicate against a
    /// distinct tuple in the group. A group passes when every requirement
    /// found a tuple; with `require_full_match` the group must also
    /// contain nothing beyond the consumed tuples, so the requirements
    /// describe the group's tuple set exactly and supersets fail.
    async fn find_group_with_tuples<K, F, G>(
        &self,
        requirements: &[TuplePredicate],
        group_by: F,
        group_filter: G,
        require_full_match: bool,
    ) -> Result<RequirementMatch<K>, TupleStoreError>
    where
        K: Eq + Hash + Send,
        F: Fn(&RelationTuple) -> K + Send + Sync,
        G: Fn(&K) -> bool + Send + Sync,
    {
        let groups = self
            .find_tuples_grouped(&TuplePredicate::everything(), group_by)
            .await?;

        let mut matched = HashMap::new();
        let mut unmatched = Vec::new();
        for (key, tuples) in groups {
            if !group_filter(&key) {
                continue;
            }

            let mut consumed = vec![false; tuples.len()];
            let mut all_covered = true;
            for req in requirements {
                match (0..tuples.len()).find(|&i| !consumed[i] && req.matches(&tuples[i])) {
                    Some(i) => consumed[i] = true,
                    None => {
                        all_covered = false;
                        break;
                    }
                }
            }

            let passes =
                all_covered && (!require_full_match || consumed.iter().all(|c| *c));
            if passes {
                matched.insert(key, tuples);
            } else {
                unmatched.push(key);
            }
        }
        Ok(RequirementMatch { matched, unmatched })
    }
}

#[async_trait]
impl<S: TupleStore> TupleQuery for S {}

// ═══════════════════════════════════════════════════════════════════════════════
// In-memory store
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct StoreIndex {
    tuples: HashSet<RelationTuple>,
    by_resource_id: HashMap<String, HashSet<RelationTuple>>,
    by_subject_id: HashMap<String, HashSet<RelationTuple>>,
}

impl StoreIndex {
    fn insert(&mut self, tuple: RelationTuple) -> bool {
        if !self.tuples.insert(tuple.clone()) {
            return false;
        }
        self.by_resource_id
            .entry(tuple.resource_id.clone())
            .or_default()
            .insert(tuple.clone());
        self.by_subject_id
            .entry(tuple.subject_id.clone())
            .or_default()
            .insert(tuple);
        true
    }

    fn remove(&mut self, tuple: &RelationTuple) -> bool {
        if !self.tuples.remove(tuple) {
            return false;
        }
        if let Some(set) = self.by_resource_id.get_mut(&tuple.resource_id) {
            set.remove(tuple);
            if set.is_empty() {
                self.by_resource_id.remove(&tuple.resource_id);
            }
        }
        if let Some(set) = self.by_subject_id.get_mut(&tuple.subject_id) {
            set.remove(tuple);
            if set.is_empty() {
                self.by_subject_id.remove(&tuple.subject_id);
            }
        }
        true
    }

    /// Pick the smallest candidate set the predicate allows, falling back
    /// to the full set when nothing is pinned.
    fn candidates(&self, predicate: &TuplePredicate) -> Vec<&RelationTuple> {
        if let Some(id) = predicate.pinned_value(TupleField::ResourceId) {
            return self
                .by_resource_id
                .get(id)
                .map(|set| set.iter().collect())
                .unwrap_or_default();
        }
        if let Some(id) = predicate.pinned_value(TupleField::SubjectId) {
            return self
                .by_subject_id
                .get(id)
                .map(|set| set.iter().collect())
                .unwrap_or_default();
        }
        self.tuples.iter().collect()
    }
}

/// Thread-safe in-memory tuple store with secondary indexes.
#[derive(Debug, Default)]
pub struct InMemoryTupleStore {
    index: RwLock<StoreIndex>,
}

impl InMemoryTupleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sorted copy of every stored tuple, for assertions and debugging.
    pub fn snapshot(&self) -> Vec<RelationTuple> {
        let mut tuples: Vec<RelationTuple> = self.index.read().tuples.iter().cloned().collect();
        tuples.sort();
        tuples
    }
}

#[async_trait]
impl TupleStore for InMemoryTupleStore {
    async fn write(&self, tuples: Vec<RelationTuple>) -> Result<usize, TupleStoreError> {
        let mut index = self.index.write();
        Ok(tuples.into_iter().filter(|t| index.insert(t.clone())).count())
    }

    async fn delete(&self, tuples: Vec<RelationTuple>) -> Result<usize, TupleStoreError> {
        let mut index = self.index.write();
        Ok(tuples.iter().filter(|t| index.remove(t)).count())
    }

    async fn contains(&self, tuple: &RelationTuple) -> Result<bool, TupleStoreError> {
        Ok(self.index.read().tuples.contains(tuple))
    }

    async fn scan(&self, predicate: &TuplePredicate) -> Result<Vec<RelationTuple>, TupleStoreError> {
        let index = self.index.read();
        Ok(index
            .candidates(predicate)
            .into_iter()
            .filter(|t| predicate.matches(t))
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize, TupleStoreError> {
        Ok(self.index.read().tuples.len())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
