//! Outcome types returned by [`crate::Source`] operations.
//!
//! Every operation ultimately resolves to `Result<_, SourceError>` (see
//! [`crate::SourceResult`]), but the `Ok` payload of the bulk and delete
//! operations carries more structure than a bare value — a bulk by-id fetch
//! can be a partial hit, and a delete can find nothing to delete. These
//! types give that structure a name, the same way the teacher's
//! [`DeleteStatus`]-style enums name backend outcomes instead of collapsing
//! them into booleans.

use std::collections::HashMap;

/// Outcome of a delete operation against a single source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    /// The entity was present and has been removed.
    Deleted,
    /// The entity was not present; nothing was removed.
    Missing,
}

impl DeleteStatus {
    /// True if the entity was actually removed.
    pub fn was_deleted(self) -> bool {
        matches!(self, DeleteStatus::Deleted)
    }
}

/// Outcome of a bulk by-id fetch: the entities that were found, keyed by id,
/// and the ids that were not.
///
/// A [`crate::SourceList`] uses `missing` to decide which ids still need to
/// be asked of the next source in the cascade; `found` entities are never
/// re-requested.
#[derive(Debug, Clone, Default)]
pub struct BulkFetch<T> {
    found: HashMap<String, T>,
    missing: Vec<String>,
}

impl<T> BulkFetch<T> {
    /// Builds a `BulkFetch` from its found map and missing-id list.
    ///
    /// `missing` is deduplicated and any id present in `found` is dropped
    /// from it, so a caller can pass a raw candidate list without first
    /// subtracting the hits itself.
    pub fn new(found: HashMap<String, T>, mut missing: Vec<String>) -> Self {
        missing.retain(|id| !found.contains_key(id));
        missing.sort();
        missing.dedup();
        BulkFetch { found, missing }
    }

    /// An empty fetch: nothing found, nothing missing.
    pub fn empty() -> Self {
        BulkFetch {
            found: HashMap::new(),
            missing: Vec::new(),
        }
    }

    /// The entities that were found, keyed by id.
    pub fn found(&self) -> &HashMap<String, T> {
        &self.found
    }

    /// The ids that were requested but not found.
    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    /// True if every requested id was found.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Consumes this fetch, returning `(found, missing)`.
    pub fn into_parts(self) -> (HashMap<String, T>, Vec<String>) {
        (self.found, self.missing)
    }

    /// Merges another fetch's hits into this one, removing newly-found ids
    /// from `missing`.
    ///
    /// Used by the cascade coordinator to fold a later source's partial
    /// answer into the accumulated result as it walks down the source list.
    pub fn merge(&mut self, other: BulkFetch<T>) {
        let (other_found, other_missing) = other.into_parts();
        for (id, item) in other_found {
            self.missing.retain(|m| m != &id);
            self.found.insert(id, item);
        }
        for id in other_missing {
            if !self.found.contains_key(&id) && !self.missing.contains(&id) {
                self.missing.push(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_drops_found_ids_from_missing() {
        let mut found = HashMap::new();
        found.insert("a".to_string(), 1);
        let fetch = BulkFetch::new(found, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(fetch.missing(), &["b".to_string()]);
        assert!(!fetch.is_complete());
    }

    #[test]
    fn merge_resolves_missing_ids() {
        let mut first = BulkFetch::new(HashMap::new(), vec!["a".to_string(), "b".to_string()]);
        let mut second_found = HashMap::new();
        second_found.insert("a".to_string(), 1);
        let second = BulkFetch::new(second_found, vec!["b".to_string()]);
        first.merge(second);
        assert_eq!(first.found().get("a"), Some(&1));
        assert_eq!(first.missing(), &["b".to_string()]);
    }

    #[test]
    fn merge_to_completion() {
        let mut first = BulkFetch::new(HashMap::new(), vec!["a".to_string()]);
        let mut second_found = HashMap::new();
        second_found.insert("a".to_string(), 42);
        first.merge(BulkFetch::new(second_found, vec![]));
        assert!(first.is_complete());
    }
}
