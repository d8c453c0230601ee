//! Recency (LRU) cache invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | MapListAgreement | The key map and the recency list hold the same keys |
//! | BoundedCapacity | Entry count never exceeds the configured capacity |
//! | RecencyOrder | Recency order matches a reference LRU replaying the same operations |
//! | ValueAgreement | Every resident value matches the reference LRU |

use std::collections::HashSet;

use crate::property::{PropertyChecker, PropertyResult};

const STRUCTURE: &str = "recency_cache";

/// Observable state of a recency cache under test.
pub trait RecencyCacheProperties {
    fn capacity(&self) -> usize;

    /// Number of keys in the map.
    fn map_len(&self) -> usize;

    /// Entries walked from the list, most recently used first.
    fn entries_by_recency(&self) -> Vec<(u64, u64)>;

    /// Entries of a sequential reference LRU fed the same operations.
    fn expected_entries_by_recency(&self) -> Vec<(u64, u64)>;
}

pub struct RecencyCachePropertyChecker<'a, T: RecencyCacheProperties> {
    cache: &'a T,
}

impl<'a, T: RecencyCacheProperties> RecencyCachePropertyChecker<'a, T> {
    #[must_use]
    pub fn new(cache: &'a T) -> Self {
        Self { cache }
    }

    fn check_map_list_agreement(&self, entries: &[(u64, u64)]) -> PropertyResult {
        let map_len = self.cache.map_len();
        if map_len != entries.len() {
            return PropertyResult::fail(
                STRUCTURE,
                "MapListAgreement",
                format!("Map holds {} keys but list holds {}", map_len, entries.len()),
                None,
            );
        }

        let mut seen = HashSet::new();
        if let Some((key, _)) = entries.iter().find(|(k, _)| !seen.insert(*k)) {
            return PropertyResult::fail(
                STRUCTURE,
                "MapListAgreement",
                format!("Key {} appears twice in the recency list", key),
                None,
            );
        }

        PropertyResult::pass(STRUCTURE, "MapListAgreement")
    }

    fn check_bounded_capacity(&self, entries: &[(u64, u64)]) -> PropertyResult {
        let capacity = self.cache.capacity();
        if entries.len() > capacity {
            return PropertyResult::fail(
                STRUCTURE,
                "BoundedCapacity",
                format!("Cache holds {} entries but capacity is {}", entries.len(), capacity),
                None,
            );
        }
        PropertyResult::pass(STRUCTURE, "BoundedCapacity")
    }

    fn check_recency_order(&self, entries: &[(u64, u64)], expected: &[(u64, u64)]) -> PropertyResult {
        let keys: Vec<u64> = entries.iter().map(|(k, _)| *k).collect();
        let expected_keys: Vec<u64> = expected.iter().map(|(k, _)| *k).collect();

        if keys != expected_keys {
            return PropertyResult::fail(
                STRUCTURE,
                "RecencyOrder",
                format!("Recency order {:?}, reference LRU has {:?}", keys, expected_keys),
                None,
            );
        }
        PropertyResult::pass(STRUCTURE, "RecencyOrder")
    }

    fn check_value_agreement(&self, entries: &[(u64, u64)], expected: &[(u64, u64)]) -> PropertyResult {
        for (key, value) in entries {
            match expected.iter().find(|(k, _)| k == key) {
                Some((_, v)) if v == value => {}
                Some((_, v)) => {
                    return PropertyResult::fail(
                        STRUCTURE,
                        "ValueAgreement",
                        format!("Key {} holds {} but reference LRU holds {}", key, value, v),
                        None,
                    );
                }
                // Missing keys are a RecencyOrder failure.
                None => {}
            }
        }
        PropertyResult::pass(STRUCTURE, "ValueAgreement")
    }
}

impl<T: RecencyCacheProperties> PropertyChecker for RecencyCachePropertyChecker<'_, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        let entries = self.cache.entries_by_recency();
        let expected = self.cache.expected_entries_by_recency();

        vec![
            self.check_map_list_agreement(&entries),
            self.check_bounded_capacity(&entries),
            self.check_recency_order(&entries, &expected),
            self.check_value_agreement(&entries, &expected),
        ]
    }
}
