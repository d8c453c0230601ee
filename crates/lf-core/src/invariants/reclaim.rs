//! Deferred-reclamation invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | RetiredMatchesDetached | Every detached node was retired exactly once |
//! | ReclaimedNotAboveRetired | Nothing is freed that was not retired first |

use crate::property::{PropertyChecker, PropertyResult};

const STRUCTURE: &str = "reclaim";

/// Counters exposed by a reclamation domain and its owner.
pub trait ReclaimProperties {
    /// Nodes unlinked by successful removals.
    fn detached_count(&self) -> u64;

    /// Nodes handed to the reclamation substrate.
    fn retired_count(&self) -> u64;

    /// Nodes physically freed so far.
    fn reclaimed_count(&self) -> u64;
}

pub struct ReclaimPropertyChecker<'a, T: ReclaimProperties> {
    domain: &'a T,
}

impl<'a, T: ReclaimProperties> ReclaimPropertyChecker<'a, T> {
    #[must_use]
    pub fn new(domain: &'a T) -> Self {
        Self { domain }
    }
}

impl<T: ReclaimProperties> PropertyChecker for ReclaimPropertyChecker<'_, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        let detached = self.domain.detached_count();
        let retired = self.domain.retired_count();
        let reclaimed = self.domain.reclaimed_count();

        let retired_result = if retired == detached {
            PropertyResult::pass(STRUCTURE, "RetiredMatchesDetached")
        } else {
            PropertyResult::fail(
                STRUCTURE,
                "RetiredMatchesDetached",
                format!("{} nodes detached but {} retired", detached, retired),
                None,
            )
        };

        let reclaimed_result = if reclaimed <= retired {
            PropertyResult::pass(STRUCTURE, "ReclaimedNotAboveRetired")
        } else {
            PropertyResult::fail(
                STRUCTURE,
                "ReclaimedNotAboveRetired",
                format!("{} nodes reclaimed but only {} retired", reclaimed, retired),
                None,
            )
        };

        vec![retired_result, reclaimed_result]
    }
}
