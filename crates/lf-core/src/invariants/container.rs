//! Conservation checks shared by every value-carrying structure.
//!
//! A value that went in must be either still resident or handed out, and
//! never both, and never handed out twice.

use std::collections::HashSet;

use crate::counterexample::{Counterexample, StateSnapshot};
use crate::invariants::history::{History, ReplayMismatch};
use crate::property::PropertyResult;

/// Operations shown before a failure in a counterexample.
pub(crate) const COUNTEREXAMPLE_WINDOW: usize = 8;

pub(crate) fn check_no_lost(
    structure: &'static str,
    name: &'static str,
    inserted: &[u64],
    removed: &[u64],
    contents: &[u64],
    history: Option<&History>,
    dst_seed: Option<u64>,
) -> PropertyResult {
    let removed_set: HashSet<u64> = removed.iter().copied().collect();
    let resident: HashSet<u64> = contents.iter().copied().collect();

    for element in inserted {
        if resident.contains(element) || removed_set.contains(element) {
            continue;
        }
        let mut ce = Counterexample::for_seed(dst_seed)
            .with_description(format!("element {} lost", element));
        if let Some(history) = history {
            for action in history.actions_involving(*element, COUNTEREXAMPLE_WINDOW) {
                ce.add_action(action);
            }
        }
        ce.add_state(StateSnapshot {
            step: history.map_or(1, |h| h.last_step().max(1)),
            description: format!("Element {} lost", element),
            variables: vec![
                ("inserted".to_string(), format!("{:?}", inserted)),
                ("removed".to_string(), format!("{:?}", removed)),
                ("contents".to_string(), format!("{:?}", contents)),
            ],
        });
        return PropertyResult::fail(
            structure,
            name,
            format!(
                "Element {} was inserted but is neither resident nor removed",
                element
            ),
            Some(ce),
        );
    }

    PropertyResult::pass(structure, name)
}

/// Counterexample for a replay mismatch: the operations leading up to it.
pub(crate) fn replay_counterexample(
    history: &History,
    mismatch: &ReplayMismatch,
    dst_seed: Option<u64>,
) -> Counterexample {
    let mut ce = Counterexample::for_seed(dst_seed).with_description(format!(
        "removal at step {} returned {:?}, expected {:?}",
        mismatch.step, mismatch.actual, mismatch.expected
    ));
    for action in history.actions_through(mismatch.step, COUNTEREXAMPLE_WINDOW) {
        ce.add_action(action);
    }
    ce
}

pub(crate) fn check_no_duplicates(
    structure: &'static str,
    removed: &[u64],
    contents: &[u64],
) -> PropertyResult {
    let mut seen = HashSet::new();
    for element in contents {
        if !seen.insert(*element) {
            return PropertyResult::fail(
                structure,
                "NoDuplicates",
                format!("Element {} is resident more than once", element),
                None,
            );
        }
    }

    let mut handed_out = HashSet::new();
    for element in removed {
        if !handed_out.insert(*element) {
            return PropertyResult::fail(
                structure,
                "NoDuplicates",
                format!("Element {} was removed more than once", element),
                None,
            );
        }
        if seen.contains(element) {
            return PropertyResult::fail(
                structure,
                "NoDuplicates",
                format!("Element {} was removed but is still resident", element),
                None,
            );
        }
    }

    PropertyResult::pass(structure, "NoDuplicates")
}
