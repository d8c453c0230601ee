//! FIFO queue invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | NoLostElements | Every enqueued element is in the queue or was dequeued |
//! | NoDuplicates | No element is resident twice or dequeued twice |
//! | FifoOrder | Replaying the history against a sequential queue matches |
//! | ResidentOrder | Resident elements appear in enqueue order |

use crate::invariants::container;
use crate::invariants::history::{Discipline, History};
use crate::property::{PropertyChecker, PropertyResult};

const STRUCTURE: &str = "queue";

/// Observable state of a queue under test.
pub trait QueueProperties {
    /// Every element enqueued so far, in enqueue order.
    fn enqueued_elements(&self) -> Vec<u64>;

    /// Every element dequeued so far, in dequeue order.
    fn dequeued_elements(&self) -> Vec<u64>;

    /// Current contents, head to tail.
    fn current_contents(&self) -> Vec<u64>;

    fn history(&self) -> History;
}

pub struct QueuePropertyChecker<'a, T: QueueProperties> {
    queue: &'a T,
    dst_seed: Option<u64>,
}

impl<'a, T: QueueProperties> QueuePropertyChecker<'a, T> {
    #[must_use]
    pub fn new(queue: &'a T) -> Self {
        Self {
            queue,
            dst_seed: None,
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.dst_seed = Some(seed);
        self
    }

    fn check_fifo_order(&self, history: &History) -> PropertyResult {
        match history.replay(Discipline::Fifo) {
            Ok(()) => PropertyResult::pass(STRUCTURE, "FifoOrder"),
            Err(m) => PropertyResult::fail(
                STRUCTURE,
                "FifoOrder",
                format!(
                    "FIFO violated at step {}: dequeue returned {:?} but model expected {:?}",
                    m.step, m.actual, m.expected
                ),
                Some(container::replay_counterexample(history, &m, self.dst_seed)),
            ),
        }
    }

    /// The resident elements must be exactly the enqueued-but-not-dequeued
    /// suffix, still in enqueue order.
    fn check_resident_order(&self, enqueued: &[u64], dequeued: &[u64], contents: &[u64]) -> PropertyResult {
        let expected: Vec<u64> = enqueued
            .iter()
            .filter(|e| !dequeued.contains(e))
            .copied()
            .collect();

        if expected != contents {
            return PropertyResult::fail(
                STRUCTURE,
                "ResidentOrder",
                format!(
                    "Resident elements {:?} differ from enqueue-order remainder {:?}",
                    contents, expected
                ),
                None,
            );
        }

        PropertyResult::pass(STRUCTURE, "ResidentOrder")
    }
}

impl<T: QueueProperties> PropertyChecker for QueuePropertyChecker<'_, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        let enqueued = self.queue.enqueued_elements();
        let dequeued = self.queue.dequeued_elements();
        let contents = self.queue.current_contents();
        let history = self.queue.history();

        vec![
            container::check_no_lost(
                STRUCTURE,
                "NoLostElements",
                &enqueued,
                &dequeued,
                &contents,
                Some(&history),
                self.dst_seed,
            ),
            container::check_no_duplicates(STRUCTURE, &dequeued, &contents),
            self.check_fifo_order(&history),
            self.check_resident_order(&enqueued, &dequeued, &contents),
        ]
    }
}
