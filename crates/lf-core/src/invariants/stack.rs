//! Stack invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | NoLostElements | Every pushed element is in the stack or was popped |
//! | NoDuplicates | No element is resident twice or popped twice |
//! | LifoOrder | Replaying the history against a sequential stack matches |

use crate::invariants::container;
use crate::invariants::history::{Discipline, History};
use crate::property::{PropertyChecker, PropertyResult};

const STRUCTURE: &str = "stack";

/// Observable state of a stack under test.
pub trait StackProperties {
    /// Every element pushed so far, in push order.
    fn pushed_elements(&self) -> Vec<u64>;

    /// Every element popped so far, in pop order.
    fn popped_elements(&self) -> Vec<u64>;

    /// Current contents, top to bottom.
    fn current_contents(&self) -> Vec<u64>;

    /// Linearized history. Owned so implementations can keep it behind a lock.
    fn history(&self) -> History;
}

/// Checks the stack invariants against a `StackProperties` view.
pub struct StackPropertyChecker<'a, T: StackProperties> {
    stack: &'a T,
    dst_seed: Option<u64>,
}

impl<'a, T: StackProperties> StackPropertyChecker<'a, T> {
    #[must_use]
    pub fn new(stack: &'a T) -> Self {
        Self {
            stack,
            dst_seed: None,
        }
    }

    /// Attach the DST seed so counterexamples can be reproduced.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.dst_seed = Some(seed);
        self
    }

    fn check_lifo_order(&self, history: &History) -> PropertyResult {
        match history.replay(Discipline::Lifo) {
            Ok(()) => PropertyResult::pass(STRUCTURE, "LifoOrder"),
            Err(m) => PropertyResult::fail(
                STRUCTURE,
                "LifoOrder",
                format!(
                    "LIFO violated at step {}: pop returned {:?} but model expected {:?}",
                    m.step, m.actual, m.expected
                ),
                Some(container::replay_counterexample(history, &m, self.dst_seed)),
            ),
        }
    }
}

impl<T: StackProperties> PropertyChecker for StackPropertyChecker<'_, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        let pushed = self.stack.pushed_elements();
        let popped = self.stack.popped_elements();
        let contents = self.stack.current_contents();
        let history = self.stack.history();

        vec![
            container::check_no_lost(
                STRUCTURE,
                "NoLostElements",
                &pushed,
                &popped,
                &contents,
                Some(&history),
                self.dst_seed,
            ),
            container::check_no_duplicates(STRUCTURE, &popped, &contents),
            self.check_lifo_order(&history),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sequential reference stack.
    #[derive(Default)]
    struct TestStack {
        pushed: Vec<u64>,
        popped: Vec<u64>,
        contents: Vec<u64>,
        history: History,
    }

    impl TestStack {
        fn push(&mut self, val: u64) {
            self.pushed.push(val);
            self.contents.push(val);
            let step = self.history.len() as u64 + 1;
            self.history.record_insert(0, val, step);
        }

        fn pop(&mut self) -> Option<u64> {
            let val = self.contents.pop();
            if let Some(v) = val {
                self.popped.push(v);
            }
            let step = self.history.len() as u64 + 1;
            self.history.record_remove(0, val, step);
            val
        }
    }

    impl StackProperties for TestStack {
        fn pushed_elements(&self) -> Vec<u64> {
            self.pushed.clone()
        }

        fn popped_elements(&self) -> Vec<u64> {
            self.popped.clone()
        }

        fn current_contents(&self) -> Vec<u64> {
            self.contents.iter().rev().copied().collect()
        }

        fn history(&self) -> History {
            self.history.clone()
        }
    }

    #[test]
    fn test_correct_stack_passes_all() {
        let mut stack = TestStack::default();
        stack.push(1);
        stack.push(2);
        stack.push(3);
        stack.pop();
        stack.pop();
        stack.pop();
        stack.pop();

        let checker = StackPropertyChecker::new(&stack);
        assert!(checker.all_hold(), "{:?}", checker.failures());
    }

    #[test]
    fn test_lost_element_detected() {
        let stack = TestStack {
            pushed: vec![1, 2, 3],
            popped: vec![1],
            contents: vec![2],
            history: History::new(),
        };

        let checker = StackPropertyChecker::new(&stack).with_seed(99);
        let results = checker.check_all();
        let no_lost = results.iter().find(|r| r.name == "NoLostElements").unwrap();
        assert!(!no_lost.holds);
        assert!(no_lost.violation.as_ref().unwrap().contains('3'));
        assert_eq!(no_lost.counterexample.as_ref().unwrap().dst_seed, Some(99));
    }

    #[test]
    fn test_duplicate_pop_detected() {
        let stack = TestStack {
            pushed: vec![1, 2],
            popped: vec![2, 2],
            contents: vec![1],
            history: History::new(),
        };

        let results = StackPropertyChecker::new(&stack).check_all();
        let no_dup = results.iter().find(|r| r.name == "NoDuplicates").unwrap();
        assert!(!no_dup.holds);
    }

    #[test]
    fn test_fifo_history_fails_lifo() {
        let mut history = History::new();
        history.record_insert(0, 1, 1);
        history.record_insert(0, 2, 2);
        history.record_remove(0, Some(1), 3);

        let stack = TestStack {
            pushed: vec![1, 2],
            popped: vec![1],
            contents: vec![2],
            history,
        };

        let results = StackPropertyChecker::new(&stack).check_all();
        let lifo = results.iter().find(|r| r.name == "LifoOrder").unwrap();
        assert!(!lifo.holds);
    }

    #[test]
    fn test_lost_element_counterexample_carries_interleaving() {
        let mut history = History::new();
        history.record_insert(0, 1, 1);
        history.record_insert(1, 2, 2);

        let stack = TestStack {
            pushed: vec![1, 2],
            popped: vec![],
            contents: vec![1],
            history,
        };

        let results = StackPropertyChecker::new(&stack).with_seed(9).check_all();
        let no_lost = results.iter().find(|r| r.name == "NoLostElements").unwrap();
        let ce = no_lost.counterexample.as_ref().unwrap();
        assert_eq!(ce.interleaving.len(), 2);

        let diagram = ce.render_diagram();
        assert!(diagram.contains("DST_SEED=9"), "{diagram}");
        assert!(diagram.contains("Thread 1"), "{diagram}");
        assert!(diagram.contains("ins(2)"), "{diagram}");
        assert!(!diagram.contains("no thread actions"), "{diagram}");
    }

    #[test]
    fn test_lifo_counterexample_ends_at_mismatch() {
        let mut history = History::new();
        history.record_insert(0, 1, 1);
        history.record_insert(1, 2, 2);
        history.record_remove(0, Some(1), 3);
        history.record_insert(1, 3, 4);

        let stack = TestStack {
            pushed: vec![1, 2, 3],
            popped: vec![1],
            contents: vec![3, 2],
            history,
        };

        let results = StackPropertyChecker::new(&stack).check_all();
        let lifo = results.iter().find(|r| r.name == "LifoOrder").unwrap();
        let ce = lifo.counterexample.as_ref().unwrap();
        let steps: Vec<u64> = ce.interleaving.iter().map(|a| a.step).collect();
        assert_eq!(steps, vec![1, 2, 3]);
        assert!(ce.render_diagram().contains("rem()=1"));
    }
}
