//! Linearized operation history shared by the stack and queue checkers.

use crate::counterexample::ThreadAction;

/// History of insert/remove operations in linearization order.
///
/// Harnesses record an operation once it has taken effect. The checkers
/// replay the history against a sequential model.
#[derive(Debug, Clone, Default)]
pub struct History {
    pub operations: Vec<Operation>,
}

/// A single recorded operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Logical thread that performed the operation
    pub thread_id: u64,
    pub kind: OpKind,
    /// Value inserted, or value returned by a successful removal
    pub element: Option<u64>,
    /// Step number, strictly increasing
    pub step: u64,
}

/// Kind of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// push / enqueue / try_push that succeeded
    Insert,
    /// pop / dequeue / try_pop that returned a value
    Remove,
    /// Removal that found the structure empty
    RemoveEmpty,
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_insert(&mut self, thread_id: u64, element: u64, step: u64) {
        debug_assert!(step > 0, "Step must be positive");
        self.operations.push(Operation {
            thread_id,
            kind: OpKind::Insert,
            element: Some(element),
            step,
        });
    }

    pub fn record_remove(&mut self, thread_id: u64, element: Option<u64>, step: u64) {
        debug_assert!(step > 0, "Step must be positive");
        self.operations.push(Operation {
            thread_id,
            kind: if element.is_some() {
                OpKind::Remove
            } else {
                OpKind::RemoveEmpty
            },
            element,
            step,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Removal order a history is replayed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discipline {
    Lifo,
    Fifo,
}

/// First point where a history disagrees with the sequential model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayMismatch {
    pub step: u64,
    /// What the model would have returned
    pub expected: Option<u64>,
    /// What the structure returned
    pub actual: Option<u64>,
}

impl Operation {
    /// Render as one cell of a counterexample diagram.
    #[must_use]
    pub fn to_action(&self) -> ThreadAction {
        let action = match (self.kind, self.element) {
            (OpKind::Insert, Some(e)) => format!("ins({})", e),
            (OpKind::Remove, Some(e)) => format!("rem()={}", e),
            _ => "rem()=empty".to_string(),
        };
        ThreadAction {
            thread_id: self.thread_id,
            step: self.step,
            action,
            success: self.kind != OpKind::RemoveEmpty,
        }
    }
}

impl History {
    /// Step of the last recorded operation, 0 if none.
    #[must_use]
    pub fn last_step(&self) -> u64 {
        self.operations.last().map_or(0, |op| op.step)
    }

    /// Operations that inserted or removed `element`, plus the last
    /// `window` operations, in step order.
    #[must_use]
    pub fn actions_involving(&self, element: u64, window: usize) -> Vec<ThreadAction> {
        let recent_from = self.operations.len().saturating_sub(window);
        self.operations
            .iter()
            .enumerate()
            .filter(|(i, op)| *i >= recent_from || op.element == Some(element))
            .map(|(_, op)| op.to_action())
            .collect()
    }

    /// The `window` operations ending at `step`, in step order.
    #[must_use]
    pub fn actions_through(&self, step: u64, window: usize) -> Vec<ThreadAction> {
        let end = self.operations.partition_point(|op| op.step <= step);
        self.operations[end.saturating_sub(window)..end]
            .iter()
            .map(Operation::to_action)
            .collect()
    }
}

impl History {
    /// Replay against a sequential stack or queue.
    ///
    /// Every removal must return exactly what the model returns, and an
    /// empty removal is only allowed while the model is empty.
    pub fn replay(&self, discipline: Discipline) -> Result<(), ReplayMismatch> {
        let mut model = std::collections::VecDeque::new();

        for op in &self.operations {
            match op.kind {
                OpKind::Insert => {
                    if let Some(e) = op.element {
                        model.push_back(e);
                    }
                }
                OpKind::Remove | OpKind::RemoveEmpty => {
                    let expected = match discipline {
                        Discipline::Lifo => model.pop_back(),
                        Discipline::Fifo => model.pop_front(),
                    };
                    if expected != op.element {
                        return Err(ReplayMismatch {
                            step: op.step,
                            expected,
                            actual: op.element,
                        });
                    }
                }
            }
        }

        Ok(())
    }
}
