//! Michael-Scott queue linking and tail-helping protocol.
//!
//! Nodes live in an arena; node 0 is the initial sentinel. Each step below
//! is one atomic action of `lf_structures::AtomicQueue`:
//!
//! ```text
//! enqueue: Link (CAS tail.next: null -> node)  then  Swing (CAS tail -> node)
//! dequeue: Dequeue (CAS head -> head.next, read value)
//! ```
//!
//! A thread that finds `tail.next` set may help by swinging `tail` itself.
//! Without helping it has to wait for the linker, so one crashed enqueuer
//! blocks everybody else.
//!
//! # Invariants
//!
//! 1. `tail reachable from head`: `tail` is `head` or a successor of it
//! 2. `tail lags by at most one`: `tail.next.next` is always null
//! 3. `dequeued in link order`: dequeued values are a prefix of link order
//! 4. `survivors finish` (eventually): every thread that did not crash completes

use stateright::{Model, Property};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Node {
    pub value: Option<u64>,
    pub next: Option<usize>,
}

/// Enqueuer program counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnqueuerPc {
    Linking,
    /// Linked `node` after `prev`; tail not yet swung.
    Swinging { prev: usize, node: usize },
    Done,
    Crashed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueAction {
    Link { enqueuer: usize },
    HelpTail { thread: usize },
    Swing { enqueuer: usize },
    Crash { enqueuer: usize },
    Dequeue { dequeuer: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueState {
    pub nodes: Vec<Node>,
    pub head: usize,
    pub tail: usize,
    pub enqueuers: Vec<EnqueuerPc>,
    /// Remaining dequeue attempts per dequeuer.
    pub attempts_left: Vec<u8>,
    pub linked: Vec<u64>,
    pub dequeued: Vec<u64>,
}

impl QueueState {
    /// Whether `tail.next` is set, i.e. some enqueuer has not swung yet.
    fn tail_lagging(&self) -> bool {
        self.nodes[self.tail].next.is_some()
    }

    fn survivors_finished(&self) -> bool {
        self.enqueuers
            .iter()
            .all(|pc| matches!(pc, EnqueuerPc::Done | EnqueuerPc::Crashed))
            && self.attempts_left.iter().all(|&a| a == 0)
    }
}

/// Queue model: one value per enqueuer, an attempt budget per dequeuer.
#[derive(Debug, Clone)]
pub struct QueueModel {
    pub values: Vec<u64>,
    pub dequeuers_count: usize,
    pub attempts_per_dequeuer: u8,
    /// Threads swing a lagging tail themselves
    pub helping: bool,
    /// Enqueuer that may crash between Link and Swing
    pub crash_enqueuer: Option<usize>,
}

impl QueueModel {
    pub fn new(values: Vec<u64>, dequeuers_count: usize) -> Self {
        Self {
            values,
            dequeuers_count,
            attempts_per_dequeuer: 2,
            helping: true,
            crash_enqueuer: None,
        }
    }

    #[must_use]
    pub fn without_helping(mut self) -> Self {
        self.helping = false;
        self
    }

    #[must_use]
    pub fn with_crash(mut self, enqueuer: usize) -> Self {
        self.crash_enqueuer = Some(enqueuer);
        self
    }
}

impl Model for QueueModel {
    type State = QueueState;
    type Action = QueueAction;

    fn init_states(&self) -> Vec<Self::State> {
        vec![QueueState {
            nodes: vec![Node {
                value: None,
                next: None,
            }],
            head: 0,
            tail: 0,
            enqueuers: vec![EnqueuerPc::Linking; self.values.len()],
            attempts_left: vec![self.attempts_per_dequeuer; self.dequeuers_count],
            linked: Vec::new(),
            dequeued: Vec::new(),
        }]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        let lagging = state.tail_lagging();

        for (enqueuer, pc) in state.enqueuers.iter().enumerate() {
            match pc {
                EnqueuerPc::Linking if !lagging => actions.push(QueueAction::Link { enqueuer }),
                EnqueuerPc::Linking if self.helping => {
                    actions.push(QueueAction::HelpTail { thread: enqueuer })
                }
                EnqueuerPc::Swinging { .. } => {
                    actions.push(QueueAction::Swing { enqueuer });
                    if self.crash_enqueuer == Some(enqueuer) {
                        actions.push(QueueAction::Crash { enqueuer });
                    }
                }
                _ => {}
            }
        }

        let dequeuer_offset = state.enqueuers.len();
        for (dequeuer, &left) in state.attempts_left.iter().enumerate() {
            if left == 0 {
                continue;
            }
            if state.head == state.tail && lagging {
                if self.helping {
                    actions.push(QueueAction::HelpTail {
                        thread: dequeuer_offset + dequeuer,
                    });
                }
            } else {
                actions.push(QueueAction::Dequeue { dequeuer });
            }
        }
    }

    fn next_state(&self, last: &Self::State, action: Self::Action) -> Option<Self::State> {
        let mut state = last.clone();

        match action {
            QueueAction::Link { enqueuer } => {
                let node = state.nodes.len();
                let prev = state.tail;
                state.nodes.push(Node {
                    value: Some(self.values[enqueuer]),
                    next: None,
                });
                state.nodes[prev].next = Some(node);
                state.linked.push(self.values[enqueuer]);
                state.enqueuers[enqueuer] = EnqueuerPc::Swinging { prev, node };
            }
            QueueAction::HelpTail { .. } => {
                state.tail = state.nodes[state.tail].next?;
            }
            QueueAction::Swing { enqueuer } => {
                let EnqueuerPc::Swinging { prev, node } = state.enqueuers[enqueuer] else {
                    return None;
                };
                // Fails harmlessly if a helper already moved tail.
                if state.tail == prev {
                    state.tail = node;
                }
                state.enqueuers[enqueuer] = EnqueuerPc::Done;
            }
            QueueAction::Crash { enqueuer } => {
                state.enqueuers[enqueuer] = EnqueuerPc::Crashed;
            }
            QueueAction::Dequeue { dequeuer } => {
                state.attempts_left[dequeuer] -= 1;
                if let Some(next) = state.nodes[state.head].next {
                    // The new head becomes the sentinel.
                    let value = state.nodes[next].value.take()?;
                    state.head = next;
                    state.dequeued.push(value);
                }
            }
        }

        Some(state)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![
            Property::always("tail reachable from head", |_, state: &QueueState| {
                let mut cursor = Some(state.head);
                while let Some(node) = cursor {
                    if node == state.tail {
                        return true;
                    }
                    cursor = state.nodes[node].next;
                }
                false
            }),
            Property::always("tail lags by at most one", |_, state: &QueueState| {
                state.nodes[state.tail]
                    .next
                    .map_or(true, |next| state.nodes[next].next.is_none())
            }),
            Property::always("dequeued in link order", |_, state: &QueueState| {
                state.linked.starts_with(&state.dequeued)
            }),
            Property::eventually("survivors finish", |_, state: &QueueState| {
                state.survivors_finished()
            }),
            Property::sometimes("value dequeued", |_, state: &QueueState| {
                !state.dequeued.is_empty()
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_then_swing() {
        let model = QueueModel::new(vec![5], 0);
        let init = model.init_states().remove(0);
        let linked = model
            .next_state(&init, QueueAction::Link { enqueuer: 0 })
            .unwrap();
        assert_eq!(linked.tail, 0);
        assert!(linked.tail_lagging());

        let swung = model
            .next_state(&linked, QueueAction::Swing { enqueuer: 0 })
            .unwrap();
        assert_eq!(swung.tail, 1);
        assert_eq!(swung.enqueuers[0], EnqueuerPc::Done);
    }

    #[test]
    fn test_crashed_linker_blocks_without_helping() {
        let model = QueueModel::new(vec![1, 2], 0)
            .without_helping()
            .with_crash(0);
        let mut state = model.init_states().remove(0);
        state = model
            .next_state(&state, QueueAction::Link { enqueuer: 0 })
            .unwrap();
        state = model
            .next_state(&state, QueueAction::Crash { enqueuer: 0 })
            .unwrap();

        let mut actions = Vec::new();
        model.actions(&state, &mut actions);
        assert!(actions.is_empty(), "{actions:?}");
        assert!(!state.survivors_finished());
    }

    #[test]
    fn test_helper_swings_for_crashed_linker() {
        let model = QueueModel::new(vec![1, 2], 0).with_crash(0);
        let mut state = model.init_states().remove(0);
        state = model
            .next_state(&state, QueueAction::Link { enqueuer: 0 })
            .unwrap();
        state = model
            .next_state(&state, QueueAction::Crash { enqueuer: 0 })
            .unwrap();

        let mut actions = Vec::new();
        model.actions(&state, &mut actions);
        assert_eq!(actions, vec![QueueAction::HelpTail { thread: 1 }]);
    }
}
