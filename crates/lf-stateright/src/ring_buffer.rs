//! Ring buffer publish protocol.
//!
//! Models the per-slot stamp protocol of `lf_structures::RingBuffer` with
//! unbounded positions in place of lap-encoded stamps. Slot `p % N` is
//! vacant for position `p` when its stamp is `p`, published when it is
//! `p + 1` and reopened for the next lap as `p + N`.
//!
//! A producer claims a position by advancing `tail`, writes the payload and
//! then publishes the stamp. A consumer claims by advancing `head` once the
//! stamp is published, takes the payload and reopens the slot.
//!
//! # Invariants
//!
//! 1. `consumer reads published payload`: a claimed slot always holds the
//!    payload its producer wrote
//! 2. `within usable capacity`: at most `N - 1` positions are outstanding
//! 3. `no slot overwritten`: a producer never writes over an unconsumed payload

use stateright::{Model, Property};

/// Order in which a producer makes its slot visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublishOrder {
    /// Payload write, then stamp store (correct).
    SequenceAfterPayload,
    /// Stamp store, then payload write (broken).
    IndexFirst,
}

/// Producer program counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProducerPc {
    Idle,
    Claimed(usize),
    /// Payload written (or stamp published, for `IndexFirst`).
    HalfDone(usize),
    Done,
    Rejected,
}

/// Consumer program counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsumerPc {
    Idle,
    Claimed(usize),
    Taken(usize),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RingAction {
    Claim { producer: usize },
    Write { producer: usize },
    Publish { producer: usize },
    Poll { consumer: usize },
    Take { consumer: usize },
    Reopen { consumer: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RingState {
    pub head: usize,
    pub tail: usize,
    pub stamps: Vec<usize>,
    pub payloads: Vec<Option<u64>>,
    pub producers: Vec<ProducerPc>,
    pub consumers: Vec<ConsumerPc>,
    /// Polls each consumer may still make.
    pub polls_left: Vec<u8>,
    pub consumed: Vec<u64>,
    /// A consumer took an empty slot
    pub torn_read: bool,
    /// A producer wrote over a resident payload
    pub overwrite: bool,
}

/// Ring model: one value per producer, a poll budget per consumer.
#[derive(Debug, Clone)]
pub struct RingModel {
    pub slots: usize,
    pub values: Vec<u64>,
    pub consumers_count: usize,
    pub polls_per_consumer: u8,
    pub order: PublishOrder,
}

impl RingModel {
    pub fn new(slots: usize, values: Vec<u64>, consumers_count: usize) -> Self {
        debug_assert!(slots > 0, "ring needs at least one slot");
        Self {
            slots,
            values,
            consumers_count,
            polls_per_consumer: 3,
            order: PublishOrder::SequenceAfterPayload,
        }
    }

    #[must_use]
    pub fn with_order(mut self, order: PublishOrder) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn with_polls(mut self, polls: u8) -> Self {
        self.polls_per_consumer = polls;
        self
    }

    fn usable(&self) -> usize {
        self.slots - 1
    }

    fn slot(&self, position: usize) -> usize {
        position % self.slots
    }
}

impl Model for RingModel {
    type State = RingState;
    type Action = RingAction;

    fn init_states(&self) -> Vec<Self::State> {
        vec![RingState {
            head: 0,
            tail: 0,
            stamps: (0..self.slots).collect(),
            payloads: vec![None; self.slots],
            producers: vec![ProducerPc::Idle; self.values.len()],
            consumers: vec![ConsumerPc::Idle; self.consumers_count],
            polls_left: vec![self.polls_per_consumer; self.consumers_count],
            consumed: Vec::new(),
            torn_read: false,
            overwrite: false,
        }]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        for (producer, pc) in state.producers.iter().enumerate() {
            match (pc, self.order) {
                (ProducerPc::Idle, _) => actions.push(RingAction::Claim { producer }),
                (ProducerPc::Claimed(_), PublishOrder::SequenceAfterPayload)
                | (ProducerPc::HalfDone(_), PublishOrder::IndexFirst) => {
                    actions.push(RingAction::Write { producer })
                }
                (ProducerPc::Claimed(_), PublishOrder::IndexFirst)
                | (ProducerPc::HalfDone(_), PublishOrder::SequenceAfterPayload) => {
                    actions.push(RingAction::Publish { producer })
                }
                (ProducerPc::Done | ProducerPc::Rejected, _) => {}
            }
        }

        for (consumer, pc) in state.consumers.iter().enumerate() {
            match pc {
                ConsumerPc::Idle if state.polls_left[consumer] > 0 => {
                    actions.push(RingAction::Poll { consumer })
                }
                ConsumerPc::Claimed(_) => actions.push(RingAction::Take { consumer }),
                ConsumerPc::Taken(_) => actions.push(RingAction::Reopen { consumer }),
                ConsumerPc::Idle | ConsumerPc::Done => {}
            }
        }
    }

    fn next_state(&self, last: &Self::State, action: Self::Action) -> Option<Self::State> {
        let mut state = last.clone();

        match action {
            RingAction::Claim { producer } => {
                let tail = state.tail;
                let slot = self.slot(tail);
                if tail - state.head >= self.usable() || state.stamps[slot] != tail {
                    state.producers[producer] = ProducerPc::Rejected;
                } else {
                    state.tail = tail + 1;
                    state.producers[producer] = ProducerPc::Claimed(tail);
                }
            }
            RingAction::Write { producer } => {
                let position = match state.producers[producer] {
                    ProducerPc::Claimed(p) | ProducerPc::HalfDone(p) => p,
                    _ => return None,
                };
                let slot = self.slot(position);
                if state.payloads[slot].is_some() {
                    state.overwrite = true;
                }
                state.payloads[slot] = Some(self.values[producer]);
                state.producers[producer] = match self.order {
                    PublishOrder::SequenceAfterPayload => ProducerPc::HalfDone(position),
                    PublishOrder::IndexFirst => ProducerPc::Done,
                };
            }
            RingAction::Publish { producer } => {
                let position = match state.producers[producer] {
                    ProducerPc::Claimed(p) | ProducerPc::HalfDone(p) => p,
                    _ => return None,
                };
                state.stamps[self.slot(position)] = position + 1;
                state.producers[producer] = match self.order {
                    PublishOrder::SequenceAfterPayload => ProducerPc::Done,
                    PublishOrder::IndexFirst => ProducerPc::HalfDone(position),
                };
            }
            RingAction::Poll { consumer } => {
                let head = state.head;
                state.polls_left[consumer] -= 1;
                if state.stamps[self.slot(head)] == head + 1 {
                    state.head = head + 1;
                    state.consumers[consumer] = ConsumerPc::Claimed(head);
                } else if state.polls_left[consumer] == 0 {
                    state.consumers[consumer] = ConsumerPc::Done;
                }
            }
            RingAction::Take { consumer } => {
                let ConsumerPc::Claimed(position) = state.consumers[consumer] else {
                    return None;
                };
                match state.payloads[self.slot(position)].take() {
                    Some(value) => state.consumed.push(value),
                    None => state.torn_read = true,
                }
                state.consumers[consumer] = ConsumerPc::Taken(position);
            }
            RingAction::Reopen { consumer } => {
                let ConsumerPc::Taken(position) = state.consumers[consumer] else {
                    return None;
                };
                state.stamps[self.slot(position)] = position + self.slots;
                state.consumers[consumer] = if state.polls_left[consumer] > 0 {
                    ConsumerPc::Idle
                } else {
                    ConsumerPc::Done
                };
            }
        }

        Some(state)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![
            Property::always("consumer reads published payload", |_, state: &RingState| {
                !state.torn_read
            }),
            Property::always("within usable capacity", |model: &RingModel, state: &RingState| {
                state.tail - state.head <= model.usable()
            }),
            Property::always("no slot overwritten", |_, state: &RingState| !state.overwrite),
            Property::sometimes("value handed off", |_, state: &RingState| {
                !state.consumed.is_empty()
            }),
        ]
    }
}
