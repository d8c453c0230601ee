//! Bounded ring buffer invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | NoLostMessages | Every produced message is in the buffer or consumed |
//! | NoDuplicates | No message is resident twice or consumed twice |
//! | FifoOrder | Messages are consumed in production order |
//! | BoundedCapacity | The buffer never holds more than its usable capacity |
//! | FullOnlyAtCapacity | A push is rejected only when the buffer is at capacity |

use crate::invariants::container;
use crate::property::{PropertyChecker, PropertyResult};

const STRUCTURE: &str = "ring_buffer";

/// Observable state of a ring buffer under test.
pub trait RingBufferProperties {
    /// Messages accepted by `try_push`, in order.
    fn produced_messages(&self) -> Vec<u64>;

    /// Messages returned by `try_pop`, in order.
    fn consumed_messages(&self) -> Vec<u64>;

    /// Messages currently resident, consumer side first.
    fn current_contents(&self) -> Vec<u64>;

    /// Usable capacity (slots - 1).
    fn capacity(&self) -> u64;

    /// Resident count observed at each rejected push.
    fn rejected_push_lengths(&self) -> Vec<u64>;
}

pub struct RingBufferPropertyChecker<'a, T: RingBufferProperties> {
    buffer: &'a T,
    dst_seed: Option<u64>,
}

impl<'a, T: RingBufferProperties> RingBufferPropertyChecker<'a, T> {
    #[must_use]
    pub fn new(buffer: &'a T) -> Self {
        Self {
            buffer,
            dst_seed: None,
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.dst_seed = Some(seed);
        self
    }

    fn check_fifo_order(&self, produced: &[u64], consumed: &[u64]) -> PropertyResult {
        for (i, msg) in consumed.iter().enumerate() {
            match produced.get(i) {
                Some(expected) if expected == msg => {}
                Some(expected) => {
                    return PropertyResult::fail(
                        STRUCTURE,
                        "FifoOrder",
                        format!(
                            "Consumed message at index {} is {} but produced was {}",
                            i, msg, expected
                        ),
                        None,
                    );
                }
                None => {
                    return PropertyResult::fail(
                        STRUCTURE,
                        "FifoOrder",
                        format!("Consumed message {} at index {} was never produced", msg, i),
                        None,
                    );
                }
            }
        }

        PropertyResult::pass(STRUCTURE, "FifoOrder")
    }

    fn check_bounded_capacity(&self, contents: &[u64]) -> PropertyResult {
        let capacity = self.buffer.capacity();

        if contents.len() as u64 > capacity {
            return PropertyResult::fail(
                STRUCTURE,
                "BoundedCapacity",
                format!(
                    "Buffer contains {} items but capacity is {}",
                    contents.len(),
                    capacity
                ),
                None,
            );
        }

        PropertyResult::pass(STRUCTURE, "BoundedCapacity")
    }

    fn check_full_only_at_capacity(&self) -> PropertyResult {
        let capacity = self.buffer.capacity();

        if let Some(len) = self
            .buffer
            .rejected_push_lengths()
            .into_iter()
            .find(|len| *len != capacity)
        {
            return PropertyResult::fail(
                STRUCTURE,
                "FullOnlyAtCapacity",
                format!(
                    "Push rejected with {} resident items but capacity is {}",
                    len, capacity
                ),
                None,
            );
        }

        PropertyResult::pass(STRUCTURE, "FullOnlyAtCapacity")
    }
}

impl<T: RingBufferProperties> PropertyChecker for RingBufferPropertyChecker<'_, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        let produced = self.buffer.produced_messages();
        let consumed = self.buffer.consumed_messages();
        let contents = self.buffer.current_contents();

        vec![
            container::check_no_lost(
                STRUCTURE,
                "NoLostMessages",
                &produced,
                &consumed,
                &contents,
                None,
                self.dst_seed,
            ),
            container::check_no_duplicates(STRUCTURE, &consumed, &contents),
            self.check_fifo_order(&produced, &consumed),
            self.check_bounded_capacity(&contents),
            self.check_full_only_at_capacity(),
        ]
    }
}
