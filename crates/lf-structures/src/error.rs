//! Error and signal types.
//!
//! Fullness and emptiness are normal outcomes, not errors: `try_pop`, `pop`
//! and `dequeue` return `Option`, and `try_push` hands the rejected value
//! back in [`Full`]. Only construction and cache removal have error kinds.

use std::fmt;

/// Construction-time capacity error. No instance is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CapacityError {
    #[error("capacity must be positive")]
    Zero,
    /// The slot count leaves no room for lap stamps.
    #[error("slot count {0} is too large")]
    TooLarge(usize),
}

/// Recency cache errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("key not found")]
    NotFound,
}

/// Rejected push. Carries the value back to the caller.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Full(..)")
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ring buffer is full")
    }
}

impl<T> std::error::Error for Full<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(CapacityError::Zero.to_string(), "capacity must be positive");
        assert_eq!(
            CapacityError::TooLarge(9).to_string(),
            "slot count 9 is too large"
        );
        assert_eq!(CacheError::NotFound.to_string(), "key not found");
        assert_eq!(Full(7).to_string(), "ring buffer is full");
        assert_eq!(Full(vec![1, 2]).into_inner(), vec![1, 2]);
        assert_eq!(format!("{:?}", Full(String::from("secret"))), "Full(..)");
    }
}
