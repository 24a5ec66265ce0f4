//! Hand-rolled error types for the task deque (spec §7).
//!
//! No `thiserror`: the surface is two small enums, each with a manual
//! `Display` and `std::error::Error` impl, matching the rest of the crate's
//! error style.

use std::fmt;

/// The memory provider could not supply a record.
///
/// This is the only condition the algorithm itself treats as exceptional;
/// CAS losses, helper races, and bounded-retry exhaustion are internal
/// control flow and never reach the caller as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError;

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("task deque memory provider failed to allocate a record")
    }
}

impl std::error::Error for AllocError {}

/// Why a `push_front`/`push_back` call did not enqueue the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The deque held `N` handles at the operation's linearization point.
    Full,
    /// The memory provider could not supply an index or descriptor record.
    Allocation(AllocError),
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full => f.write_str("task deque is full"),
            PushError::Allocation(e) => write!(f, "task deque push failed: {e}"),
        }
    }
}

impl std::error::Error for PushError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PushError::Full => None,
            PushError::Allocation(e) => Some(e),
        }
    }
}
