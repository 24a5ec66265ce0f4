//! # `taskdeque`
//!
//! A bounded, concurrent, double-ended task queue: a lock-free fast path
//! bounded by [`concurrency::worklist::task_deque::MAX_RETRY`] attempts,
//! falling back to a wait-free cooperative-helping protocol so that no
//! operation can be starved indefinitely by contention.
//!
//! This is the hardest, most novel component of a larger task-scheduling
//! substrate; the scheduler hierarchy that would sit on top of it (thread
//! pools, per-object schedulers, clocks) is out of this crate's scope.
//!
//! ## Example
//!
//! ```rust
//! use taskdeque::{TaskDeque, TaskHandle};
//!
//! let deque: TaskDeque<64> = TaskDeque::new();
//! deque.push_back(TaskHandle::new(1).unwrap()).unwrap();
//! deque.push_back(TaskHandle::new(2).unwrap()).unwrap();
//!
//! assert_eq!(deque.pop_front(), TaskHandle::new(1));
//! assert_eq!(deque.pop_front(), TaskHandle::new(2));
//! assert_eq!(deque.pop_front(), None);
//! ```

#![warn(missing_docs, clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod concurrency;

pub use concurrency::worklist::task_deque::{
    AllocError, PooledProvider, PushError, RecordProvider, SystemProvider, TaskDeque, TaskHandle,
    MAX_CAPACITY, MAX_RETRY, MIN_CAPACITY,
};

// Compile-time layout sanity checks.
const _: () = {
    use core::mem;

    // A handle is exactly pointer-sized: `NonZeroUsize` gets the
    // null-pointer niche, so `Option<TaskHandle>` (what every pop returns)
    // stays pointer-sized too.
    assert!(mem::size_of::<TaskHandle>() == mem::size_of::<usize>());
    assert!(mem::size_of::<Option<TaskHandle>>() == mem::size_of::<usize>());
};
