//! Lock-free and wait-free worklists for parallel algorithms.

pub mod task_deque;

pub use task_deque::{TaskDeque, TaskHandle};
