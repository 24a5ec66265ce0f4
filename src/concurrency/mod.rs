//! Concurrency primitives.
//!
//! The crate's one data structure, [`worklist::TaskDeque`], lives here.

pub mod worklist;
