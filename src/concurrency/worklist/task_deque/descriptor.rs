//! The descriptor protocol (spec §4.4-§4.7).
//!
//! A [`Descriptor`] is an immutable record of one in-flight operation.
//! Phase transitions never mutate a descriptor; they build a new one via
//! [`Descriptor::rolled_back`], [`Descriptor::completed`] or
//! [`Descriptor::failed`] and CAS it into `registered` in place of its
//! predecessor.

use super::index::{IndexValue, Op};

/// A descriptor's position in its own state machine (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Reserve,
    Complete,
    Fail,
}

/// One in-flight operation's intended (or decided) transition.
///
/// `expected_old_index`/`intended_new_index` are raw pointers rather than
/// `crossbeam_epoch::Shared<'g, _>` because a descriptor may outlive the
/// [`crossbeam_epoch::Guard`] under which it was built — any thread that
/// later helps it pins its own guard and reconstructs a `Shared` from the
/// raw pointer at the point of use (see `core.rs`).
///
/// While `phase == Reserve`, this descriptor exclusively owns
/// `intended_new_index`: nothing else may read or free it until the
/// descriptor is either published successfully (ownership passes to the
/// deque's `index` atomic) or discarded (the builder frees it immediately).
/// Once a descriptor transitions to `Complete`/`Fail`, `intended_new_index`
/// is always null; `expected_old_index` becomes a non-owning diagnostic
/// snapshot of whatever index was current at the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub op: Op,
    pub phase: Phase,
    pub target_slot: usize,
    pub expected_old_task: usize,
    pub intended_new_task: usize,
    pub expected_old_index: *const IndexValue,
    pub intended_new_index: *const IndexValue,
}

// SAFETY: a `Descriptor` is an immutable value type once published; the
// pointers it carries are only ever dereferenced under a pinned epoch guard
// by code that independently establishes the pointee is still live (see
// `core.rs`'s retire/defer discipline). It carries no thread-affine state.
unsafe impl Send for Descriptor {}
unsafe impl Sync for Descriptor {}

impl Descriptor {
    /// Build a fresh RESERVE descriptor for a new attempt.
    #[allow(clippy::too_many_arguments)]
    pub fn reserve(
        op: Op,
        target_slot: usize,
        expected_old_task: usize,
        intended_new_task: usize,
        expected_old_index: *const IndexValue,
        intended_new_index: *const IndexValue,
    ) -> Self {
        Descriptor {
            op,
            phase: Phase::Reserve,
            target_slot,
            expected_old_task,
            intended_new_task,
            expected_old_index,
            intended_new_index,
        }
    }

    /// Successor after an index-commit loss, re-resolved against a fresh
    /// index snapshot (spec §4.5 H2). `target_slot`/`expected_old_task`/
    /// `intended_new_task` are carried over unchanged: the slot the
    /// operation targets never changes once its fast-path slot CAS won,
    /// regardless of how many times the index CAS must be retried.
    pub fn rolled_back(
        &self,
        fresh_old_index: *const IndexValue,
        fresh_new_index: *const IndexValue,
    ) -> Self {
        Descriptor {
            phase: Phase::Reserve,
            expected_old_index: fresh_old_index,
            intended_new_index: fresh_new_index,
            ..*self
        }
    }

    /// Terminal success. `committed_index` is a diagnostic snapshot, not an
    /// owned record.
    pub fn completed(&self, committed_index: *const IndexValue) -> Self {
        Descriptor {
            phase: Phase::Complete,
            expected_old_index: committed_index,
            intended_new_index: std::ptr::null(),
            ..*self
        }
    }

    /// Terminal failure: the fresh index no longer admits `op`, or initial
    /// validation failed. Mirrors the original `descriptor::failed`, which
    /// carries only the observed index, never a proposed new one.
    pub fn failed(&self, observed_index: *const IndexValue) -> Self {
        Descriptor {
            phase: Phase::Fail,
            expected_old_index: observed_index,
            intended_new_index: std::ptr::null(),
            ..*self
        }
    }
}
