//! Safe deferred reclamation glue (spec §9).
//!
//! Grounded on the epoch-based reclamation used by the Michael-Scott queue
//! in the reference pack (`crossbeam_epoch::{Atomic, Shared, Guard}`): halo
//! itself has no reclamation story (its Treiber stack's doc comment punts
//! the problem entirely to the caller), so this crate reaches for
//! `crossbeam-epoch` directly rather than inventing a hazard-pointer or
//! quiescent-state scheme from scratch.
//!
//! Records are never freed through `crossbeam_epoch`'s own
//! `Guard::defer_destroy` (which assumes `Box`-compatible ownership): they
//! are reclaimed through the pluggable [`RecordProvider`](super::provider::RecordProvider)
//! instead, so `Guard::defer_unchecked` is used with a closure that routes
//! back through the provider. This is sound because the closure runs only
//! after every thread that could still observe the retired pointer has left
//! its current epoch, and the pointer is never touched again afterward.

use std::sync::Arc;

use crossbeam_epoch::Guard;

use super::descriptor::Descriptor;
use super::index::IndexValue;
use super::provider::RecordProvider;

/// Defer reclamation of a retired `IndexValue` until no pinned thread can
/// still observe it.
///
/// # Safety
/// `ptr` must have been allocated by `provider` and must already be
/// unreachable from the deque's `index` atomic and from every descriptor's
/// `expected_old_index`/`intended_new_index` fields.
pub unsafe fn defer_drop_index(
    provider: &Arc<dyn RecordProvider>,
    ptr: *mut IndexValue,
    guard: &Guard,
) {
    let provider = Arc::clone(provider);
    guard.defer_unchecked(move || {
        provider.dealloc_index(ptr);
    });
}

/// Defer reclamation of a retired `Descriptor` until no pinned thread can
/// still observe it.
///
/// # Safety
/// `ptr` must have been allocated by `provider` and must already be
/// unreachable from the deque's `registered` atomic.
pub unsafe fn defer_drop_descriptor(
    provider: &Arc<dyn RecordProvider>,
    ptr: *mut Descriptor,
    guard: &Guard,
) {
    let provider = Arc::clone(provider);
    guard.defer_unchecked(move || {
        provider.dealloc_descriptor(ptr);
    });
}
