//! The deque core: fast path, slow path, and the helping routine
//! (spec §4.4-§4.7).
//!
//! Generalizes the original `fast_path`/`slow_path`/`help_registered*`
//! methods (`original_source/.../base_structures.cpp`) the way halo
//! generalizes its C-shaped building blocks into idiomatic Rust: `Result`/
//! `Option` returns at the public surface, `?`-free internals since the
//! algorithm has no fallible interior call besides allocation, and
//! `crossbeam_epoch`/`crossbeam_utils::CachePadded` in place of hand-rolled
//! equivalents halo either lacks or already delegates to upstream.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Shared};
use crossbeam_utils::CachePadded;

use super::descriptor::{Descriptor, Phase};
use super::error::{AllocError, PushError};
use super::index::{IndexValue, Op};
use super::provider::{RecordProvider, SystemProvider};
use super::reclaim::{defer_drop_descriptor, defer_drop_index};
use super::TaskHandle;

/// Bound on fast-path attempts before an operation publishes a descriptor
/// and falls back to cooperative helping (spec §4.4 Phase B, §9).
pub const MAX_RETRY: usize = 4;

/// Smallest usable capacity: below this the `M = N + 2` circular array
/// degenerates and the empty/full sentinel encodings stop being meaningful.
pub const MIN_CAPACITY: usize = 64;

/// Largest usable capacity (spec §6: "≤ ~4·10⁹"), matching the original
/// source's `0xFFFFFFFD` bound exactly.
pub const MAX_CAPACITY: u64 = 0xFFFF_FFFD;

const EMPTY_SLOT: usize = 0;

/// Outcome of a single operation once it has run to a terminal phase.
enum OpOutcome {
    Full,
    Empty,
    Alloc(AllocError),
}

enum FastPathOutcome {
    Success(usize),
    Terminal(OpOutcome),
    Retry,
}

enum IndexCommit {
    Won,
    Helped,
    Lost,
}

/// A bounded, concurrent, double-ended task queue.
///
/// `N` is the usable capacity (spec §6); the backing slot array holds
/// `N + 2` cells, reserving two sentinels so "empty" and "full" have
/// distinguishable index encodings (spec §3 I3).
///
/// Every operation first helps any currently-registered descriptor (spec
/// §4.4 Phase A), then attempts up to [`MAX_RETRY`] lock-free fast-path
/// tries (Phase B), and finally publishes its own descriptor for
/// cooperative, wait-free completion (Phase C) if the fast path does not
/// land.
pub struct TaskDeque<const N: usize> {
    index: CachePadded<Atomic<IndexValue>>,
    registered: CachePadded<Atomic<Descriptor>>,
    slots: Box<[AtomicUsize]>,
    provider: Arc<dyn RecordProvider>,
}

// SAFETY: all shared state is reached only through atomics or immutable
// published records; `provider` is itself `Send + Sync`.
unsafe impl<const N: usize> Send for TaskDeque<N> {}
unsafe impl<const N: usize> Sync for TaskDeque<N> {}

impl<const N: usize> TaskDeque<N> {
    /// Construct a deque backed by the global allocator.
    ///
    /// # Panics
    /// Panics if `N` is outside `[MIN_CAPACITY, MAX_CAPACITY]`, or if the
    /// global allocator cannot supply the initial index record.
    pub fn new() -> Self {
        Self::with_provider(Arc::new(SystemProvider))
    }

    /// Construct a deque backed by a caller-supplied [`RecordProvider`].
    ///
    /// # Panics
    /// Panics if `N` is outside `[MIN_CAPACITY, MAX_CAPACITY]`, or if
    /// `provider` cannot supply the initial index record (spec §6's
    /// "construct" error condition, "provider allocation failure").
    pub fn with_provider(provider: Arc<dyn RecordProvider>) -> Self {
        assert!(
            N >= MIN_CAPACITY,
            "TaskDeque capacity must be at least {MIN_CAPACITY}, got {N}"
        );
        assert!(
            N as u64 <= MAX_CAPACITY,
            "TaskDeque capacity must be at most {MAX_CAPACITY}, got {N}"
        );

        let m = N + 2;
        let slots = (0..m)
            .map(|_| AtomicUsize::new(EMPTY_SLOT))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        // The initial record must come from `provider` like every other
        // index record the deque ever holds, since it is retired through
        // `provider.dealloc_index` the first time it is superseded (or
        // freed directly by `Drop`).
        let initial_index = provider
            .alloc_index(IndexValue::INITIAL)
            .expect("RecordProvider failed to allocate the initial index record");

        TaskDeque {
            index: CachePadded::new(Atomic::from(Shared::from(initial_index as *const IndexValue))),
            registered: CachePadded::new(Atomic::null()),
            slots,
            provider,
        }
    }

    /// Usable capacity (the `N` the deque was constructed with).
    pub fn capacity(&self) -> usize {
        N
    }

    /// Insert `task` at the front. Fails with [`PushError::Full`] if the
    /// deque holds `N` handles at the linearization point.
    pub fn push_front(&self, task: TaskHandle) -> Result<(), PushError> {
        self.push(Op::PushFront, task)
    }

    /// Insert `task` at the back. Fails with [`PushError::Full`] if the
    /// deque holds `N` handles at the linearization point.
    pub fn push_back(&self, task: TaskHandle) -> Result<(), PushError> {
        self.push(Op::PushBack, task)
    }

    /// Remove and return the front handle, or `None` if the deque was
    /// empty at the linearization point.
    pub fn pop_front(&self) -> Option<TaskHandle> {
        self.pop(Op::PopFront)
    }

    /// Remove and return the back handle, or `None` if the deque was
    /// empty at the linearization point.
    pub fn pop_back(&self) -> Option<TaskHandle> {
        self.pop(Op::PopBack)
    }

    fn push(&self, op: Op, task: TaskHandle) -> Result<(), PushError> {
        let guard = &epoch::pin();
        match self.execute(op, task.into_raw(), guard) {
            Ok(_) => Ok(()),
            Err(OpOutcome::Full) => Err(PushError::Full),
            Err(OpOutcome::Alloc(e)) => Err(PushError::Allocation(e)),
            Err(OpOutcome::Empty) => unreachable!("a push can never observe Empty"),
        }
    }

    fn pop(&self, op: Op) -> Option<TaskHandle> {
        let guard = &epoch::pin();
        match self.execute(op, EMPTY_SLOT, guard) {
            Ok(old_task) => TaskHandle::from_raw(old_task),
            Err(_) => None,
        }
    }

    fn m(&self) -> usize {
        self.slots.len()
    }

    /// Drive one operation through Phase A (help), Phase B (bounded fast
    /// path), and Phase C (slow path with helping) as needed.
    fn execute(&self, op: Op, new_task: usize, guard: &Guard) -> Result<usize, OpOutcome> {
        self.help_any_registered(guard);

        for _ in 0..MAX_RETRY {
            match self.try_fast_path(op, new_task, guard) {
                FastPathOutcome::Success(old) => return Ok(old),
                FastPathOutcome::Terminal(outcome) => return Err(outcome),
                FastPathOutcome::Retry => continue,
            }
        }

        self.slow_path(op, new_task, guard)
    }

    // ---- Phase B: fast path (spec §4.4 Phase B) ----

    fn try_fast_path(&self, op: Op, new_task: usize, guard: &Guard) -> FastPathOutcome {
        let m = self.m();
        let old_index_shared = self.index.load(Ordering::Acquire, guard);
        // SAFETY: `index` always points at a live `IndexValue` once pinned.
        let old_index_value = unsafe { *old_index_shared.deref() };

        if !old_index_value.is_valid(op, m) {
            return FastPathOutcome::Terminal(if op.is_push() {
                OpOutcome::Full
            } else {
                OpOutcome::Empty
            });
        }

        let new_index_value = old_index_value.next(op, m);
        let target_slot = old_index_value.target_slot(op, m);
        let old_task = self.slots[target_slot].load(Ordering::Acquire);
        let intended_new_task = if op.is_push() { new_task } else { EMPTY_SLOT };

        let new_index_ptr = match self.provider.alloc_index(new_index_value) {
            Ok(ptr) => ptr,
            Err(e) => return FastPathOutcome::Terminal(OpOutcome::Alloc(e)),
        };
        let new_index_shared = Shared::from(new_index_ptr as *const IndexValue);

        if !self.try_commit_task(target_slot, old_task, intended_new_task) {
            // SAFETY: `new_index_ptr` was never published anywhere; we are
            // its sole owner.
            unsafe { self.provider.dealloc_index(new_index_ptr) };
            return FastPathOutcome::Retry;
        }

        match self.try_commit_index(old_index_shared, new_index_shared, guard) {
            IndexCommit::Won => {
                self.retire_index(old_index_shared, guard);
                FastPathOutcome::Success(old_task)
            }
            IndexCommit::Helped => FastPathOutcome::Success(old_task),
            IndexCommit::Lost => {
                self.rollback_task_slot(target_slot, old_task);
                // SAFETY: never published; sole owner.
                unsafe { self.provider.dealloc_index(new_index_ptr) };
                FastPathOutcome::Retry
            }
        }
    }

    // ---- Phase C: slow path (spec §4.4 Phase C) ----

    fn slow_path(&self, op: Op, new_task: usize, guard: &Guard) -> Result<usize, OpOutcome> {
        #[cfg(feature = "tracing")]
        tracing::trace!(op = ?op, "entering task deque slow path");

        loop {
            let desc_ptr = match self.build_reserve_descriptor(op, new_task, guard) {
                Ok(ptr) => ptr,
                Err(outcome) => return Err(outcome),
            };
            let desc_shared = Shared::from(desc_ptr as *const Descriptor);

            match self.registered.compare_exchange(
                Shared::null(),
                desc_shared,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => return self.drive_registered_to_terminal(desc_shared, guard),
                Err(e) => {
                    // SAFETY: never published; sole owner of both the
                    // descriptor and (if any) its owned candidate index.
                    let snapshot = unsafe { *desc_ptr };
                    self.discard_unpublished_reserve(desc_ptr, snapshot);

                    let other = e.current;
                    if !other.is_null() {
                        // A failure to help here just means this thread
                        // gives up and loops back to build its own
                        // descriptor again; it carries no error to report.
                        let _ = self.help_registered(other, guard);
                    }
                }
            }
        }
    }

    fn build_reserve_descriptor(
        &self,
        op: Op,
        new_task: usize,
        guard: &Guard,
    ) -> Result<*mut Descriptor, OpOutcome> {
        let m = self.m();
        let old_index_shared = self.index.load(Ordering::Acquire, guard);
        let old_index_value = unsafe { *old_index_shared.deref() };

        if !old_index_value.is_valid(op, m) {
            return Err(if op.is_push() {
                OpOutcome::Full
            } else {
                OpOutcome::Empty
            });
        }

        let new_index_value = old_index_value.next(op, m);
        let target_slot = old_index_value.target_slot(op, m);
        let old_task = self.slots[target_slot].load(Ordering::Acquire);
        let intended_new_task = if op.is_push() { new_task } else { EMPTY_SLOT };

        let new_index_ptr = self
            .provider
            .alloc_index(new_index_value)
            .map_err(OpOutcome::Alloc)?;

        let descriptor = Descriptor::reserve(
            op,
            target_slot,
            old_task,
            intended_new_task,
            old_index_shared.as_raw(),
            new_index_ptr as *const IndexValue,
        );

        self.provider.alloc_descriptor(descriptor).map_err(|e| {
            // SAFETY: never published; sole owner.
            unsafe { self.provider.dealloc_index(new_index_ptr) };
            OpOutcome::Alloc(e)
        })
    }

    /// Called only by the thread that won registration of `desc`: drive it
    /// to a terminal phase, clear `registered`, and return the outcome.
    fn drive_registered_to_terminal<'g>(
        &self,
        desc: Shared<'g, Descriptor>,
        guard: &'g Guard,
    ) -> Result<usize, OpOutcome> {
        // If helping bails out with an allocation failure, `desc` is still
        // published and in phase RESERVE; this thread reports the failure
        // to its own caller without clearing `registered`, leaving the
        // descriptor for a later caller's Phase A help pass to finish once
        // the provider has memory again.
        let terminal = self.help_registered(desc, guard).map_err(OpOutcome::Alloc)?;
        // SAFETY: `help_registered` only returns `Ok` once the pointee is
        // in a terminal phase, which is never mutated further.
        let snapshot = unsafe { *terminal.deref() };

        // Any thread still helping an already-terminal descriptor returns
        // immediately at H1, so clearing `registered` here cannot strand a
        // helper mid-step.
        let _ = self.registered.compare_exchange(
            terminal,
            Shared::null(),
            Ordering::AcqRel,
            Ordering::Acquire,
            guard,
        );
        self.retire_descriptor(terminal, guard);

        match snapshot.phase {
            Phase::Complete => Ok(snapshot.expected_old_task),
            Phase::Fail => Err(if snapshot.op.is_push() {
                OpOutcome::Full
            } else {
                OpOutcome::Empty
            }),
            Phase::Reserve => unreachable!("help_registered only returns a terminal descriptor"),
        }
    }

    // ---- §4.5 Helping routine ----

    fn help_any_registered(&self, guard: &Guard) {
        let current = self.registered.load(Ordering::Acquire, guard);
        if !current.is_null() {
            // A helper that cannot make progress due to allocator
            // exhaustion just stops helping; the descriptor stays
            // registered for a later caller to pick up.
            let _ = self.help_registered(current, guard);
        }
    }

    /// Drives the descriptor chain rooted at `desc` to a terminal phase.
    /// Any number of threads may call this concurrently on the same chain.
    ///
    /// Returns `Err` if the provider cannot supply a record needed to
    /// advance the chain; `desc` (or whatever descriptor is current at
    /// that point) is left published and unterminated for a later call to
    /// retry, rather than spinning until memory becomes available.
    fn help_registered<'g>(
        &self,
        mut current: Shared<'g, Descriptor>,
        guard: &'g Guard,
    ) -> Result<Shared<'g, Descriptor>, AllocError> {
        loop {
            if current.is_null() {
                return Ok(current);
            }
            // SAFETY: a descriptor is freed only after the owning thread's
            // CAS clears `registered` and the resulting retirement is
            // deferred past this guard's epoch.
            let snapshot = unsafe { *current.deref() };
            match snapshot.phase {
                Phase::Complete | Phase::Fail => return Ok(current),
                Phase::Reserve => current = self.help_reserve(current, snapshot, guard)?,
            }
        }
    }

    fn help_reserve<'g>(
        &self,
        desc: Shared<'g, Descriptor>,
        snapshot: Descriptor,
        guard: &'g Guard,
    ) -> Result<Shared<'g, Descriptor>, AllocError> {
        #[cfg(feature = "tracing")]
        tracing::trace!(target_slot = snapshot.target_slot, "helping registered descriptor");

        if !self.try_commit_task(snapshot.target_slot, snapshot.expected_old_task, snapshot.intended_new_task) {
            // Slot CAS genuinely lost (not "helped"): some other descriptor
            // has advanced the slot. Re-read `registered` and let the
            // outer loop re-examine its phase.
            return Ok(self.reload_registered(guard));
        }

        let old_index_shared = Shared::from(snapshot.expected_old_index);
        let new_index_shared = Shared::from(snapshot.intended_new_index);

        match self.try_commit_index(old_index_shared, new_index_shared, guard) {
            IndexCommit::Won => {
                self.retire_index(old_index_shared, guard);
                Ok(self.install_completed(desc, snapshot, guard))
            }
            IndexCommit::Helped => {
                // Another helper won this exact descriptor's index CAS and
                // owns the duty of installing its Complete successor.
                Ok(self.reload_registered(guard))
            }
            IndexCommit::Lost => {
                self.rollback_task_slot(snapshot.target_slot, snapshot.expected_old_task);
                self.install_rollback(desc, snapshot, guard)
            }
        }
    }

    fn install_completed<'g>(
        &self,
        desc: Shared<'g, Descriptor>,
        snapshot: Descriptor,
        guard: &'g Guard,
    ) -> Shared<'g, Descriptor> {
        loop {
            let committed_index = self.index.load(Ordering::Acquire, guard).as_raw();
            let successor_value = snapshot.completed(committed_index);
            let successor_ptr = match self.provider.alloc_descriptor(successor_value) {
                Ok(ptr) => ptr,
                Err(_) => {
                    // Allocation is expected not to fail in steady state
                    // (spec §7); under true exhaustion, another helper
                    // racing the same install eventually succeeds.
                    let current = self.registered.load(Ordering::Acquire, guard);
                    if current.is_null() || unsafe { current.deref().phase } != Phase::Reserve {
                        return current;
                    }
                    continue;
                }
            };
            let successor_shared = Shared::from(successor_ptr as *const Descriptor);

            match self.registered.compare_exchange(
                desc,
                successor_shared,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    self.retire_descriptor(desc, guard);
                    return successor_shared;
                }
                Err(e) => {
                    // SAFETY: never published; sole owner, and a `Complete`
                    // successor never owns an `intended_new_index`.
                    unsafe { self.provider.dealloc_descriptor(successor_ptr) };
                    return e.current;
                }
            }
        }
    }

    /// Builds and publishes `desc`'s rollback successor (spec §4.5 H2's
    /// rollback branch). The target slot has already been rolled back by
    /// the caller and the operation has not committed, so — unlike
    /// [`TaskDeque::install_completed`], which must eventually succeed
    /// because its operation already committed — this never retries an
    /// allocation failure: a provider that cannot supply a record is
    /// treated the same as an index that no longer permits `snapshot.op`
    /// (spec §7: "tolerates provider-returned null by failing the current
    /// operation with phase FAIL"), and a provider that cannot even
    /// supply the terminal descriptor itself reports `Err` immediately so
    /// the caller can terminate instead of spinning.
    fn install_rollback<'g>(
        &self,
        desc: Shared<'g, Descriptor>,
        snapshot: Descriptor,
        guard: &'g Guard,
    ) -> Result<Shared<'g, Descriptor>, AllocError> {
        let fresh_index_shared = self.index.load(Ordering::Acquire, guard);
        let fresh_index_value = unsafe { *fresh_index_shared.deref() };
        let m = self.m();

        let successor_value = if fresh_index_value.is_valid(snapshot.op, m) {
            match self.provider.alloc_index(fresh_index_value.next(snapshot.op, m)) {
                Ok(next_ptr) => {
                    snapshot.rolled_back(fresh_index_shared.as_raw(), next_ptr as *const IndexValue)
                }
                Err(_) => snapshot.failed(fresh_index_shared.as_raw()),
            }
        } else {
            snapshot.failed(fresh_index_shared.as_raw())
        };

        let successor_ptr = match self.provider.alloc_descriptor(successor_value) {
            Ok(ptr) => ptr,
            Err(e) => {
                if successor_value.phase == Phase::Reserve {
                    // SAFETY: never published; sole owner of the candidate
                    // index record we just allocated above.
                    unsafe {
                        self.provider
                            .dealloc_index(successor_value.intended_new_index as *mut IndexValue)
                    };
                }
                return Err(e);
            }
        };
        let successor_shared = Shared::from(successor_ptr as *const Descriptor);

        match self.registered.compare_exchange(
            desc,
            successor_shared,
            Ordering::AcqRel,
            Ordering::Acquire,
            guard,
        ) {
            Ok(_) => {
                self.retire_descriptor(desc, guard);
                Ok(successor_shared)
            }
            Err(e) => {
                self.discard_unpublished_reserve(successor_ptr, successor_value);
                Ok(e.current)
            }
        }
    }

    fn reload_registered<'g>(&self, guard: &'g Guard) -> Shared<'g, Descriptor> {
        self.registered.load(Ordering::Acquire, guard)
    }

    // ---- §4.2/§4.3 slot and index commit primitives ----

    fn try_commit_task(&self, target_slot: usize, expected_old_task: usize, intended_new_task: usize) -> bool {
        match self.slots[target_slot].compare_exchange(
            expected_old_task,
            intended_new_task,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(observed) => observed == intended_new_task,
        }
    }

    fn rollback_task_slot(&self, target_slot: usize, expected_old_task: usize) {
        self.slots[target_slot].store(expected_old_task, Ordering::Release);
    }

    fn try_commit_index<'g>(
        &self,
        expected_old_index: Shared<'g, IndexValue>,
        intended_new_index: Shared<'g, IndexValue>,
        guard: &'g Guard,
    ) -> IndexCommit {
        match self.index.compare_exchange(
            expected_old_index,
            intended_new_index,
            Ordering::AcqRel,
            Ordering::Acquire,
            guard,
        ) {
            Ok(_) => IndexCommit::Won,
            Err(e) if e.current == intended_new_index => IndexCommit::Helped,
            Err(_) => IndexCommit::Lost,
        }
    }

    fn retire_index<'g>(&self, old_index: Shared<'g, IndexValue>, guard: &'g Guard) {
        if old_index.is_null() {
            return;
        }
        let raw = old_index.as_raw() as *mut IndexValue;
        // SAFETY: `old_index` was just replaced as the live value of
        // `self.index` by a winning CAS; no future loader can observe it.
        unsafe { defer_drop_index(&self.provider, raw, guard) };
    }

    fn retire_descriptor<'g>(&self, old_desc: Shared<'g, Descriptor>, guard: &'g Guard) {
        if old_desc.is_null() {
            return;
        }
        let raw = old_desc.as_raw() as *mut Descriptor;
        // SAFETY: `old_desc` was just replaced as the live value of
        // `self.registered` by a winning CAS; no future loader can observe
        // it.
        unsafe { defer_drop_descriptor(&self.provider, raw, guard) };
    }

    /// Free a RESERVE-phase descriptor that was never published, along
    /// with the index record it speculatively owns (if any).
    fn discard_unpublished_reserve(&self, ptr: *mut Descriptor, snapshot: Descriptor) {
        if snapshot.phase == Phase::Reserve && !snapshot.intended_new_index.is_null() {
            // SAFETY: never published; sole owner.
            unsafe {
                self.provider
                    .dealloc_index(snapshot.intended_new_index as *mut IndexValue)
            };
        }
        // SAFETY: never published; sole owner.
        unsafe { self.provider.dealloc_descriptor(ptr) };
    }
}

impl<const N: usize> Default for TaskDeque<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Drop for TaskDeque<N> {
    /// Frees the live index record and, if an operation's descriptor is
    /// still registered, its owned candidate index and the descriptor
    /// itself.
    ///
    /// The caller must quiesce all other threads that might still be
    /// calling `push_front`/`push_back`/`pop_front`/`pop_back` on this
    /// deque before dropping it (spec §6: "destroy ... must quiesce
    /// first"). `&mut self` only proves no concurrent call is in flight
    /// through *this* binding; it cannot detect another thread still
    /// holding a reference, so violating this requirement is undefined
    /// behavior rather than a panic.
    fn drop(&mut self) {
        let guard = &epoch::pin();

        let index_shared = self.index.load(Ordering::Acquire, guard);
        if !index_shared.is_null() {
            // SAFETY: quiescent by construction (see above).
            unsafe {
                self.provider
                    .dealloc_index(index_shared.as_raw() as *mut IndexValue)
            };
        }

        let registered_shared = self.registered.load(Ordering::Acquire, guard);
        if !registered_shared.is_null() {
            // SAFETY: quiescent by construction.
            let snapshot = unsafe { *registered_shared.deref() };
            if snapshot.phase == Phase::Reserve && !snapshot.intended_new_index.is_null() {
                unsafe {
                    self.provider
                        .dealloc_index(snapshot.intended_new_index as *mut IndexValue)
                };
            }
            unsafe {
                self.provider
                    .dealloc_descriptor(registered_shared.as_raw() as *mut Descriptor)
            };
        }
    }
}
