//! Memory providers for index and descriptor records (spec §9).
//!
//! The algorithm treats allocation as a pluggable concern: [`RecordProvider`]
//! is the seam, grounded on halo's `GhostAlloc` trait shape but simplified —
//! there is no token here, since these records are shared across
//! uncoordinated OS threads rather than gated by a single logical owner.
//! [`SystemProvider`] delegates straight to the global allocator.
//! [`PooledProvider`] reuses retired records from a thread-local free list,
//! sized to `MAX_RETRY + 2` per kind as suggested in spec §9, to absorb the
//! allocation pressure that rollback-then-retry otherwise puts on the
//! global allocator.

use std::alloc::{alloc, dealloc, Layout};
use std::cell::RefCell;
use std::ptr;

use super::descriptor::Descriptor;
use super::error::AllocError;
use super::index::IndexValue;

/// Supplies and reclaims the fixed-size records the deque publishes.
///
/// # Safety
///
/// Implementors must ensure `alloc_*` returns a pointer valid for reads and
/// writes of `T` until it is passed to the matching `dealloc_*`, and that
/// `dealloc_*` is never called twice on the same pointer or on a pointer
/// this provider did not hand out.
pub trait RecordProvider: Send + Sync {
    /// Allocate and initialize an `IndexValue` record.
    fn alloc_index(&self, value: IndexValue) -> Result<*mut IndexValue, AllocError>;

    /// Reclaim an `IndexValue` previously returned by `alloc_index`.
    ///
    /// # Safety
    /// `ptr` must have come from this provider's `alloc_index` and must not
    /// still be reachable from the deque's `index` atomic or any in-flight
    /// descriptor.
    unsafe fn dealloc_index(&self, ptr: *mut IndexValue);

    /// Allocate and initialize a `Descriptor` record.
    fn alloc_descriptor(&self, value: Descriptor) -> Result<*mut Descriptor, AllocError>;

    /// Reclaim a `Descriptor` previously returned by `alloc_descriptor`.
    ///
    /// # Safety
    /// `ptr` must have come from this provider's `alloc_descriptor` and must
    /// not still be reachable from the deque's `registered` atomic.
    unsafe fn dealloc_descriptor(&self, ptr: *mut Descriptor);
}

/// Allocate a single `T` on the global heap and write `value` into it.
fn raw_alloc<T>(value: T) -> Result<*mut T, AllocError> {
    let layout = Layout::new::<T>();
    // SAFETY: `layout` is non-zero-sized for both record types this crate
    // ever instantiates.
    let raw = unsafe { alloc(layout) } as *mut T;
    if raw.is_null() {
        return Err(AllocError);
    }
    // SAFETY: `raw` was just allocated with `Layout::new::<T>()` and is
    // correctly aligned; nothing has read it yet.
    unsafe { ptr::write(raw, value) };
    Ok(raw)
}

/// Drop and free a `T` previously returned by [`raw_alloc`].
///
/// # Safety
/// `ptr` must have come from `raw_alloc::<T>` and not already be freed.
unsafe fn raw_dealloc<T>(ptr: *mut T) {
    ptr::drop_in_place(ptr);
    dealloc(ptr as *mut u8, Layout::new::<T>());
}

/// A provider that allocates and frees directly through the global
/// allocator, with no reuse.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProvider;

impl RecordProvider for SystemProvider {
    fn alloc_index(&self, value: IndexValue) -> Result<*mut IndexValue, AllocError> {
        raw_alloc(value)
    }

    unsafe fn dealloc_index(&self, ptr: *mut IndexValue) {
        raw_dealloc(ptr);
    }

    fn alloc_descriptor(&self, value: Descriptor) -> Result<*mut Descriptor, AllocError> {
        raw_alloc(value)
    }

    unsafe fn dealloc_descriptor(&self, ptr: *mut Descriptor) {
        raw_dealloc(ptr);
    }
}

thread_local! {
    static INDEX_FREELIST: RefCell<Vec<*mut IndexValue>> = const { RefCell::new(Vec::new()) };
    static DESCRIPTOR_FREELIST: RefCell<Vec<*mut Descriptor>> = const { RefCell::new(Vec::new()) };
}

/// A provider that reuses retired records from a per-thread free list
/// before falling back to the global allocator, capped at `capacity_per_kind`
/// entries per record kind per thread.
///
/// # Safety
///
/// Pooled pointers never cross threads: a record freed on one thread is
/// only ever reused by an `alloc_*` call made on that same thread, so no
/// synchronization is needed around the free lists themselves.
#[derive(Debug, Clone, Copy)]
pub struct PooledProvider {
    capacity_per_kind: usize,
}

impl PooledProvider {
    /// `capacity_per_kind` bounds how many retired records of each kind a
    /// single thread will hold onto; spec §9 suggests `MAX_RETRY + 2`.
    pub fn new(capacity_per_kind: usize) -> Self {
        PooledProvider { capacity_per_kind }
    }
}

impl RecordProvider for PooledProvider {
    fn alloc_index(&self, value: IndexValue) -> Result<*mut IndexValue, AllocError> {
        let pooled = INDEX_FREELIST.with(|list| list.borrow_mut().pop());
        match pooled {
            Some(ptr) => {
                // SAFETY: `ptr` came from a prior `dealloc_index` on this
                // provider, kept alive (un-freed) in the free list instead.
                unsafe { ptr::write(ptr, value) };
                Ok(ptr)
            }
            None => raw_alloc(value),
        }
    }

    unsafe fn dealloc_index(&self, ptr: *mut IndexValue) {
        let returned = INDEX_FREELIST.with(|list| {
            let mut list = list.borrow_mut();
            if list.len() < self.capacity_per_kind {
                list.push(ptr);
                true
            } else {
                false
            }
        });
        if !returned {
            raw_dealloc(ptr);
        }
    }

    fn alloc_descriptor(&self, value: Descriptor) -> Result<*mut Descriptor, AllocError> {
        let pooled = DESCRIPTOR_FREELIST.with(|list| list.borrow_mut().pop());
        match pooled {
            Some(ptr) => {
                // SAFETY: see `alloc_index`.
                unsafe { ptr::write(ptr, value) };
                Ok(ptr)
            }
            None => raw_alloc(value),
        }
    }

    unsafe fn dealloc_descriptor(&self, ptr: *mut Descriptor) {
        let returned = DESCRIPTOR_FREELIST.with(|list| {
            let mut list = list.borrow_mut();
            if list.len() < self.capacity_per_kind {
                list.push(ptr);
                true
            } else {
                false
            }
        });
        if !returned {
            raw_dealloc(ptr);
        }
    }
}
