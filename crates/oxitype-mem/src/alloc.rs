//! The allocation capability consumed by the type registry.
//!
//! # Contract
//!
//! - `alloc` returns memory valid for `layout.size()` bytes aligned to
//!   `layout.align()`; contents are unspecified.
//! - `realloc` preserves the first `min(old, new)` bytes.
//! - `free` receives the same layout that produced the pointer.
//! - Zero-sized layouts are rejected with [`AllocError::ZeroSized`].
//!
//! # Thread Safety
//!
//! Implementations are shared between threads behind an `Arc`, so every
//! method takes `&self` and must be safe to call concurrently.

use std::alloc::{self as sys, Layout};
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Failure reported by an [`Allocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The backing store could not satisfy the request.
    OutOfMemory {
        /// Requested size in bytes.
        size: usize,
        /// Requested alignment in bytes.
        align: usize,
    },
    /// A zero-sized allocation was requested.
    ZeroSized,
    /// Size and alignment do not form a valid layout.
    InvalidLayout,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::OutOfMemory { size, align } => {
                write!(f, "Out of memory: {size} bytes aligned to {align}")
            }
            AllocError::ZeroSized => write!(f, "Zero-sized allocation requested"),
            AllocError::InvalidLayout => write!(f, "Invalid allocation layout"),
        }
    }
}

impl std::error::Error for AllocError {}

/// Byte allocation with explicit alignment.
pub trait Allocator: Send + Sync {
    /// Allocates a block described by `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] if the block cannot be provided.
    fn alloc(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Resizes a block previously returned by `alloc` with `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] if the new block cannot be provided; the old
    /// block is still valid in that case.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator for `layout` and not
    /// freed since.
    unsafe fn realloc(
        &self,
        ptr: NonNull<u8>,
        layout: Layout,
        new_size: usize,
    ) -> Result<NonNull<u8>, AllocError>;

    /// Releases a block.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator for `layout` and not
    /// freed since.
    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout);

    /// Allocates a zero-filled block.
    ///
    /// # Errors
    ///
    /// Same as [`Allocator::alloc`].
    fn alloc_zeroed(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.alloc(layout)?;
        // SAFETY: `ptr` is valid for `layout.size()` writable bytes.
        unsafe { ptr.as_ptr().write_bytes(0, layout.size()) };
        Ok(ptr)
    }
}

/// Forwards to the process allocator (`std::alloc`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    fn alloc(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Err(AllocError::ZeroSized);
        }
        // SAFETY: layout has a non-zero size (checked above).
        let ptr = unsafe { sys::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError::OutOfMemory {
            size: layout.size(),
            align: layout.align(),
        })
    }

    fn alloc_zeroed(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Err(AllocError::ZeroSized);
        }
        // SAFETY: layout has a non-zero size (checked above).
        let ptr = unsafe { sys::alloc_zeroed(layout) };
        NonNull::new(ptr).ok_or(AllocError::OutOfMemory {
            size: layout.size(),
            align: layout.align(),
        })
    }

    unsafe fn realloc(
        &self,
        ptr: NonNull<u8>,
        layout: Layout,
        new_size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        if new_size == 0 {
            return Err(AllocError::ZeroSized);
        }
        Layout::from_size_align(new_size, layout.align())
            .map_err(|_| AllocError::InvalidLayout)?;
        // SAFETY: caller guarantees `ptr` came from this allocator with
        // `layout`; the new size forms a valid layout (checked above).
        let new = unsafe { sys::realloc(ptr.as_ptr(), layout, new_size) };
        NonNull::new(new).ok_or(AllocError::OutOfMemory {
            size: new_size,
            align: layout.align(),
        })
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: caller guarantees `ptr` came from `alloc` with `layout`.
        unsafe { sys::dealloc(ptr.as_ptr(), layout) };
    }
}

/// Snapshot of a [`TrackingAllocator`]'s counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackingStats {
    /// Blocks currently allocated.
    pub live_allocations: usize,
    /// Bytes currently allocated.
    pub live_bytes: usize,
    /// Blocks ever allocated.
    pub total_allocations: usize,
    /// Requests the inner allocator refused.
    pub failures: usize,
}

/// Wraps an allocator and counts what is outstanding.
///
/// Used to prove that class and instance teardown return every byte.
///
/// # Example
///
/// ```
/// use std::alloc::Layout;
/// use oxitype_mem::{Allocator, SystemAllocator, TrackingAllocator};
///
/// let tracker = TrackingAllocator::new(SystemAllocator);
/// let layout = Layout::from_size_align(32, 8).unwrap();
/// let ptr = tracker.alloc(layout).unwrap();
/// assert_eq!(tracker.stats().live_bytes, 32);
///
/// unsafe { tracker.free(ptr, layout) };
/// assert_eq!(tracker.stats().live_allocations, 0);
/// ```
#[derive(Debug, Default)]
pub struct TrackingAllocator<A> {
    inner: A,
    live_allocations: AtomicUsize,
    live_bytes: AtomicUsize,
    total_allocations: AtomicUsize,
    failures: AtomicUsize,
}

impl<A: Allocator> TrackingAllocator<A> {
    /// Wraps `inner` with zeroed counters.
    pub const fn new(inner: A) -> Self {
        TrackingAllocator {
            inner,
            live_allocations: AtomicUsize::new(0),
            live_bytes: AtomicUsize::new(0),
            total_allocations: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    /// Returns the current counters.
    #[must_use]
    pub fn stats(&self) -> TrackingStats {
        TrackingStats {
            live_allocations: self.live_allocations.load(Ordering::Acquire),
            live_bytes: self.live_bytes.load(Ordering::Acquire),
            total_allocations: self.total_allocations.load(Ordering::Acquire),
            failures: self.failures.load(Ordering::Acquire),
        }
    }

    /// Returns the wrapped allocator.
    #[must_use]
    pub fn inner(&self) -> &A {
        &self.inner
    }

    fn record<T>(&self, result: Result<T, AllocError>, size: usize) -> Result<T, AllocError> {
        match &result {
            Ok(_) => {
                self.live_allocations.fetch_add(1, Ordering::AcqRel);
                self.live_bytes.fetch_add(size, Ordering::AcqRel);
                self.total_allocations.fetch_add(1, Ordering::AcqRel);
            }
            Err(_) => {
                self.failures.fetch_add(1, Ordering::AcqRel);
            }
        }
        result
    }
}

impl<A: Allocator> Allocator for TrackingAllocator<A> {
    fn alloc(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.record(self.inner.alloc(layout), layout.size())
    }

    fn alloc_zeroed(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.record(self.inner.alloc_zeroed(layout), layout.size())
    }

    unsafe fn realloc(
        &self,
        ptr: NonNull<u8>,
        layout: Layout,
        new_size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        // SAFETY: forwarded contract.
        let result = unsafe { self.inner.realloc(ptr, layout, new_size) };
        match result {
            Ok(_) => {
                self.live_bytes.fetch_add(new_size, Ordering::AcqRel);
                self.live_bytes.fetch_sub(layout.size(), Ordering::AcqRel);
            }
            Err(_) => {
                self.failures.fetch_add(1, Ordering::AcqRel);
            }
        }
        result
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded contract.
        unsafe { self.inner.free(ptr, layout) };
        let previous = self.live_allocations.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "TrackingAllocator: free without matching alloc");
        self.live_bytes.fetch_sub(layout.size(), Ordering::AcqRel);
    }
}
