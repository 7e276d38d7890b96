//! Thread-safe chunked bump allocator.
//!
//! An [`ArenaAllocator`] hands out memory from large chunks by advancing an
//! atomic bump pointer. Individual frees are ignored; every chunk is returned
//! to the system when the arena is dropped. This suits registries whose
//! classes live for most of the process: allocation is a CAS, teardown is a
//! handful of `dealloc` calls.
//!
//! # Architecture
//!
//! - [`Chunk`]: one system allocation with an `AtomicPtr` bump pointer
//! - [`ArenaAllocator`]: list of chunks plus a pointer to the chunk that is
//!   currently being carved up
//!
//! Growth takes a lock; the allocation fast path never does.
//!
//! # Example
//!
//! ```
//! use std::alloc::Layout;
//! use oxitype_mem::{Allocator, ArenaAllocator};
//!
//! let arena = ArenaAllocator::new(16 * 1024);
//! let layout = Layout::from_size_align(24, 8).unwrap();
//!
//! let a = arena.alloc(layout).unwrap();
//! let b = arena.alloc(layout).unwrap();
//! assert_ne!(a, b);
//! assert!(arena.stats().total_allocated >= 48);
//! ```

use crate::alloc::{AllocError, Allocator};
use parking_lot::Mutex;
use std::alloc::{self as sys, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

/// Alignment of every chunk base.
const CHUNK_ALIGNMENT: usize = 16;

/// Smallest chunk the arena will create.
const MIN_CHUNK_SIZE: usize = 4096;

/// Chunks stop doubling at this size.
const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Arena allocation statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    /// Bytes handed out, including alignment padding inside requests.
    pub total_allocated: usize,
    /// Number of chunks owned by the arena.
    pub chunk_count: usize,
    /// Sum of all chunk capacities.
    pub total_capacity: usize,
}

/// One contiguous region carved up by an atomic bump pointer.
///
/// # Safety
///
/// - The region is owned by the chunk and freed in `Drop`
/// - The bump pointer only moves forward and never passes `end`
pub struct Chunk {
    start: NonNull<u8>,
    ptr: AtomicPtr<u8>,
    end: usize,
    capacity: usize,
}

// SAFETY: the region is only reached through the atomic bump pointer and
// every byte range is handed out exactly once.
unsafe impl Send for Chunk {}
unsafe impl Sync for Chunk {}

impl Chunk {
    fn new(capacity: usize) -> Result<Box<Self>, AllocError> {
        let layout = Layout::from_size_align(capacity, CHUNK_ALIGNMENT)
            .map_err(|_| AllocError::InvalidLayout)?;

        // SAFETY: capacity is at least MIN_CHUNK_SIZE, so the layout is not zero-sized.
        let start = unsafe { sys::alloc(layout) };
        let start = NonNull::new(start).ok_or(AllocError::OutOfMemory {
            size: capacity,
            align: CHUNK_ALIGNMENT,
        })?;

        Ok(Box::new(Chunk {
            start,
            ptr: AtomicPtr::new(start.as_ptr()),
            end: start.as_ptr().addr() + capacity,
            capacity,
        }))
    }

    /// Bumps the pointer for `size` bytes at `align`, or returns `None` if
    /// the chunk is exhausted.
    #[inline]
    fn try_alloc(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        loop {
            let current = self.ptr.load(Ordering::Acquire);
            let aligned_start = current.addr().checked_add(align - 1)? & !(align - 1);
            let new_addr = aligned_start.checked_add(size)?;

            if new_addr > self.end {
                return None;
            }

            if self
                .ptr
                .compare_exchange_weak(
                    current,
                    current.with_addr(new_addr),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                // `aligned_start` lies inside the chunk (checked above) and
                // `with_addr` keeps the chunk's provenance.
                return NonNull::new(current.with_addr(aligned_start));
            }
        }
    }

    fn used(&self) -> usize {
        self.ptr.load(Ordering::Acquire).addr() - self.start.as_ptr().addr()
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        // SAFETY: the layout matches the one used in `Chunk::new`.
        unsafe {
            let layout = Layout::from_size_align_unchecked(self.capacity, CHUNK_ALIGNMENT);
            sys::dealloc(self.start.as_ptr(), layout);
        }
    }
}

/// Thread-safe arena usable as a registry [`Allocator`].
///
/// # Thread Safety
///
/// Any number of threads may allocate concurrently; they race on the current
/// chunk's bump pointer with CAS. Only chunk growth is serialized.
///
/// # Lifetime
///
/// `free` is a no-op. Memory lives until the arena is dropped, so the arena
/// must outlive everything allocated from it; holding it in an `Arc` shared
/// with the registry guarantees that.
pub struct ArenaAllocator {
    chunks: Mutex<Vec<Box<Chunk>>>,
    current: AtomicPtr<Chunk>,
    chunk_size: AtomicUsize,
    total_allocated: AtomicUsize,
}

impl ArenaAllocator {
    /// Creates an arena whose first chunk holds `chunk_size` bytes (rounded up
    /// to a power of two, at least 4 KiB).
    ///
    /// # Panics
    ///
    /// Panics if the first chunk cannot be allocated.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        match Self::try_new(chunk_size) {
            Ok(arena) => arena,
            Err(e) => panic!("ArenaAllocator: {e}"),
        }
    }

    /// Fallible form of [`ArenaAllocator::new`].
    ///
    /// # Errors
    ///
    /// Returns the system allocator's failure for the first chunk.
    pub fn try_new(chunk_size: usize) -> Result<Self, AllocError> {
        let size = chunk_size.max(MIN_CHUNK_SIZE).next_power_of_two();
        let mut first = Chunk::new(size)?;
        let first_ptr: *mut Chunk = &mut *first;

        Ok(ArenaAllocator {
            chunks: Mutex::new(vec![first]),
            current: AtomicPtr::new(first_ptr),
            chunk_size: AtomicUsize::new(size),
            total_allocated: AtomicUsize::new(0),
        })
    }

    /// Returns allocation statistics.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        let chunks = self.chunks.lock();
        ArenaStats {
            total_allocated: self.total_allocated.load(Ordering::Relaxed),
            chunk_count: chunks.len(),
            total_capacity: chunks.iter().map(|c| c.capacity).sum(),
        }
    }

    /// Bytes consumed from chunks, including padding between requests.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.chunks.lock().iter().map(|c| c.used()).sum()
    }

    /// Installs a fresh chunk large enough for `size` bytes at `align`.
    ///
    /// `seen` is the chunk the caller failed on; if another thread already
    /// replaced it, nothing is allocated.
    #[cold]
    fn grow(&self, seen: *mut Chunk, size: usize, align: usize) -> Result<(), AllocError> {
        let mut chunks = self.chunks.lock();
        if self.current.load(Ordering::Acquire) != seen {
            return Ok(());
        }

        let doubled = (self.chunk_size.load(Ordering::Relaxed) * 2).min(MAX_CHUNK_SIZE);
        let needed = size
            .checked_add(align)
            .ok_or(AllocError::InvalidLayout)?
            .next_power_of_two();
        let capacity = doubled.max(needed);

        let mut chunk = Chunk::new(capacity)?;
        let chunk_ptr: *mut Chunk = &mut *chunk;
        chunks.push(chunk);
        self.chunk_size.store(capacity, Ordering::Relaxed);
        self.current.store(chunk_ptr, Ordering::Release);
        Ok(())
    }
}

impl Allocator for ArenaAllocator {
    fn alloc(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Err(AllocError::ZeroSized);
        }

        loop {
            let current = self.current.load(Ordering::Acquire);
            // SAFETY: `current` always points at a chunk owned by
            // `self.chunks`, and chunks are never removed before drop.
            let chunk = unsafe { &*current };

            if let Some(ptr) = chunk.try_alloc(layout.size(), layout.align()) {
                self.total_allocated.fetch_add(layout.size(), Ordering::Relaxed);
                return Ok(ptr);
            }

            self.grow(current, layout.size(), layout.align())?;
        }
    }

    unsafe fn realloc(
        &self,
        ptr: NonNull<u8>,
        layout: Layout,
        new_size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        if new_size <= layout.size() && new_size > 0 {
            return Ok(ptr);
        }
        let new_layout = Layout::from_size_align(new_size, layout.align())
            .map_err(|_| AllocError::InvalidLayout)?;
        let new = self.alloc(new_layout)?;
        // SAFETY: the old block is valid for `layout.size()` bytes, the new
        // one for more, and bump allocation never overlaps live blocks.
        unsafe {
            new.as_ptr()
                .copy_from_nonoverlapping(ptr.as_ptr(), layout.size());
        }
        Ok(new)
    }

    unsafe fn free(&self, _ptr: NonNull<u8>, _layout: Layout) {}
}

impl std::fmt::Debug for ArenaAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ArenaAllocator")
            .field("total_allocated", &stats.total_allocated)
            .field("chunk_count", &stats.chunk_count)
            .field("total_capacity", &stats.total_capacity)
            .finish()
    }
}
