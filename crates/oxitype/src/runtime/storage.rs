//! Byte storage for classes and instances.
//!
//! Both class objects and instance payloads are plain zeroed byte blocks
//! obtained from the registry's injected [`Allocator`]. [`Storage`] owns one
//! such block and gives bounds-checked typed access to it.

use crate::error::{Error, Result};
use oxitype_mem::Allocator;
use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

/// Alignment of every class and instance block.
pub const STORAGE_ALIGN: usize = 16;

/// Bytes of a built class.
pub type ClassData = Storage;

/// Bytes of a live instance.
pub type InstanceData = Storage;

/// An owned, zero-initialized block from an injected allocator.
///
/// # Example
///
/// ```rust
/// use oxitype::runtime::Storage;
/// use oxitype_mem::SystemAllocator;
/// use std::sync::Arc;
///
/// let mut data = Storage::new(Arc::new(SystemAllocator), 16).unwrap();
/// data.write::<u32>(4, 7).unwrap();
/// assert_eq!(data.read::<u32>(4).unwrap(), 7);
/// assert!(data.read::<u64>(12).is_err());
/// ```
pub struct Storage {
    ptr: NonNull<u8>,
    len: usize,
    allocator: Arc<dyn Allocator>,
}

// SAFETY: Storage uniquely owns its block; the allocator is Send + Sync.
unsafe impl Send for Storage {}
// SAFETY: shared access only hands out `&[u8]`.
unsafe impl Sync for Storage {}

impl Storage {
    /// Allocates `len` zeroed bytes.
    ///
    /// A zero length allocates nothing.
    ///
    /// # Errors
    ///
    /// Returns `Error::MemoryAllocation` if the allocator fails.
    pub fn new(allocator: Arc<dyn Allocator>, len: usize) -> Result<Self> {
        let ptr = if len == 0 {
            NonNull::dangling()
        } else {
            allocator.alloc_zeroed(Self::layout(len)?)?
        };
        Ok(Storage {
            ptr,
            len,
            allocator,
        })
    }

    fn layout(len: usize) -> Result<Layout> {
        Layout::from_size_align(len, STORAGE_ALIGN)
            .map_err(|_| Error::MemoryAllocation { size: len })
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true for a zero-sized block.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The whole block.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: ptr is valid for len initialized bytes (or dangling with len 0).
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// The whole block, mutably.
    #[must_use]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as in `bytes`, and `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Reads a `T` at `offset` (no alignment requirement).
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` if `offset + size_of::<T>()` exceeds the block.
    pub fn read<T: Copy>(&self, offset: usize) -> Result<T> {
        self.check_range(offset, size_of::<T>())?;
        // SAFETY: range checked above; read_unaligned has no alignment
        // requirement, and `T: Copy` has no drop glue.
        Ok(unsafe { self.ptr.as_ptr().add(offset).cast::<T>().read_unaligned() })
    }

    /// Writes a `T` at `offset` (no alignment requirement).
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` if `offset + size_of::<T>()` exceeds the block.
    pub fn write<T: Copy>(&mut self, offset: usize, value: T) -> Result<()> {
        self.check_range(offset, size_of::<T>())?;
        // SAFETY: range checked above; exclusive via `&mut self`.
        unsafe {
            self.ptr
                .as_ptr()
                .add(offset)
                .cast::<T>()
                .write_unaligned(value);
        }
        Ok(())
    }

    /// Copies `src` into the block starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` if the source does not fit.
    pub fn copy_from(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        self.check_range(offset, src.len())?;
        self.bytes_mut()[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn check_range(&self, offset: usize, size: usize) -> Result<()> {
        match offset.checked_add(size) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(Error::OutOfRange {
                index: offset,
                len: self.len,
            }),
        }
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        if let Ok(layout) = Self::layout(self.len) {
            // SAFETY: ptr came from this allocator with this exact layout.
            unsafe { self.allocator.free(self.ptr, layout) };
        }
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxitype_mem::{SystemAllocator, TrackingAllocator};

    #[test]
    fn test_storage_is_zeroed() {
        let data = Storage::new(Arc::new(SystemAllocator), 32).unwrap();
        assert_eq!(data.len(), 32);
        assert!(data.bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_storage_typed_access() {
        let mut data = Storage::new(Arc::new(SystemAllocator), 24).unwrap();
        data.write::<u64>(16, 0xdead_beef).unwrap();
        data.write::<u8>(3, 9).unwrap();

        assert_eq!(data.read::<u64>(16).unwrap(), 0xdead_beef);
        assert_eq!(data.read::<u8>(3).unwrap(), 9);
    }

    #[test]
    fn test_storage_out_of_range() {
        let mut data = Storage::new(Arc::new(SystemAllocator), 8).unwrap();
        assert_eq!(
            data.read::<u32>(6).unwrap_err(),
            Error::OutOfRange { index: 6, len: 8 }
        );
        assert!(data.write::<u8>(8, 1).is_err());
        assert!(data.read::<u8>(usize::MAX).is_err());
        assert!(data.copy_from(4, &[1, 2, 3, 4, 5]).is_err());
    }

    #[test]
    fn test_storage_returns_memory() {
        let tracker = Arc::new(TrackingAllocator::new(SystemAllocator));
        {
            let _a = Storage::new(tracker.clone(), 64).unwrap();
            let _b = Storage::new(tracker.clone(), 0).unwrap();
            assert_eq!(tracker.stats().live_allocations, 1);
        }
        assert_eq!(tracker.stats().live_allocations, 0);
        assert_eq!(tracker.stats().live_bytes, 0);
    }
}
