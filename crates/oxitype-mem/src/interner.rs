//! Interning of type names.
//!
//! Registered type names are copied once into arena memory and handed out
//! as `&'static str`. Looking up the same spelling again returns the same
//! pointer, so metadata can compare names by address and never owns them.
//!
//! Interned storage is never reclaimed: the arena behind an interner is
//! leaked on purpose when the interner is created. Names of unregistered
//! types therefore stay valid, which keeps stale `&'static str`s sound.
//!
//! # Example
//!
//! ```
//! use oxitype_mem::NameInterner;
//!
//! let interner = NameInterner::new();
//! let a = interner.intern("Widget").unwrap();
//! let b = interner.intern(&String::from("Widget")).unwrap();
//! assert!(std::ptr::eq(a, b));
//! assert_eq!(interner.lookup("Gadget"), None);
//! ```

use crate::alloc::{AllocError, Allocator};
use crate::arena::ArenaAllocator;
use parking_lot::RwLock;
use std::alloc::Layout;
use std::sync::OnceLock;

#[cfg(feature = "fast-hash")]
use hashbrown::HashSet;

#[cfg(not(feature = "fast-hash"))]
use std::collections::HashSet;

/// Thread-safe, append-only set of interned strings.
pub struct NameInterner {
    arena: &'static dyn Allocator,
    names: RwLock<HashSet<&'static str>>,
}

impl NameInterner {
    /// Creates an interner backed by a fresh, leaked arena.
    #[must_use]
    pub fn new() -> Self {
        Self::with_allocator(Box::leak(Box::new(ArenaAllocator::new(8 * 1024))))
    }

    /// Creates an interner that copies names into blocks from `allocator`.
    ///
    /// Blocks are never freed.
    #[must_use]
    pub fn with_allocator(allocator: &'static dyn Allocator) -> Self {
        NameInterner {
            arena: allocator,
            names: RwLock::new(HashSet::new()),
        }
    }

    /// Returns the canonical copy of `name`, copying it in on first sight.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] if the backing allocator cannot hold the copy.
    /// Nothing is interned in that case.
    pub fn intern(&self, name: &str) -> Result<&'static str, AllocError> {
        if let Some(&existing) = self.names.read().get(name) {
            return Ok(existing);
        }

        let mut names = self.names.write();
        if let Some(&existing) = names.get(name) {
            return Ok(existing);
        }

        let stored = self.copy_in(name)?;
        names.insert(stored);
        Ok(stored)
    }

    /// Returns the canonical copy of `name` if it has been interned.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&'static str> {
        self.names.read().get(name).copied()
    }

    /// Number of distinct names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    /// Returns true if nothing has been interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }

    fn copy_in(&self, name: &str) -> Result<&'static str, AllocError> {
        if name.is_empty() {
            return Ok("");
        }
        let layout =
            Layout::from_size_align(name.len(), 1).map_err(|_| AllocError::InvalidLayout)?;
        let ptr = self.arena.alloc(layout)?;
        // SAFETY: `ptr` is valid for `name.len()` bytes, freshly allocated
        // from a leaked arena (so it lives forever), and the copied bytes are
        // valid UTF-8 because they come from a `&str`.
        unsafe {
            ptr.as_ptr()
                .copy_from_nonoverlapping(name.as_ptr(), name.len());
            let bytes = std::slice::from_raw_parts(ptr.as_ptr(), name.len());
            Ok(std::str::from_utf8_unchecked(bytes))
        }
    }
}

impl Default for NameInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NameInterner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameInterner")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Process-wide interner shared by every registry.
pub fn global_interner() -> &'static NameInterner {
    static INTERNER: OnceLock<NameInterner> = OnceLock::new();
    INTERNER.get_or_init(NameInterner::new)
}
