//! Memory services for the `OxiType` runtime.
//!
//! The type registry never reaches for the global allocator to store class
//! or instance bytes. It is handed an [`Allocator`] instead, which makes it
//! possible to back a registry with an arena, a tracking wrapper in tests, or
//! anything else that can hand out aligned bytes.
//!
//! - [`Allocator`]: the allocation capability (`alloc`, `realloc`, `free`)
//! - [`SystemAllocator`]: forwards to `std::alloc`
//! - [`TrackingAllocator`]: counts live allocations of an inner allocator
//! - [`ArenaAllocator`]: thread-safe chunked bump allocator (feature `arena`)
//! - [`NameInterner`]: arena-backed interning of type names (feature `interner`)

pub mod alloc;

#[cfg(feature = "arena")]
pub mod arena;

#[cfg(feature = "interner")]
pub mod interner;

pub use alloc::{AllocError, Allocator, SystemAllocator, TrackingAllocator, TrackingStats};

#[cfg(feature = "arena")]
pub use arena::{ArenaAllocator, ArenaStats};

#[cfg(feature = "interner")]
pub use interner::{NameInterner, global_interner};
