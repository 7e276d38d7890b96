//! `OxiType`: a runtime type registry and variant engine
//!
//! `OxiType` lets independent modules register types at run time, relate them
//! to each other, and handle their values uniformly. It provides:
//!
//! - **Type Registry** with derivation trees, flags and per-type metadata
//! - **Classes** built lazily, shared per type and reference counted
//! - **Interfaces** mapped into a class at byte offsets, plus dependency
//!   constraints checked at registration
//! - **Instances** with root-first initialization and leaf-first finalization
//! - **Variants** dispatched through per-type operation tables, with a
//!   converter table for cross-type conversion and comparison
//! - **Enumerations, flags and opaque types** registered from a table of
//!   named values or a shared Rust payload
//!
//! # Architecture
//!
//! - **Registry Layer**: an explicit, cloneable [`Registry`] handle; a
//!   process-wide default is available through [`Registry::global`]
//! - **Lifecycle Layer**: class and instance storage drawn from an injected
//!   [`Allocator`](oxitype_mem::Allocator)
//! - **Value Layer**: [`Variant`] over the closed [`Value`] sum, with boxed
//!   payloads for user types
//!
//! # Example
//!
//! ```rust
//! use oxitype::{Registry, TypeFlags, TypeId, TypeInfo, Variant};
//!
//! let registry = Registry::new();
//! let shape = registry
//!     .register(
//!         "Shape",
//!         TypeId::INSTANCE,
//!         TypeInfo::new().with_class_size(16).with_instance_size(16),
//!         TypeFlags::ABSTRACT,
//!     )
//!     .unwrap();
//! let circle = registry
//!     .register(
//!         "Circle",
//!         shape,
//!         TypeInfo::new().with_class_size(16).with_instance_size(24),
//!         TypeFlags::empty(),
//!     )
//!     .unwrap();
//!
//! assert!(registry.derives(circle, shape));
//! assert!(registry.instantiate(shape).is_err());
//! let c = registry.instantiate(circle).unwrap();
//! assert_eq!(c.type_id(), circle);
//!
//! let radius = Variant::from(2.5f64);
//! assert_eq!(radius.to_string(&registry).unwrap(), "2.500");
//! ```

pub mod config;
pub mod error;
pub mod runtime;

// Re-export commonly used types
pub use config::RegistryConfig;
pub use error::{Error, ErrorKind, Result};
pub use runtime::{
    Class, ClassInterface, EntryKind, EntryTable, EnumEntry, Instance, InterfaceMapEntry,
    InterfaceRef, OpsFlags, Registry, TypeFlags, TypeId, TypeInfo, Value, Variant, VariantOps,
    VariantState,
};
