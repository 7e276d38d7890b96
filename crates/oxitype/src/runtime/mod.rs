//! `OxiType` runtime module.
//!
//! # Architecture
//!
//! - [`registry`]: the type table, registration and unregistration
//! - `validate`: the rules a registration must pass
//! - `query`: derivation, interface and dependency queries
//! - [`class`]: lazily built, reference-counted per-type classes
//! - [`instance`]: reference-counted instances of instantiable types
//! - [`interface`]: casting a class to one of its interfaces
//! - [`variant`]: the typed value engine and its converters
//! - `builtins`: the types every registry starts with
//!
//! # Example
//!
//! ```rust
//! use oxitype::runtime::{Registry, TypeFlags, TypeId, TypeInfo};
//!
//! let registry = Registry::new();
//! let widget = registry
//!     .register(
//!         "Widget",
//!         TypeId::INSTANCE,
//!         TypeInfo::new().with_class_size(16).with_instance_size(32),
//!         TypeFlags::empty(),
//!     )
//!     .unwrap();
//!
//! let w = registry.instantiate(widget).unwrap();
//! assert_eq!(w.class().name(), "Widget");
//! ```

mod builtins;
pub mod class;
pub mod flags;
pub mod instance;
pub mod interface;
mod query;
pub mod registry;
pub mod storage;
pub mod types;
mod validate;
pub mod variant;

pub use class::Class;
pub use flags::TypeFlags;
pub use instance::Instance;
pub use interface::InterfaceRef;
pub use query::ClassInterface;
pub use registry::Registry;
pub use storage::{ClassData, InstanceData, STORAGE_ALIGN, Storage};
pub use types::{
    ClassFinalFn, ClassInitFn, InstanceFinalFn, InstanceInitFn, InterfaceMapEntry, TypeId,
    TypeInfo,
};
pub use variant::{
    BoxedValue, ConverterFn, EntryKind, EntryTable, EnumEntry, OpsFlags, Value, Variant,
    VariantOps, VariantState,
};
