//! Type identifiers and registration info.

use crate::error::Result;
use crate::runtime::storage::{ClassData, InstanceData};
use crate::runtime::variant::VariantOps;
use std::fmt;
use std::sync::Arc;

/// Opaque handle naming one registered type.
///
/// Identifiers are indices into the registry's type table. They are never
/// reused within one registry, and [`TypeId::INVALID`] never resolves.
///
/// The builtin types occupy fixed identifiers in every registry.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TypeId(usize);

impl TypeId {
    /// The identifier that never resolves to a type.
    pub const INVALID: TypeId = TypeId(0);

    /// Root of dependency-only types.
    pub const PROTOCOL: TypeId = TypeId(1);
    /// Root of classed, non-instantiable types.
    pub const STATIC_CLASS: TypeId = TypeId(2);
    /// Root of interface types.
    pub const INTERFACE: TypeId = TypeId(3);
    /// Root of instantiable types.
    pub const INSTANCE: TypeId = TypeId(4);
    /// The variant-compatibility interface.
    pub const IVARIANT: TypeId = TypeId(5);

    pub const NIL: TypeId = TypeId(6);
    pub const BOOL: TypeId = TypeId(7);
    pub const CHAR: TypeId = TypeId(8);
    pub const UINT8: TypeId = TypeId(9);
    pub const INT16: TypeId = TypeId(10);
    pub const UINT16: TypeId = TypeId(11);
    pub const INT32: TypeId = TypeId(12);
    pub const UINT32: TypeId = TypeId(13);
    pub const INT64: TypeId = TypeId(14);
    pub const UINT64: TypeId = TypeId(15);
    pub const FLOAT: TypeId = TypeId(16);
    pub const DOUBLE: TypeId = TypeId(17);
    pub const STRING: TypeId = TypeId(18);
    pub const POINTER: TypeId = TypeId(19);
    /// Abstract base of named-value enumerations.
    pub const ENUM: TypeId = TypeId(20);
    /// Abstract base of named bit sets.
    pub const FLAGS: TypeId = TypeId(21);
    /// Abstract base of shared, reference-counted user payloads.
    pub const OPAQUE: TypeId = TypeId(22);

    /// Number of builtin types; the first user type gets this value as id.
    pub const BUILTIN_COUNT: usize = 22;

    pub(crate) const fn from_index(index: usize) -> TypeId {
        TypeId(index)
    }

    /// Table index of this identifier.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }

    /// Returns true unless this is [`TypeId::INVALID`].
    ///
    /// A valid-looking id may still be unregistered; use
    /// [`Registry::verify`](crate::Registry::verify) for that.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Returns true if this is one of the fixed builtin identifiers.
    #[must_use]
    pub const fn is_builtin(self) -> bool {
        self.0 != 0 && self.0 <= Self::BUILTIN_COUNT
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One `(interface, class offset)` pair of a type's interface map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceMapEntry {
    /// The mapped interface type.
    pub interface: TypeId,
    /// Byte offset of the interface's class inside the mapping type's class.
    pub offset: usize,
}

impl InterfaceMapEntry {
    #[must_use]
    pub const fn new(interface: TypeId, offset: usize) -> Self {
        InterfaceMapEntry { interface, offset }
    }
}

/// Runs when a class is built; receives the type and its fresh class bytes.
pub type ClassInitFn = Arc<dyn Fn(TypeId, &mut ClassData) -> Result<()> + Send + Sync>;

/// Runs when a class is torn down.
pub type ClassFinalFn = Arc<dyn Fn(TypeId, &mut ClassData) -> Result<()> + Send + Sync>;

/// Runs for each ancestor level (root first) when an instance is created.
///
/// Receives the instance's concrete type.
pub type InstanceInitFn = Arc<dyn Fn(TypeId, &mut InstanceData) -> Result<()> + Send + Sync>;

/// Runs for each ancestor level (leaf first) when an instance is destroyed.
pub type InstanceFinalFn = Arc<dyn Fn(TypeId, &mut InstanceData) -> Result<()> + Send + Sync>;

/// Everything a type declares at registration besides name, parent and flags.
///
/// # Example
///
/// ```rust
/// use oxitype::runtime::{TypeId, TypeInfo};
///
/// let info = TypeInfo::new()
///     .with_class_size(32)
///     .with_interface(TypeId::IVARIANT, 16)
///     .on_class_init(|_, data| data.write::<u32>(0, 1));
/// assert_eq!(info.class_size, 32);
/// assert_eq!(info.interfaces.len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct TypeInfo {
    /// Class size in bytes; at least the parent's.
    pub class_size: usize,
    /// Instance size in bytes; at least the parent's.
    pub instance_size: usize,
    /// Interfaces mapped into this type's class, ordered by offset.
    pub interfaces: Vec<InterfaceMapEntry>,
    /// Types anything combined with this type must also satisfy.
    pub dependencies: Vec<TypeId>,
    pub class_init: Option<ClassInitFn>,
    pub class_final: Option<ClassFinalFn>,
    pub instance_init: Option<InstanceInitFn>,
    pub instance_final: Option<InstanceFinalFn>,
    /// Variant operation table; inherited by derived types.
    pub variant_ops: Option<Arc<dyn VariantOps>>,
}

impl TypeInfo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_class_size(mut self, size: usize) -> Self {
        self.class_size = size;
        self
    }

    #[must_use]
    pub fn with_instance_size(mut self, size: usize) -> Self {
        self.instance_size = size;
        self
    }

    /// Appends an interface map entry.
    #[must_use]
    pub fn with_interface(mut self, interface: TypeId, offset: usize) -> Self {
        self.interfaces
            .push(InterfaceMapEntry::new(interface, offset));
        self
    }

    /// Appends a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dependency: TypeId) -> Self {
        self.dependencies.push(dependency);
        self
    }

    #[must_use]
    pub fn with_variant_ops(mut self, ops: Arc<dyn VariantOps>) -> Self {
        self.variant_ops = Some(ops);
        self
    }

    #[must_use]
    pub fn on_class_init<F>(mut self, f: F) -> Self
    where
        F: Fn(TypeId, &mut ClassData) -> Result<()> + Send + Sync + 'static,
    {
        self.class_init = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_class_final<F>(mut self, f: F) -> Self
    where
        F: Fn(TypeId, &mut ClassData) -> Result<()> + Send + Sync + 'static,
    {
        self.class_final = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_instance_init<F>(mut self, f: F) -> Self
    where
        F: Fn(TypeId, &mut InstanceData) -> Result<()> + Send + Sync + 'static,
    {
        self.instance_init = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_instance_final<F>(mut self, f: F) -> Self
    where
        F: Fn(TypeId, &mut InstanceData) -> Result<()> + Send + Sync + 'static,
    {
        self.instance_final = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("class_size", &self.class_size)
            .field("instance_size", &self.instance_size)
            .field("interfaces", &self.interfaces)
            .field("dependencies", &self.dependencies)
            .field("class_init", &self.class_init.is_some())
            .field("class_final", &self.class_final.is_some())
            .field("instance_init", &self.instance_init.is_some())
            .field("instance_final", &self.instance_final.is_some())
            .field("variant_ops", &self.variant_ops.is_some())
            .finish()
    }
}
