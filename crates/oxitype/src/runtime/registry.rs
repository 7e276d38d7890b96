//! The type registry.
//!
//! A [`Registry`] owns the table mapping [`TypeId`]s to their metadata, the
//! per-type class slots, and the variant converter table.
//!
//! # Architecture
//!
//! - Metadata is written once at registration and immutable afterwards. It is
//!   held in an `Arc` so class and instance handles can keep it alive without
//!   touching the table.
//! - Type ids are table indices. An unregistered slot becomes `None` and its
//!   index is never handed out again.
//! - Names are interned in the process-wide
//!   [`NameInterner`](oxitype_mem::NameInterner); each registry keeps its own
//!   name map on top of that.
//! - Every registry registers the builtin types first, so builtin ids are the
//!   same constants everywhere (see [`TypeId`]).
//!
//! # Thread Safety
//!
//! The table sits behind a `parking_lot::RwLock`. Registration validates and
//! inserts under a single write lock, so readers see either the old table or
//! the fully validated new type and never a partial one. Queries take the read
//! lock once and walk metadata under it.
//!
//! A `CLASS_PREINIT` type only reserves its id and name under that lock. Its
//! class is built while the type is still invisible, and the type is published
//! once the build succeeded. A failed build releases the name and publishes
//! nothing.
//!
//! Class building and instance creation never hold the table lock while user
//! callbacks run.

use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use crate::runtime::class::{self, ClassSlot};
use crate::runtime::flags::TypeFlags;
use crate::runtime::types::{
    ClassFinalFn, ClassInitFn, InstanceFinalFn, InstanceInitFn, InterfaceMapEntry, TypeId,
    TypeInfo,
};
use crate::runtime::validate;
use crate::runtime::variant::{ConverterFn, EntryTable, VariantOps};
use fxhash::FxHashMap;
use oxitype_log::debug;
use oxitype_mem::{Allocator, global_interner};
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Immutable metadata of one registered type.
pub(crate) struct TypeMeta {
    pub(crate) id: TypeId,
    pub(crate) name: &'static str,
    pub(crate) parent: TypeId,
    /// Ancestors, root first, excluding the type itself.
    pub(crate) bases: SmallVec<[TypeId; 8]>,
    /// Root flags of the tree plus this type's own flags.
    pub(crate) flags: TypeFlags,
    pub(crate) class_size: usize,
    pub(crate) instance_size: usize,
    pub(crate) interfaces: SmallVec<[InterfaceMapEntry; 4]>,
    pub(crate) dependencies: SmallVec<[TypeId; 4]>,
    pub(crate) class_init: Option<ClassInitFn>,
    pub(crate) class_final: Option<ClassFinalFn>,
    /// Instance initializers of every level that has one, root first.
    pub(crate) instance_inits: SmallVec<[InstanceInitFn; 2]>,
    /// Instance finalizers of every level that has one, leaf first.
    pub(crate) instance_finals: SmallVec<[InstanceFinalFn; 2]>,
    /// Own variant ops, or the nearest ancestor's.
    pub(crate) variant_ops: Option<Arc<dyn VariantOps>>,
    pub(crate) class: ClassSlot,
    pub(crate) instances: AtomicUsize,
}

impl TypeMeta {
    pub(crate) fn depth(&self) -> usize {
        self.bases.len()
    }

    pub(crate) fn root(&self) -> TypeId {
        self.bases.first().copied().unwrap_or(self.id)
    }

    pub(crate) fn is(&self, flags: TypeFlags) -> bool {
        self.flags.contains(flags)
    }

    pub(crate) fn instance_count(&self) -> usize {
        self.instances.load(Ordering::Acquire)
    }
}

impl fmt::Debug for TypeMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMeta")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("flags", &self.flags)
            .field("class_size", &self.class_size)
            .field("instance_size", &self.instance_size)
            .field("interfaces", &self.interfaces)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// The id-indexed type table.
pub(crate) struct TypeTable {
    slots: Vec<Option<Arc<TypeMeta>>>,
    names: FxHashMap<&'static str, TypeId>,
    /// Names held by registrations whose class is still being built.
    reserved: FxHashMap<&'static str, TypeId>,
    live: usize,
}

impl TypeTable {
    fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity + 1);
        // Index 0 is TypeId::INVALID.
        slots.push(None);
        TypeTable {
            slots,
            names: FxHashMap::default(),
            reserved: FxHashMap::default(),
            live: 0,
        }
    }

    /// Metadata of a live type.
    #[inline]
    pub(crate) fn get(&self, id: TypeId) -> Option<&TypeMeta> {
        self.slots.get(id.index())?.as_deref()
    }

    #[inline]
    pub(crate) fn get_arc(&self, id: TypeId) -> Option<Arc<TypeMeta>> {
        self.slots.get(id.index())?.clone()
    }

    pub(crate) fn find(&self, name: &str) -> Option<TypeId> {
        self.names.get(name).copied()
    }

    fn is_taken(&self, name: &str) -> bool {
        self.names.contains_key(name) || self.reserved.contains_key(name)
    }

    /// Returns true if `meta` is the published metadata of its id.
    pub(crate) fn is_current(&self, meta: &TypeMeta) -> bool {
        self.get(meta.id).is_some_and(|live| std::ptr::eq(live, meta))
    }

    pub(crate) fn live(&self) -> usize {
        self.live
    }

    pub(crate) fn next_id(&self) -> TypeId {
        TypeId::from_index(self.slots.len())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &TypeMeta> {
        self.slots.iter().filter_map(|slot| slot.as_deref())
    }

    fn insert(&mut self, meta: Arc<TypeMeta>) {
        debug_assert_eq!(meta.id, self.next_id());
        self.names.insert(meta.name, meta.id);
        self.slots.push(Some(meta));
        self.live += 1;
    }

    /// Claims the next id and the name without making the type visible.
    fn reserve(&mut self, meta: &TypeMeta) {
        debug_assert_eq!(meta.id, self.next_id());
        self.reserved.insert(meta.name, meta.id);
        self.slots.push(None);
    }

    fn publish(&mut self, meta: Arc<TypeMeta>) {
        self.reserved.remove(meta.name);
        if let Some(slot) = self.slots.get_mut(meta.id.index()) {
            debug_assert!(slot.is_none(), "published over a live type");
            self.names.insert(meta.name, meta.id);
            *slot = Some(meta);
            self.live += 1;
        }
    }

    /// Gives a reserved name back. The reserved id is never reused.
    fn abandon(&mut self, meta: &TypeMeta) {
        self.reserved.remove(meta.name);
    }

    fn remove(&mut self, id: TypeId) -> Option<Arc<TypeMeta>> {
        let meta = self.slots.get_mut(id.index())?.take()?;
        self.names.remove(meta.name);
        self.live -= 1;
        Some(meta)
    }
}

pub(crate) struct RegistryInner {
    pub(crate) table: RwLock<TypeTable>,
    pub(crate) converters: RwLock<FxHashMap<(TypeId, TypeId), ConverterFn>>,
    /// Entry tables of enumeration and flags types.
    pub(crate) entry_tables: RwLock<FxHashMap<TypeId, Arc<EntryTable>>>,
    pub(crate) allocator: Arc<dyn Allocator>,
}

/// A runtime type registry.
///
/// Cheap to clone: clones share the same table.
///
/// # Example
///
/// ```rust
/// use oxitype::{Registry, TypeFlags, TypeId, TypeInfo};
///
/// let registry = Registry::new();
/// let shape = registry
///     .register(
///         "Shape",
///         TypeId::INVALID,
///         TypeInfo::new().with_class_size(16),
///         TypeFlags::DEEP_DERIVABLE,
///     )
///     .unwrap();
/// let circle = registry
///     .register("Circle", shape, TypeInfo::new().with_class_size(24), TypeFlags::empty())
///     .unwrap();
///
/// assert_eq!(registry.parent(circle), shape);
/// assert!(registry.derives(circle, shape));
/// assert_eq!(registry.find("Circle"), circle);
/// ```
#[derive(Clone)]
pub struct Registry {
    pub(crate) inner: Arc<RegistryInner>,
}

impl Registry {
    /// Creates a registry with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the builtin types cannot be registered, which only happens
    /// when the allocator refuses the builtin class blocks.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Creates a registry from an explicit configuration.
    ///
    /// # Panics
    ///
    /// Same as [`Registry::new`].
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        match Self::try_with_config(config) {
            Ok(registry) => registry,
            Err(e) => panic!("failed to register builtin types: {e}"),
        }
    }

    /// Fallible form of [`Registry::with_config`].
    ///
    /// # Errors
    ///
    /// Propagates allocation failures from building the pinned builtin
    /// classes.
    pub fn try_with_config(config: RegistryConfig) -> Result<Self> {
        if let Some(level) = config.log_level {
            oxitype_log::set_level(level);
        }

        let registry = Registry {
            inner: Arc::new(RegistryInner {
                table: RwLock::new(TypeTable::with_capacity(
                    config.initial_capacity.max(TypeId::BUILTIN_COUNT),
                )),
                converters: RwLock::new(FxHashMap::default()),
                entry_tables: RwLock::new(FxHashMap::default()),
                allocator: config.allocator,
            }),
        };
        crate::runtime::builtins::register_builtins(&registry)?;
        Ok(registry)
    }

    /// The process-wide default registry, built on first use from
    /// [`RegistryConfig::from_env`].
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(|| Registry::with_config(RegistryConfig::from_env()))
    }

    /// The allocator every class and instance block comes from.
    #[must_use]
    pub fn allocator(&self) -> &Arc<dyn Allocator> {
        &self.inner.allocator
    }

    /// Returns true if both handles share the same table.
    #[must_use]
    pub fn ptr_eq(&self, other: &Registry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Registers a new type.
    ///
    /// Validation and insertion happen atomically: on any error nothing is
    /// registered and the name stays free.
    ///
    /// # Arguments
    ///
    /// * `name` - Unique type name
    /// * `parent` - Parent type, or `TypeId::INVALID` for a root type
    /// * `info` - Sizes, interface map, dependencies and callbacks
    /// * `flags` - Root flags (root types only) and per-type flags
    ///
    /// # Errors
    ///
    /// - `DuplicateName` if the name is taken
    /// - `InvalidParent` if `parent` is not a registered type
    /// - `InvalidType` for any violated derivation, size, interface or
    ///   dependency rule
    /// - `MemoryAllocation` if a `CLASS_PREINIT` class cannot be built
    pub fn register(
        &self,
        name: &str,
        parent: TypeId,
        info: TypeInfo,
        flags: TypeFlags,
    ) -> Result<TypeId> {
        if flags.contains(TypeFlags::BUILTIN) {
            return Err(Error::invalid_type(format!(
                "'{name}': the BUILTIN flag is reserved"
            )));
        }
        self.register_with(name, parent, info, flags)
    }

    pub(crate) fn register_with(
        &self,
        name: &str,
        parent: TypeId,
        info: TypeInfo,
        flags: TypeFlags,
    ) -> Result<TypeId> {
        if name.is_empty() {
            return Err(Error::invalid_type("type name must not be empty"));
        }

        let meta = {
            let mut table = self.inner.table.write();
            if table.is_taken(name) {
                return Err(Error::DuplicateName { name: name.into() });
            }
            let flags = validate::validate(&table, name, parent, &info, flags)?;
            let meta = Arc::new(build_meta(&table, name, parent, info, flags)?);
            if meta.is(TypeFlags::CLASS_PREINIT) {
                table.reserve(&meta);
            } else {
                table.insert(Arc::clone(&meta));
            }
            meta
        };

        if meta.is(TypeFlags::CLASS_PREINIT) {
            let class = match self.class_ref_unpublished(Arc::clone(&meta)) {
                Ok(class) => class,
                Err(e) => {
                    self.inner.table.write().abandon(&meta);
                    return Err(e);
                }
            };
            self.inner.table.write().publish(Arc::clone(&meta));
            drop(class);
        }

        debug!(
            "registered type '{}' as {} (parent {}, flags {:?})",
            meta.name, meta.id, meta.parent, meta.flags
        );
        Ok(meta.id)
    }

    /// Removes a type.
    ///
    /// Converters to or from the type, and an enumeration's entry table, are
    /// dropped with it. A pinned class whose only reference is its pin is torn
    /// down.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the id is not registered
    /// - `Unsupported` for builtin types
    /// - `InUse` while the class is referenced or being built or torn down,
    ///   instances are alive, or another registered type derives from, maps,
    ///   or depends on this one
    pub fn unregister(&self, id: TypeId) -> Result<()> {
        let (meta, record) = {
            let mut table = self.inner.table.write();
            let meta = table
                .get_arc(id)
                .ok_or_else(|| Error::not_found(format!("type {id}")))?;
            let in_use = || Error::InUse {
                name: meta.name.into(),
            };

            if meta.is(TypeFlags::BUILTIN) {
                return Err(Error::unsupported("unregister", meta.name));
            }
            // Never blocks: a builder holding the slot lock may be waiting on
            // this table lock.
            let Some(slot_guard) = meta.class.try_lock() else {
                return Err(in_use());
            };
            if meta.instance_count() > 0 {
                return Err(in_use());
            }

            let referenced = table.iter().any(|other| {
                other.id != id
                    && (other.parent == id
                        || other.interfaces.iter().any(|e| e.interface == id)
                        || other.dependencies.contains(&id))
            });
            if referenced {
                return Err(in_use());
            }

            let record = meta.class.retire().map_err(|_| in_use())?;
            drop(slot_guard);
            table.remove(id);
            (meta, record)
        };

        self.inner
            .converters
            .write()
            .retain(|&(from, to), _| from != id && to != id);
        self.inner.entry_tables.write().remove(&id);

        if let Some(record) = record {
            class::teardown(&meta, record);
        }
        debug!("unregistered type '{}' ({})", meta.name, id);
        Ok(())
    }

    /// Metadata handle of a live type.
    pub(crate) fn meta(&self, id: TypeId) -> Option<Arc<TypeMeta>> {
        self.inner.table.read().get_arc(id)
    }

    pub(crate) fn meta_or_not_found(&self, id: TypeId) -> Result<Arc<TypeMeta>> {
        self.meta(id)
            .ok_or_else(|| Error::not_found(format!("type {id}")))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.inner.table.read();
        f.debug_struct("Registry")
            .field("types", &table.live())
            .field("converters", &self.inner.converters.read().len())
            .finish()
    }
}

fn build_meta(
    table: &TypeTable,
    name: &str,
    parent: TypeId,
    info: TypeInfo,
    flags: TypeFlags,
) -> Result<TypeMeta> {
    let parent_meta = table.get(parent);

    let mut bases = SmallVec::new();
    let mut instance_inits = SmallVec::new();
    let mut instance_finals = SmallVec::new();
    let mut variant_ops = None;

    if let Some(p) = parent_meta {
        bases.extend(p.bases.iter().copied());
        bases.push(p.id);
        instance_inits.extend(p.instance_inits.iter().cloned());
        variant_ops.clone_from(&p.variant_ops);
    }
    if let Some(init) = info.instance_init {
        instance_inits.push(init);
    }
    if let Some(fin) = info.instance_final {
        instance_finals.push(fin);
    }
    if let Some(p) = parent_meta {
        instance_finals.extend(p.instance_finals.iter().cloned());
    }
    if info.variant_ops.is_some() {
        variant_ops = info.variant_ops;
    }

    Ok(TypeMeta {
        id: table.next_id(),
        name: global_interner().intern(name)?,
        parent: if parent_meta.is_some() {
            parent
        } else {
            TypeId::INVALID
        },
        bases,
        flags,
        class_size: info.class_size,
        instance_size: info.instance_size,
        interfaces: info.interfaces.into_iter().collect(),
        dependencies: info.dependencies.into_iter().collect(),
        class_init: info.class_init,
        class_final: info.class_final,
        instance_inits,
        instance_finals,
        variant_ops,
        class: ClassSlot::new(),
        instances: AtomicUsize::new(0),
    })
}
