//! Reference-counted, lazily built classes.
//!
//! Every classed type has at most one live class: a block of `class_size`
//! bytes shared by all instances of the type. It is built on the first
//! [`Registry::class_ref`] and torn down when the last [`Class`] handle is
//! dropped.
//!
//! # Architecture
//!
//! Building a class for `T`:
//!
//! 1. allocate `class_size(T)` zeroed bytes from the registry's allocator
//! 2. reference the parent's class (building it first if needed) and copy its
//!    bytes as the prefix
//! 3. reference each mapped interface's default class and copy its bytes at
//!    the mapped offset
//! 4. run `T`'s own class initializer
//!
//! The references taken in steps 2 and 3 are kept on the class as its teardown
//! list. Teardown runs `T`'s class finalizer, then drops the interface
//! references in reverse order, then the parent reference. A parent therefore
//! always outlives its children and is finalized after them.
//!
//! # Thread Safety
//!
//! The count is an atomic. Acquiring an already-built class and releasing a
//! non-last reference are lock-free CAS loops. The 0 → 1 build and the
//! 1 → 0 teardown run under a per-type mutex, so concurrent callers see exactly
//! one build and one teardown per balanced cycle. Locks are always taken child
//! before parent and type before interface.
//!
//! A build checks under the per-type mutex that its type is still registered,
//! and [`Registry::unregister`] only try-locks that mutex. A type therefore
//! cannot be unregistered while its class is being built, and a class is never
//! built for a type that is already gone.
//!
//! Class bytes sit behind a reader-writer lock and may be read or patched
//! after construction.

use crate::error::{Error, Result};
use crate::runtime::flags::TypeFlags;
use crate::runtime::query::{ClassInterface, InterfaceTable};
use crate::runtime::registry::{Registry, TypeMeta};
use crate::runtime::storage::{ClassData, Storage};
use crate::runtime::types::TypeId;
use oxitype_log::{trace, warn};
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use smallvec::SmallVec;
use std::fmt;
use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Per-type class state stored in the type's metadata.
pub(crate) struct ClassSlot {
    refs: AtomicU32,
    /// Set while a pinned class holds its permanent reference.
    pinned: AtomicBool,
    lock: Mutex<()>,
    record: RwLock<Option<Arc<ClassRecord>>>,
}

impl ClassSlot {
    pub(crate) fn new() -> Self {
        ClassSlot {
            refs: AtomicU32::new(0),
            pinned: AtomicBool::new(false),
            lock: Mutex::new(()),
            record: RwLock::new(None),
        }
    }

    pub(crate) fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    /// Takes a reference on an already-built class.
    fn acquire_existing(&self) -> Option<Arc<ClassRecord>> {
        let mut current = self.refs.load(Ordering::Acquire);
        while current > 0 {
            match self.refs.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    let record = self.record.read().clone();
                    debug_assert!(record.is_some(), "live class count without a record");
                    return record;
                }
                Err(actual) => current = actual,
            }
        }
        None
    }

    fn retain(&self) {
        let previous = self.refs.fetch_add(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "retained a class that is not built");
    }

    /// Drops one reference and tears the class down on the last one.
    ///
    /// # Panics
    ///
    /// Panics on underflow.
    pub(crate) fn release(&self, meta: &TypeMeta) {
        let mut current = self.refs.load(Ordering::Acquire);
        loop {
            assert!(
                current > 0,
                "class of '{}' released more times than it was referenced",
                meta.name
            );
            if current > 1 {
                match self.refs.compare_exchange_weak(
                    current,
                    current - 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return,
                    Err(actual) => {
                        current = actual;
                        continue;
                    }
                }
            }

            let _guard = self.lock.lock();
            match self
                .refs
                .compare_exchange(1, 0, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    let record = self.record.write().take();
                    if let Some(record) = record {
                        teardown(meta, record);
                    }
                    return;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// The build/teardown lock, if no build or teardown is running.
    pub(crate) fn try_lock(&self) -> Option<MutexGuard<'_, ()>> {
        self.lock.try_lock()
    }

    /// Drops the pin of a class no handle references and hands back its
    /// record for teardown.
    ///
    /// Call with the slot lock held. Returns the live count if handles still
    /// reference the class.
    pub(crate) fn retire(&self) -> std::result::Result<Option<Arc<ClassRecord>>, u32> {
        let pin = u32::from(self.pinned.load(Ordering::Acquire));
        self.refs
            .compare_exchange(pin, 0, Ordering::AcqRel, Ordering::Acquire)?;
        self.pinned.store(false, Ordering::Release);
        Ok(self.record.write().take())
    }
}

pub(crate) fn teardown(meta: &TypeMeta, record: Arc<ClassRecord>) {
    trace!("tearing down class '{}'", meta.name);

    if let Some(finalize) = &meta.class_final {
        let mut data = record.data.write();
        if let Err(e) = finalize(meta.id, &mut *data) {
            warn!("class finalizer of '{}' failed: {}", meta.name, e);
        }
    }

    let mut held = std::mem::take(&mut *record.held.lock());
    while let Some(class) = held.pop() {
        drop(class);
    }
}

/// A built class.
pub(crate) struct ClassRecord {
    data: RwLock<ClassData>,
    interfaces: InterfaceTable,
    /// Parent and interface classes referenced while building, in order.
    held: Mutex<Vec<Class>>,
}

/// A counted reference to a type's class.
///
/// Cloning takes another reference; dropping releases one. The class is
/// finalized when the last reference goes away, unless the type pins it.
///
/// # Example
///
/// ```rust
/// use oxitype::{Registry, TypeFlags, TypeId, TypeInfo};
///
/// let registry = Registry::new();
/// let ty = registry
///     .register(
///         "Counter",
///         TypeId::INVALID,
///         TypeInfo::new()
///             .with_class_size(8)
///             .on_class_init(|_, data| data.write::<u64>(0, 42)),
///         TypeFlags::empty(),
///     )
///     .unwrap();
///
/// let class = registry.class_ref(ty).unwrap();
/// assert_eq!(class.data().read::<u64>(0).unwrap(), 42);
/// assert_eq!(registry.class_ref_count(ty), 1);
///
/// drop(class);
/// assert_eq!(registry.class_ref_count(ty), 0);
/// ```
pub struct Class {
    meta: Arc<TypeMeta>,
    record: ManuallyDrop<Arc<ClassRecord>>,
}

impl Class {
    /// The type this class belongs to.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.meta.id
    }

    /// The type's name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.meta.name
    }

    /// Current reference count of this type's class.
    #[must_use]
    pub fn ref_count(&self) -> u32 {
        self.meta.class.ref_count()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.meta.class_size
    }

    /// Shared access to the class bytes.
    pub fn data(&self) -> RwLockReadGuard<'_, ClassData> {
        self.record.data.read()
    }

    /// Exclusive access to the class bytes.
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, ClassData> {
        self.record.data.write()
    }

    /// Every interface reachable from this class, with its location.
    #[must_use]
    pub fn interfaces(&self) -> &[ClassInterface] {
        &self.record.interfaces
    }

    /// Location of `iface` inside this class.
    #[must_use]
    pub fn find_interface(&self, iface: TypeId) -> Option<ClassInterface> {
        self.record
            .interfaces
            .iter()
            .find(|entry| entry.interface == iface)
            .copied()
    }

    /// The parent type's class, if the parent is classed.
    #[must_use]
    pub fn parent(&self) -> Option<Class> {
        let held = self.record.held.lock();
        held.first()
            .filter(|class| class.type_id() == self.meta.parent)
            .cloned()
    }

    pub(crate) fn meta(&self) -> &Arc<TypeMeta> {
        &self.meta
    }

    /// Returns true if both handles reference the same built class.
    #[must_use]
    pub fn ptr_eq(&self, other: &Class) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
    }
}

impl Clone for Class {
    fn clone(&self) -> Self {
        self.meta.class.retain();
        Class {
            meta: Arc::clone(&self.meta),
            record: ManuallyDrop::new(Arc::clone(&self.record)),
        }
    }
}

impl Drop for Class {
    fn drop(&mut self) {
        // SAFETY: `record` is never touched again after this point.
        unsafe { ManuallyDrop::drop(&mut self.record) };
        self.meta.class.release(&self.meta);
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Class {}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("type", &self.meta.id)
            .field("name", &self.meta.name)
            .field("size", &self.meta.class_size)
            .field("refs", &self.ref_count())
            .finish()
    }
}

impl Registry {
    /// Takes a reference on `ty`'s class, building it on first use.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `ty` is not registered
    /// - `InvalidType` if `ty` is not classed
    /// - `MemoryAllocation` if the class block cannot be allocated
    /// - any error returned by a class initializer along the way
    pub fn class_ref(&self, ty: TypeId) -> Result<Class> {
        let meta = self.meta_or_not_found(ty)?;
        if !meta.is(TypeFlags::CLASSED) {
            return Err(Error::invalid_type(format!("'{}' is not classed", meta.name)));
        }
        self.class_ref_meta(meta)
    }

    /// Returns the class of `ty` only if it is already built.
    ///
    /// The returned handle still counts as a reference.
    #[must_use]
    pub fn class_peek(&self, ty: TypeId) -> Option<Class> {
        let meta = self.meta(ty)?;
        let record = meta.class.acquire_existing()?;
        Some(Class {
            meta,
            record: ManuallyDrop::new(record),
        })
    }

    /// Releases a class reference; same as dropping the handle.
    pub fn class_unref(&self, class: Class) {
        drop(class);
    }

    pub(crate) fn class_ref_meta(&self, meta: Arc<TypeMeta>) -> Result<Class> {
        self.acquire_class(meta, true)
    }

    /// Builds the class of a type that is reserved but not yet published.
    pub(crate) fn class_ref_unpublished(&self, meta: Arc<TypeMeta>) -> Result<Class> {
        self.acquire_class(meta, false)
    }

    fn acquire_class(&self, meta: Arc<TypeMeta>, published: bool) -> Result<Class> {
        if let Some(record) = meta.class.acquire_existing() {
            return Ok(Class {
                meta,
                record: ManuallyDrop::new(record),
            });
        }

        let slot = &meta.class;
        let _guard = slot.lock.lock();
        if let Some(record) = slot.acquire_existing() {
            return Ok(Class {
                meta: Arc::clone(&meta),
                record: ManuallyDrop::new(record),
            });
        }
        if published && !self.inner.table.read().is_current(&meta) {
            return Err(Error::not_found(format!("type '{}'", meta.name)));
        }

        let record = self.build_class(&meta)?;
        *slot.record.write() = Some(Arc::clone(&record));
        let pinned = meta.is(TypeFlags::CLASS_PINNED);
        slot.pinned.store(pinned, Ordering::Release);
        slot.refs
            .store(if pinned { 2 } else { 1 }, Ordering::Release);

        Ok(Class {
            meta: Arc::clone(&meta),
            record: ManuallyDrop::new(record),
        })
    }

    fn build_class(&self, meta: &TypeMeta) -> Result<Arc<ClassRecord>> {
        trace!("building class '{}' ({} bytes)", meta.name, meta.class_size);

        let (parent, mapped, interfaces) = {
            let table = self.inner.table.read();
            let parent = table
                .get_arc(meta.parent)
                .filter(|p| p.is(TypeFlags::CLASSED));
            let mapped = meta
                .interfaces
                .iter()
                .map(|entry| {
                    table
                        .get_arc(entry.interface)
                        .map(|iface| (entry.offset, iface))
                        .ok_or_else(|| Error::not_found(format!("interface {}", entry.interface)))
                })
                .collect::<Result<SmallVec<[_; 4]>>>()?;
            (parent, mapped, table.interface_table(meta))
        };

        let mut data = Storage::new(Arc::clone(&self.inner.allocator), meta.class_size)?;
        let mut held = Vec::with_capacity(1 + mapped.len());

        if let Some(parent) = parent {
            let class = self.class_ref_meta(parent)?;
            data.copy_from(0, class.data().bytes())?;
            held.push(class);
        }

        for (offset, iface) in mapped {
            let class = self.class_ref_meta(iface)?;
            data.copy_from(offset, class.data().bytes())?;
            held.push(class);
        }

        if let Some(init) = &meta.class_init {
            init(meta.id, &mut data)?;
        }

        Ok(Arc::new(ClassRecord {
            data: RwLock::new(data),
            interfaces,
            held: Mutex::new(held),
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::runtime::{Registry, TypeFlags, TypeId, TypeInfo};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_class_ref_builds_once() {
        let registry = Registry::new();
        let builds = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&builds);
        let ty = registry
            .register(
                "Once",
                TypeId::INVALID,
                TypeInfo::new().with_class_size(8).on_class_init(move |_, _| {
                    *counter.lock().unwrap() += 1;
                    Ok(())
                }),
                TypeFlags::empty(),
            )
            .unwrap();

        let a = registry.class_ref(ty).unwrap();
        let b = registry.class_ref(ty).unwrap();
        let c = a.clone();
        assert!(a.ptr_eq(&b));
        assert_eq!(registry.class_ref_count(ty), 3);
        assert_eq!(*builds.lock().unwrap(), 1);

        drop((a, b, c));
        assert_eq!(registry.class_ref_count(ty), 0);
        assert!(registry.class_peek(ty).is_none());
    }

    #[test]
    fn test_parent_prefix_is_copied() {
        let registry = Registry::new();
        let base = registry
            .register(
                "PrefixBase",
                TypeId::INVALID,
                TypeInfo::new()
                    .with_class_size(8)
                    .on_class_init(|_, data| data.write::<u32>(0, 0xabcd)),
                TypeFlags::DERIVABLE,
            )
            .unwrap();
        let derived = registry
            .register(
                "PrefixDerived",
                base,
                TypeInfo::new()
                    .with_class_size(16)
                    .on_class_init(|_, data| data.write::<u32>(8, 7)),
                TypeFlags::empty(),
            )
            .unwrap();

        let class = registry.class_ref(derived).unwrap();
        assert_eq!(class.data().read::<u32>(0).unwrap(), 0xabcd);
        assert_eq!(class.data().read::<u32>(8).unwrap(), 7);
        assert_eq!(registry.class_ref_count(base), 1);
        assert_eq!(class.parent().unwrap().type_id(), base);

        drop(class);
        assert_eq!(registry.class_ref_count(base), 0);
    }

    #[test]
    fn test_class_ref_non_classed() {
        let registry = Registry::new();
        assert_eq!(
            registry.class_ref(TypeId::PROTOCOL).unwrap_err().kind(),
            ErrorKind::InvalidType
        );
        assert_eq!(
            registry.class_ref(TypeId::INVALID).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_failed_init_releases_parent() {
        let registry = Registry::new();
        let base = registry
            .register(
                "FailBase",
                TypeId::INVALID,
                TypeInfo::new().with_class_size(8),
                TypeFlags::DERIVABLE,
            )
            .unwrap();
        let derived = registry
            .register(
                "FailDerived",
                base,
                TypeInfo::new()
                    .with_class_size(8)
                    .on_class_init(|_, data| data.write::<u64>(4, 1)),
                TypeFlags::empty(),
            )
            .unwrap();

        assert_eq!(
            registry.class_ref(derived).unwrap_err().kind(),
            ErrorKind::OutOfRange
        );
        assert_eq!(registry.class_ref_count(base), 0);
        assert_eq!(registry.class_ref_count(derived), 0);
    }

    #[test]
    fn test_stale_metadata_cannot_build() {
        let registry = Registry::new();
        let ty = registry
            .register("Stale", TypeId::INVALID, TypeInfo::new().with_class_size(8), TypeFlags::empty())
            .unwrap();
        let meta = registry.meta(ty).unwrap();
        registry.unregister(ty).unwrap();

        assert_eq!(
            registry.class_ref_meta(meta).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_builtin_classes_pinned() {
        let registry = Registry::new();
        // Preinit builtins are built at registration and stay built.
        assert!(registry.class_ref_count(TypeId::INSTANCE) >= 1);
        let class = registry.class_ref(TypeId::UINT8).unwrap();
        assert_eq!(class.find_interface(TypeId::IVARIANT).map(|i| i.offset), Some(0));
        drop(class);
        assert_eq!(registry.class_ref_count(TypeId::UINT8), 1);
        assert!(registry.class_peek(TypeId::UINT8).is_some());
    }
}
