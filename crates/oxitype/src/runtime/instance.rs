//! Instance allocation and lifecycle.
//!
//! # Architecture
//!
//! An instance is a small heap header (type tag, atomic reference count, class
//! reference) plus `instance_size` zeroed bytes from the registry's allocator.
//!
//! - [`Registry::instantiate`] takes a class reference first, allocates the
//!   bytes, then runs every instance initializer along the type's chain, root
//!   first.
//! - When the last handle goes away the finalizers run leaf first, the bytes
//!   are freed, and the class reference is released last.
//!
//! # Thread Safety
//!
//! Handles are `Send + Sync`. The reference count is atomic (`AcqRel`), and the
//! instance bytes are behind a reader-writer lock, so a shared instance can be
//! read from several threads and patched by one at a time.

use crate::error::{Error, Result};
use crate::runtime::class::Class;
use crate::runtime::flags::TypeFlags;
use crate::runtime::registry::Registry;
use crate::runtime::storage::{InstanceData, Storage};
use crate::runtime::types::TypeId;
use oxitype_log::{trace, warn};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Heap header of a live instance.
struct RawInstance {
    type_id: TypeId,
    refcount: AtomicU32,
    class: Class,
    data: RwLock<InstanceData>,
}

/// A reference-counted instance of an instantiable type.
///
/// Cloning shares the instance; dropping the last handle destroys it.
///
/// # Example
///
/// ```rust
/// use oxitype::{Registry, TypeFlags, TypeId, TypeInfo};
///
/// let registry = Registry::new();
/// let point = registry
///     .register(
///         "Point",
///         TypeId::INSTANCE,
///         TypeInfo::new().with_class_size(16).with_instance_size(16),
///         TypeFlags::empty(),
///     )
///     .unwrap();
///
/// let p = registry.instantiate(point).unwrap();
/// p.data_mut().write::<f64>(0, 1.5).unwrap();
///
/// let q = p.clone();
/// assert_eq!(q.refcount(), 2);
/// assert_eq!(q.data().read::<f64>(0).unwrap(), 1.5);
/// assert_eq!(registry.instance_count(point), 1);
///
/// drop((p, q));
/// assert_eq!(registry.instance_count(point), 0);
/// ```
pub struct Instance {
    /// Never null; valid while the count is above zero.
    ptr: NonNull<RawInstance>,
}

impl Instance {
    fn raw(&self) -> &RawInstance {
        // SAFETY: this handle owns one count, so the header is alive.
        unsafe { self.ptr.as_ref() }
    }

    /// The instance's exact type.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.raw().type_id
    }

    /// The class shared by every instance of this type.
    #[must_use]
    pub fn class(&self) -> &Class {
        &self.raw().class
    }

    /// Current reference count.
    ///
    /// May change concurrently; useful for tests and diagnostics.
    #[must_use]
    pub fn refcount(&self) -> u32 {
        self.raw().refcount.load(Ordering::Acquire)
    }

    /// Shared access to the instance bytes.
    pub fn data(&self) -> RwLockReadGuard<'_, InstanceData> {
        self.raw().data.read()
    }

    /// Exclusive access to the instance bytes.
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, InstanceData> {
        self.raw().data.write()
    }

    /// Releases this handle and returns how many references remain.
    ///
    /// Zero means the instance was destroyed.
    pub fn release(self) -> u32 {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never used or dropped again.
        unsafe { release_raw(this.ptr) }
    }

    /// Returns true if both handles share one instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        self.ptr == other.ptr
    }
}

/// # Safety
///
/// `ptr` must carry one count owned by the caller, which it gives up.
unsafe fn release_raw(ptr: NonNull<RawInstance>) -> u32 {
    // SAFETY: the caller's count keeps the header alive until the decrement.
    let previous = unsafe { ptr.as_ref() }
        .refcount
        .fetch_sub(1, Ordering::AcqRel);
    assert!(previous > 0, "instance released more times than it was retained");

    if previous == 1 {
        // SAFETY: the count hit zero, so no other handle exists; the header
        // came from Box::into_raw in `instantiate`.
        let raw = unsafe { Box::from_raw(ptr.as_ptr()) };
        destroy(*raw);
    }
    previous - 1
}

fn destroy(raw: RawInstance) {
    let RawInstance {
        type_id,
        class,
        data,
        ..
    } = raw;
    let meta = class.meta();
    trace!("destroying instance of '{}'", meta.name);

    let mut data = data.into_inner();
    for finalize in &meta.instance_finals {
        if let Err(e) = finalize(type_id, &mut data) {
            warn!("instance finalizer of '{}' failed: {}", meta.name, e);
        }
    }
    drop(data);

    meta.instances.fetch_sub(1, Ordering::AcqRel);
    drop(class);
}

// SAFETY: the header is only shared through atomics and locks, and `Class` is
// Send + Sync.
unsafe impl Send for Instance {}
// SAFETY: as above.
unsafe impl Sync for Instance {}

impl Clone for Instance {
    fn clone(&self) -> Self {
        let previous = self.raw().refcount.fetch_add(1, Ordering::AcqRel);
        assert!(previous < u32::MAX, "instance reference count overflow");
        Instance { ptr: self.ptr }
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        // SAFETY: this handle's count is given up exactly once, here.
        unsafe { release_raw(self.ptr) };
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Instance {}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.type_id())
            .field("class", &self.class().name())
            .field("refcount", &self.refcount())
            .finish()
    }
}

impl Registry {
    /// Creates an instance of `ty` with a reference count of 1.
    ///
    /// Finalizers are not run for an instance whose initialization failed.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `ty` is not registered
    /// - `InvalidType` if `ty` is abstract or not instantiable
    /// - `MemoryAllocation` if the allocator fails
    /// - any error returned by a class or instance initializer
    pub fn instantiate(&self, ty: TypeId) -> Result<Instance> {
        let meta = self.meta_or_not_found(ty)?;
        if meta.is(TypeFlags::ABSTRACT) {
            return Err(Error::invalid_type(format!(
                "'{}' is abstract",
                meta.name
            )));
        }
        if !meta.is(TypeFlags::INSTANTIABLE) {
            return Err(Error::invalid_type(format!(
                "'{}' is not instantiable",
                meta.name
            )));
        }

        let class = self.class_ref_meta(Arc::clone(&meta))?;
        let mut data = Storage::new(Arc::clone(&self.inner.allocator), meta.instance_size)?;
        for init in &meta.instance_inits {
            init(ty, &mut data)?;
        }

        meta.instances.fetch_add(1, Ordering::AcqRel);
        trace!("created instance of '{}'", meta.name);

        let raw = Box::new(RawInstance {
            type_id: ty,
            refcount: AtomicU32::new(1),
            class,
            data: RwLock::new(data),
        });
        Ok(Instance {
            ptr: NonNull::from(Box::leak(raw)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::runtime::TypeInfo;
    use std::sync::Mutex;

    fn object_type(registry: &Registry, name: &str) -> TypeId {
        registry
            .register(
                name,
                TypeId::INSTANCE,
                TypeInfo::new().with_class_size(8).with_instance_size(16),
                TypeFlags::empty(),
            )
            .unwrap()
    }

    #[test]
    fn test_instantiate_and_release() {
        let registry = Registry::new();
        let ty = object_type(&registry, "Plain");

        let obj = registry.instantiate(ty).unwrap();
        assert_eq!(obj.type_id(), ty);
        assert_eq!(obj.refcount(), 1);
        assert_eq!(obj.data().len(), 16);
        assert_eq!(registry.class_ref_count(ty), 1);

        let other = obj.clone();
        assert!(obj.ptr_eq(&other));
        assert_eq!(obj.release(), 1);
        assert_eq!(other.release(), 0);

        assert_eq!(registry.instance_count(ty), 0);
        assert_eq!(registry.class_ref_count(ty), 0);
    }

    #[test]
    fn test_instantiate_rejects() {
        let registry = Registry::new();
        let abstract_ty = registry
            .register(
                "AbstractThing",
                TypeId::INSTANCE,
                TypeInfo::new().with_class_size(8).with_instance_size(8),
                TypeFlags::ABSTRACT,
            )
            .unwrap();

        assert_eq!(
            registry.instantiate(abstract_ty).unwrap_err().kind(),
            ErrorKind::InvalidType
        );
        assert_eq!(
            registry.instantiate(TypeId::STATIC_CLASS).unwrap_err().kind(),
            ErrorKind::InvalidType
        );
        assert_eq!(
            registry.instantiate(TypeId::INVALID).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_init_order_and_final_order() {
        let registry = Registry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let (l1, l2, l3, l4) = (log.clone(), log.clone(), log.clone(), log.clone());
        let base = registry
            .register(
                "OrderBase",
                TypeId::INSTANCE,
                TypeInfo::new()
                    .with_class_size(8)
                    .with_instance_size(8)
                    .on_instance_init(move |_, _| {
                        l1.lock().unwrap().push("init base");
                        Ok(())
                    })
                    .on_instance_final(move |_, _| {
                        l2.lock().unwrap().push("final base");
                        Ok(())
                    }),
                TypeFlags::empty(),
            )
            .unwrap();
        let leaf = registry
            .register(
                "OrderLeaf",
                base,
                TypeInfo::new()
                    .with_class_size(8)
                    .with_instance_size(16)
                    .on_instance_init(move |ty, data| {
                        l3.lock().unwrap().push("init leaf");
                        data.write::<u64>(8, ty.index() as u64)
                    })
                    .on_instance_final(move |_, _| {
                        l4.lock().unwrap().push("final leaf");
                        Ok(())
                    }),
                TypeFlags::empty(),
            )
            .unwrap();

        let obj = registry.instantiate(leaf).unwrap();
        assert_eq!(obj.data().read::<u64>(8).unwrap(), leaf.index() as u64);
        drop(obj);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["init base", "init leaf", "final leaf", "final base"]
        );
    }

    #[test]
    fn test_unregister_blocked_by_instance() {
        let registry = Registry::new();
        let ty = object_type(&registry, "Blocking");
        let obj = registry.instantiate(ty).unwrap();
        assert_eq!(registry.unregister(ty).unwrap_err().kind(), ErrorKind::InUse);
        drop(obj);
        registry.unregister(ty).unwrap();
    }

    #[test]
    fn test_instance_shared_across_threads() {
        let registry = Registry::new();
        let ty = object_type(&registry, "Shared");
        let obj = registry.instantiate(ty).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let obj = obj.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let extra = obj.clone();
                        drop(extra);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(obj.refcount(), 1);
    }
}
