//! Read-only registry queries.
//!
//! Every query is total over [`TypeId`]: asking about an unregistered id
//! (including [`TypeId::INVALID`]) yields `TypeId::INVALID`, `false`, `0` or
//! `None` rather than an error.
//!
//! The graph walks live on [`TypeTable`] so that registration can run the
//! same rules under its write lock; the `Registry` methods take the read lock
//! once and delegate.

use crate::error::{Error, Result};
use crate::runtime::flags::TypeFlags;
use crate::runtime::registry::{Registry, TypeMeta, TypeTable};
use crate::runtime::types::{InterfaceMapEntry, TypeId};
use crate::runtime::variant::VariantOps;
use smallvec::SmallVec;
use std::sync::Arc;

/// One interface reachable from a class, located inside the class bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassInterface {
    pub interface: TypeId,
    pub offset: usize,
    /// The interface's class size.
    pub size: usize,
}

/// Flattened interface table of a class.
pub(crate) type InterfaceTable = SmallVec<[ClassInterface; 4]>;

impl TypeTable {
    pub(crate) fn parent(&self, ty: TypeId) -> TypeId {
        self.get(ty).map_or(TypeId::INVALID, |m| m.parent)
    }

    pub(crate) fn depth(&self, ty: TypeId) -> usize {
        self.get(ty).map_or(0, |m| m.depth())
    }

    /// The type at `depth` in `ty`'s chain, counted from the root.
    pub(crate) fn base(&self, ty: TypeId, depth: usize) -> TypeId {
        let Some(meta) = self.get(ty) else {
            return TypeId::INVALID;
        };
        match depth.cmp(&meta.depth()) {
            std::cmp::Ordering::Less => meta.bases[depth],
            std::cmp::Ordering::Equal => ty,
            std::cmp::Ordering::Greater => TypeId::INVALID,
        }
    }

    /// The type `level` steps above `ty`; level 0 is `ty` itself.
    pub(crate) fn ancestor(&self, ty: TypeId, level: usize) -> TypeId {
        match self.get(ty) {
            Some(meta) if level <= meta.depth() => self.base(ty, meta.depth() - level),
            _ => TypeId::INVALID,
        }
    }

    /// Walks `derived` and its ancestors looking for `base`.
    ///
    /// With `class_checks`, reaching `base` through derivation counts. With
    /// `iface_checks`, reaching it through a (recursive) interface map counts,
    /// but only if `base` is a mappable interface.
    fn is_a(&self, derived: TypeId, base: TypeId, class_checks: bool, iface_checks: bool) -> bool {
        let (Some(mut level), Some(target)) = (self.get(derived), self.get(base)) else {
            return false;
        };
        let iface_checks = iface_checks
            && target.is(TypeFlags::INTERFACED)
            && !target.is(TypeFlags::UNMAPPABLE);

        loop {
            if level.id == base {
                return class_checks;
            }
            if iface_checks
                && level
                    .interfaces
                    .iter()
                    .any(|entry| self.is_a(entry.interface, base, true, true))
            {
                return true;
            }
            match self.get(level.parent) {
                Some(parent) => level = parent,
                None => return false,
            }
        }
    }

    pub(crate) fn check(&self, ty: TypeId, other: TypeId) -> bool {
        self.is_a(ty, other, true, true)
    }

    pub(crate) fn derives(&self, derived: TypeId, base: TypeId) -> bool {
        derived != base && self.is_a(derived, base, true, false)
    }

    pub(crate) fn maps(&self, concrete: TypeId, iface: TypeId) -> bool {
        self.is_a(concrete, iface, false, true)
    }

    pub(crate) fn implements(&self, ty: TypeId, other: TypeId) -> bool {
        self.get(ty).is_some()
            && (ty == other || self.derives(ty, other) || self.maps(ty, other))
    }

    /// The most basic type both `ty` and `other` are compatible through.
    ///
    /// Unmappable interface bases are skipped so that two unrelated interfaces
    /// sharing only the interface root have nothing in common.
    pub(crate) fn common(&self, ty: TypeId, other: TypeId) -> TypeId {
        let (Some(_), Some(other_meta)) = (self.get(ty), self.get(other)) else {
            return TypeId::INVALID;
        };
        let ifaced = other_meta.is(TypeFlags::INTERFACED);

        for depth in 0..=other_meta.depth() {
            let base = self.base(other, depth);
            let Some(base_meta) = self.get(base) else {
                continue;
            };
            let unmappable = base_meta.is(TypeFlags::UNMAPPABLE);

            if self.implements(ty, base) {
                if ifaced && unmappable {
                    continue;
                }
                return base;
            }
            if !unmappable {
                for entry in &base_meta.interfaces {
                    let common = self.common(ty, entry.interface);
                    if common.is_valid() {
                        return common;
                    }
                }
            }
        }
        TypeId::INVALID
    }

    pub(crate) fn depends(&self, dependent: TypeId, dependency: TypeId) -> bool {
        let Some(meta) = self.get(dependent) else {
            return false;
        };
        if !meta.is(TypeFlags::DEPENDENT) || self.get(dependency).is_none() {
            return false;
        }
        meta.bases
            .iter()
            .copied()
            .chain(std::iter::once(dependent))
            .filter_map(|level| self.get(level))
            .flat_map(|level| level.dependencies.iter().copied())
            .any(|dep| dep == dependency || self.depends(dep, dependency))
    }

    /// Returns true if `ty` satisfies `dependent`: it checks against
    /// `dependent` when that is classed, and it satisfies every dependency
    /// declared along `dependent`'s chain.
    pub(crate) fn conforms(&self, ty: TypeId, dependent: TypeId) -> bool {
        let (Some(_), Some(meta)) = (self.get(ty), self.get(dependent)) else {
            return false;
        };
        if meta.is(TypeFlags::CLASSED) && !self.check(ty, dependent) {
            return false;
        }
        if !meta.is(TypeFlags::DEPENDENT) {
            return true;
        }
        meta.bases
            .iter()
            .copied()
            .chain(std::iter::once(dependent))
            .filter_map(|level| self.get(level))
            .flat_map(|level| level.dependencies.iter().copied())
            .all(|dep| self.check(ty, dep) || self.conforms(ty, dep))
    }

    /// Byte offset of `iface` inside `ty`'s class.
    ///
    /// Walks `ty`'s own map first, then each ancestor's, recursing into mapped
    /// interfaces. Derivation resolves to offset 0.
    pub(crate) fn interface_offset(&self, ty: TypeId, iface: TypeId) -> Option<usize> {
        let target = self.get(iface)?;
        let mappable = target.is(TypeFlags::INTERFACED) && !target.is(TypeFlags::UNMAPPABLE);
        self.offset_in(ty, iface, mappable)
    }

    fn offset_in(&self, ty: TypeId, iface: TypeId, mappable: bool) -> Option<usize> {
        let mut level = self.get(ty);
        while let Some(meta) = level {
            if meta.id == iface {
                return Some(0);
            }
            if mappable {
                for entry in &meta.interfaces {
                    if let Some(inner) = self.offset_in(entry.interface, iface, mappable) {
                        return Some(entry.offset + inner);
                    }
                }
            }
            level = self.get(meta.parent);
        }
        None
    }

    /// Every mappable interface reachable from `meta`, with its offset.
    ///
    /// `meta` itself does not have to be in the table yet.
    pub(crate) fn interface_table(&self, meta: &TypeMeta) -> InterfaceTable {
        let mut table = InterfaceTable::new();
        push_mappable(meta, 0, &mut table);
        self.push_interface_chain(meta.parent, 0, &mut table);
        self.collect_own(meta, 0, &mut table);
        self.collect_mapped(meta.parent, 0, &mut table);
        table
    }

    fn push_interface_chain(&self, iface: TypeId, offset: usize, out: &mut InterfaceTable) {
        let mut level = self.get(iface);
        while let Some(meta) = level {
            push_mappable(meta, offset, out);
            level = self.get(meta.parent);
        }
    }

    fn collect_own(&self, meta: &TypeMeta, base: usize, out: &mut InterfaceTable) {
        for entry in &meta.interfaces {
            let offset = base + entry.offset;
            self.push_interface_chain(entry.interface, offset, out);
            self.collect_mapped(entry.interface, offset, out);
        }
    }

    fn collect_mapped(&self, ty: TypeId, base: usize, out: &mut InterfaceTable) {
        let mut level = self.get(ty);
        while let Some(meta) = level {
            self.collect_own(meta, base, out);
            level = self.get(meta.parent);
        }
    }

    pub(crate) fn variant_ops(&self, ty: TypeId) -> Option<Arc<dyn VariantOps>> {
        self.get(ty)?.variant_ops.clone()
    }
}

fn push_mappable(meta: &TypeMeta, offset: usize, out: &mut InterfaceTable) {
    if meta.is(TypeFlags::INTERFACED)
        && !meta.is(TypeFlags::UNMAPPABLE)
        && !out.iter().any(|known| known.interface == meta.id)
    {
        out.push(ClassInterface {
            interface: meta.id,
            offset,
            size: meta.class_size,
        });
    }
}

impl Registry {
    /// Parent of `ty`, `INVALID` for roots.
    #[must_use]
    pub fn parent(&self, ty: TypeId) -> TypeId {
        self.inner.table.read().parent(ty)
    }

    /// Root of `ty`'s derivation tree (`ty` itself for a root).
    #[must_use]
    pub fn root(&self, ty: TypeId) -> TypeId {
        self.inner
            .table
            .read()
            .get(ty)
            .map_or(TypeId::INVALID, |m| m.root())
    }

    /// The type at `depth` in `ty`'s chain, counted from the root.
    ///
    /// `base(ty, 0)` is the root and `base(ty, depth(ty))` is `ty`.
    #[must_use]
    pub fn base(&self, ty: TypeId, depth: usize) -> TypeId {
        self.inner.table.read().base(ty, depth)
    }

    /// The type `level` steps above `ty`.
    ///
    /// `ancestor(ty, 0)` is `ty` and `ancestor(ty, depth(ty))` is the root;
    /// anything deeper is `INVALID`.
    #[must_use]
    pub fn ancestor(&self, ty: TypeId, level: usize) -> TypeId {
        self.inner.table.read().ancestor(ty, level)
    }

    /// Number of ancestors of `ty`; 0 for roots.
    #[must_use]
    pub fn depth(&self, ty: TypeId) -> usize {
        self.inner.table.read().depth(ty)
    }

    /// Returns true if `base` is a strict ancestor of `derived`.
    #[must_use]
    pub fn derives(&self, derived: TypeId, base: TypeId) -> bool {
        self.inner.table.read().derives(derived, base)
    }

    /// Returns true if `ty` is `other`, derives from it, or reaches it
    /// through an interface map.
    ///
    /// # Example
    ///
    /// ```rust
    /// use oxitype::{Registry, TypeId};
    ///
    /// let registry = Registry::new();
    /// assert!(registry.check(TypeId::UINT8, TypeId::UINT8));
    /// assert!(registry.check(TypeId::UINT8, TypeId::IVARIANT));
    /// assert!(!registry.check(TypeId::UINT8, TypeId::INT16));
    /// ```
    #[must_use]
    pub fn check(&self, ty: TypeId, other: TypeId) -> bool {
        self.inner.table.read().check(ty, other)
    }

    /// Returns true if `iface` is reachable from `concrete` through an
    /// interface map (not through plain derivation).
    #[must_use]
    pub fn maps(&self, concrete: TypeId, iface: TypeId) -> bool {
        self.inner.table.read().maps(concrete, iface)
    }

    /// `ty == other`, or `ty` derives or maps `other`.
    #[must_use]
    pub fn implements(&self, ty: TypeId, other: TypeId) -> bool {
        self.inner.table.read().implements(ty, other)
    }

    /// The type through which `ty` and `other` overlap, or `INVALID`.
    #[must_use]
    pub fn common(&self, ty: TypeId, other: TypeId) -> TypeId {
        self.inner.table.read().common(ty, other)
    }

    /// Returns true if `dependent` (or an ancestor of it, or one of its
    /// dependencies, transitively) lists `dependency`.
    #[must_use]
    pub fn depends(&self, dependent: TypeId, dependency: TypeId) -> bool {
        self.inner.table.read().depends(dependent, dependency)
    }

    /// Returns true if `ty` satisfies every constraint `dependent` imposes.
    #[must_use]
    pub fn conforms(&self, ty: TypeId, dependent: TypeId) -> bool {
        self.inner.table.read().conforms(ty, dependent)
    }

    /// Returns true if `ty` is currently registered.
    #[must_use]
    pub fn verify(&self, ty: TypeId) -> bool {
        self.inner.table.read().get(ty).is_some()
    }

    /// Interned name of `ty`.
    #[must_use]
    pub fn name(&self, ty: TypeId) -> Option<&'static str> {
        self.inner.table.read().get(ty).map(|m| m.name)
    }

    /// Type registered under `name`, or `INVALID`.
    #[must_use]
    pub fn find(&self, name: &str) -> TypeId {
        self.inner
            .table
            .read()
            .find(name)
            .unwrap_or(TypeId::INVALID)
    }

    /// Number of registered types, builtins included.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.table.read().live()
    }

    /// Ids of all registered types in registration order.
    #[must_use]
    pub fn type_ids(&self) -> Vec<TypeId> {
        self.inner.table.read().iter().map(|m| m.id).collect()
    }

    /// Root flags of `ty`'s tree plus its own flags; empty when unregistered.
    #[must_use]
    pub fn flags(&self, ty: TypeId) -> TypeFlags {
        self.inner
            .table
            .read()
            .get(ty)
            .map_or(TypeFlags::empty(), |m| m.flags)
    }

    #[must_use]
    pub fn class_size(&self, ty: TypeId) -> usize {
        self.inner.table.read().get(ty).map_or(0, |m| m.class_size)
    }

    #[must_use]
    pub fn instance_size(&self, ty: TypeId) -> usize {
        self.inner
            .table
            .read()
            .get(ty)
            .map_or(0, |m| m.instance_size)
    }

    /// Number of entries in `ty`'s own interface map.
    #[must_use]
    pub fn interface_count(&self, ty: TypeId) -> usize {
        self.inner
            .table
            .read()
            .get(ty)
            .map_or(0, |m| m.interfaces.len())
    }

    /// Entry `index` of `ty`'s own interface map.
    #[must_use]
    pub fn interface(&self, ty: TypeId, index: usize) -> Option<InterfaceMapEntry> {
        self.inner
            .table
            .read()
            .get(ty)?
            .interfaces
            .get(index)
            .copied()
    }

    /// Number of dependencies `ty` itself declares.
    #[must_use]
    pub fn dependency_count(&self, ty: TypeId) -> usize {
        self.inner
            .table
            .read()
            .get(ty)
            .map_or(0, |m| m.dependencies.len())
    }

    /// Dependency `index` of `ty`, or `INVALID`.
    #[must_use]
    pub fn dependency(&self, ty: TypeId, index: usize) -> TypeId {
        self.inner
            .table
            .read()
            .get(ty)
            .and_then(|m| m.dependencies.get(index).copied())
            .unwrap_or(TypeId::INVALID)
    }

    /// Current class reference count, including a pinned class's permanent
    /// reference.
    #[must_use]
    pub fn class_ref_count(&self, ty: TypeId) -> u32 {
        self.inner
            .table
            .read()
            .get(ty)
            .map_or(0, |m| m.class.ref_count())
    }

    /// Number of live instances of exactly `ty`.
    #[must_use]
    pub fn instance_count(&self, ty: TypeId) -> usize {
        self.inner
            .table
            .read()
            .get(ty)
            .map_or(0, |m| m.instance_count())
    }

    /// Byte offset of interface `iface` inside the class of `ty`.
    ///
    /// Runs in time proportional to the derivation depth plus the interface
    /// map sizes; no per-call table is built.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` unless `check(ty, iface)` holds.
    ///
    /// # Example
    ///
    /// ```rust
    /// use oxitype::{Registry, TypeId};
    ///
    /// let registry = Registry::new();
    /// assert_eq!(registry.resolve_interface(TypeId::STRING, TypeId::IVARIANT), Ok(0));
    /// assert!(registry.resolve_interface(TypeId::STRING, TypeId::INT32).is_err());
    /// ```
    pub fn resolve_interface(&self, ty: TypeId, iface: TypeId) -> Result<usize> {
        let table = self.inner.table.read();
        if !table.check(ty, iface) {
            return Err(Error::not_found(format!(
                "interface {} in type {}",
                table.get(iface).map_or("<invalid>", |m| m.name),
                table.get(ty).map_or("<invalid>", |m| m.name),
            )));
        }
        table.interface_offset(ty, iface).ok_or_else(|| {
            Error::not_found(format!("interface {iface} in type {ty}"))
        })
    }

    /// Variant operation table of `ty` (own or inherited).
    #[must_use]
    pub fn variant_ops(&self, ty: TypeId) -> Option<Arc<dyn VariantOps>> {
        self.inner.table.read().variant_ops(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::ClassInterface;
    use crate::runtime::{Registry, TypeFlags, TypeId, TypeInfo};

    fn chain(registry: &Registry) -> (TypeId, TypeId, TypeId) {
        let a = registry
            .register(
                "ChainA",
                TypeId::INVALID,
                TypeInfo::new().with_class_size(8),
                TypeFlags::DEEP_DERIVABLE,
            )
            .unwrap();
        let b = registry
            .register("ChainB", a, TypeInfo::new().with_class_size(8), TypeFlags::empty())
            .unwrap();
        let c = registry
            .register("ChainC", b, TypeInfo::new().with_class_size(16), TypeFlags::empty())
            .unwrap();
        (a, b, c)
    }

    #[test]
    fn test_chain_navigation() {
        let registry = Registry::new();
        let (a, b, c) = chain(&registry);

        assert_eq!(registry.depth(c), 2);
        assert_eq!(registry.root(c), a);
        assert_eq!(registry.root(a), a);
        assert_eq!(registry.parent(c), b);
        assert_eq!(registry.parent(a), TypeId::INVALID);

        assert_eq!(registry.base(c, 0), a);
        assert_eq!(registry.base(c, 1), b);
        assert_eq!(registry.base(c, 2), c);
        assert_eq!(registry.base(c, 3), TypeId::INVALID);

        assert_eq!(registry.ancestor(c, 0), c);
        assert_eq!(registry.ancestor(c, 1), b);
        assert_eq!(registry.ancestor(c, 2), a);
        assert_eq!(registry.ancestor(c, 3), TypeId::INVALID);
    }

    #[test]
    fn test_derives_is_strict() {
        let registry = Registry::new();
        let (a, _, c) = chain(&registry);
        assert!(registry.derives(c, a));
        assert!(!registry.derives(a, c));
        assert!(!registry.derives(c, c));
        assert!(registry.check(c, c));
        assert!(registry.implements(c, c));
    }

    #[test]
    fn test_queries_on_invalid() {
        let registry = Registry::new();
        let invalid = TypeId::INVALID;
        assert_eq!(registry.parent(invalid), invalid);
        assert_eq!(registry.root(invalid), invalid);
        assert_eq!(registry.depth(invalid), 0);
        assert_eq!(registry.ancestor(invalid, 0), invalid);
        assert!(!registry.check(invalid, invalid));
        assert!(!registry.derives(TypeId::UINT8, invalid));
        assert!(!registry.maps(invalid, TypeId::IVARIANT));
        assert!(!registry.conforms(invalid, TypeId::PROTOCOL));
        assert!(!registry.depends(invalid, invalid));
        assert_eq!(registry.common(invalid, TypeId::UINT8), invalid);
        assert_eq!(registry.name(invalid), None);
        assert_eq!(registry.class_size(invalid), 0);
        assert_eq!(registry.flags(invalid), TypeFlags::empty());
        assert_eq!(registry.class_ref_count(invalid), 0);
        assert_eq!(registry.interface(invalid, 0), None);
        assert_eq!(registry.dependency(invalid, 0), invalid);
    }

    #[test]
    fn test_builtin_interface_queries() {
        let registry = Registry::new();
        assert!(registry.maps(TypeId::UINT8, TypeId::IVARIANT));
        assert!(!registry.derives(TypeId::UINT8, TypeId::IVARIANT));
        assert!(registry.derives(TypeId::IVARIANT, TypeId::INTERFACE));
        // The interface root is unmappable.
        assert!(!registry.check(TypeId::UINT8, TypeId::INTERFACE));
        assert_eq!(registry.common(TypeId::UINT8, TypeId::IVARIANT), TypeId::IVARIANT);
        assert_eq!(registry.common(TypeId::UINT8, TypeId::INT32), TypeId::IVARIANT);
    }

    #[test]
    fn test_interface_table_includes_nested() {
        let registry = Registry::new();
        let expected = ClassInterface {
            interface: TypeId::IVARIANT,
            offset: 0,
            size: registry.class_size(TypeId::IVARIANT),
        };
        let types = registry.inner.table.read();
        let table = types.interface_table(types.get(TypeId::BOOL).unwrap());
        assert_eq!(table.as_slice(), &[expected]);
        let table = types.interface_table(types.get(TypeId::IVARIANT).unwrap());
        assert_eq!(table.as_slice(), &[expected]);
    }
}
