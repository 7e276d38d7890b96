//! Registration rules.
//!
//! [`validate`] runs against the table under the registry's write lock and
//! either returns the effective flags of the new type or the first rule it
//! violates. It never mutates anything.

use crate::error::{Error, Result};
use crate::runtime::flags::TypeFlags;
use crate::runtime::registry::{TypeMeta, TypeTable};
use crate::runtime::types::{TypeId, TypeInfo};

fn fail<T>(name: &str, reason: impl std::fmt::Display) -> Result<T> {
    Err(Error::invalid_type(format!("'{name}': {reason}")))
}

/// Validates a registration request and returns the flags to store.
///
/// The stored flags are the root flags of the tree plus the type's own,
/// normalized per [`TypeFlags::with_implied`].
pub(crate) fn validate(
    table: &TypeTable,
    name: &str,
    parent: TypeId,
    info: &TypeInfo,
    flags: TypeFlags,
) -> Result<TypeFlags> {
    let parent_meta = if parent.is_valid() {
        Some(table.get(parent).ok_or_else(|| Error::InvalidParent {
            name: name.into(),
        })?)
    } else {
        None
    };

    let own = flags.with_implied(
        parent_meta.is_none(),
        !info.dependencies.is_empty(),
        info.class_size,
        info.instance_size,
    );

    let flags = match parent_meta {
        Some(p) => {
            if !own.root_flags().is_empty() {
                return fail(name, "root flags cannot be set on a derived type");
            }
            p.flags.root_flags() | own
        }
        None => own,
    };

    if let Some(p) = parent_meta {
        check_derivation(table, name, p, flags)?;
    }
    check_sizes(name, parent_meta, info, flags)?;
    check_dependencies(table, name, info, flags)?;
    check_interfaces(table, name, parent, parent_meta, info)?;
    check_variant_ops(table, name, parent, info)?;

    Ok(flags)
}

fn check_derivation(table: &TypeTable, name: &str, parent: &TypeMeta, flags: TypeFlags) -> Result<()> {
    if !flags.contains(TypeFlags::DERIVABLE) {
        return fail(name, format_args!("'{}' is not derivable", parent.name));
    }
    if parent.depth() > 0 && !flags.contains(TypeFlags::DEEP_DERIVABLE) {
        let root = table.get(parent.root()).map_or("<root>", |m| m.name);
        return fail(
            name,
            format_args!("'{root}' only allows one level of derivation"),
        );
    }
    if parent.is(TypeFlags::FINAL) {
        return fail(name, format_args!("'{}' is final", parent.name));
    }
    Ok(())
}

fn check_sizes(
    name: &str,
    parent: Option<&TypeMeta>,
    info: &TypeInfo,
    flags: TypeFlags,
) -> Result<()> {
    if flags.contains(TypeFlags::CLASS_PINNED) && !flags.contains(TypeFlags::CLASSED) {
        return fail(name, "cannot pin the class of a non-classed type");
    }

    if flags.contains(TypeFlags::CLASSED) {
        if info.class_size == 0 {
            return fail(name, "classed types need a class size");
        }
        if let Some(p) = parent {
            if info.class_size < p.class_size {
                return fail(
                    name,
                    format_args!(
                        "class size {} is smaller than parent class size {}",
                        info.class_size, p.class_size
                    ),
                );
            }
        }
    } else {
        if info.class_size != 0 {
            return fail(name, "non-classed types cannot have a class size");
        }
        if !info.interfaces.is_empty() {
            return fail(name, "non-classed types cannot map interfaces");
        }
    }

    if flags.contains(TypeFlags::INTERFACED) && flags.contains(TypeFlags::INSTANTIABLE) {
        return fail(name, "interfaces cannot be instantiable");
    }

    if flags.contains(TypeFlags::INSTANTIABLE) {
        if info.instance_size == 0 {
            return fail(name, "instantiable types need an instance size");
        }
        if let Some(p) = parent {
            if info.instance_size < p.instance_size {
                return fail(
                    name,
                    format_args!(
                        "instance size {} is smaller than parent instance size {}",
                        info.instance_size, p.instance_size
                    ),
                );
            }
        }
    } else if info.instance_size != 0 {
        return fail(name, "non-instantiable types cannot have an instance size");
    }

    Ok(())
}

fn check_dependencies(
    table: &TypeTable,
    name: &str,
    info: &TypeInfo,
    flags: TypeFlags,
) -> Result<()> {
    if info.dependencies.is_empty() {
        return Ok(());
    }
    if !flags.contains(TypeFlags::DEPENDENT) {
        return fail(name, "only dependent types can declare dependencies");
    }

    let mut primaries = 0;
    for (index, &dep) in info.dependencies.iter().enumerate() {
        let Some(meta) = table.get(dep) else {
            return fail(name, format_args!("dependency {index} is not a registered type"));
        };
        if !meta.is(TypeFlags::DEPENDENT) {
            primaries += 1;
        }
    }
    if primaries > 1 {
        return fail(
            name,
            format_args!("{primaries} independent non-dependent dependencies (at most one)"),
        );
    }
    Ok(())
}

fn check_interfaces(
    table: &TypeTable,
    name: &str,
    parent: TypeId,
    parent_meta: Option<&TypeMeta>,
    info: &TypeInfo,
) -> Result<()> {
    let entries = &info.interfaces;
    let mut metas = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let Some(iface) = table.get(entry.interface) else {
            return fail(name, format_args!("interface {index} is not a registered type"));
        };
        if !iface.is(TypeFlags::INTERFACED) {
            return fail(name, format_args!("'{}' is not an interface", iface.name));
        }

        let common = table.common(parent, entry.interface);
        if common.is_valid() {
            return fail(
                name,
                format_args!(
                    "'{}' is already reachable from the parent through '{}'",
                    iface.name,
                    table.get(common).map_or("<invalid>", |m| m.name)
                ),
            );
        }

        let end = entry.offset.checked_add(iface.class_size);
        if end.is_none_or(|end| end > info.class_size) {
            return fail(
                name,
                format_args!(
                    "'{}' at offset {} overruns the class size {}",
                    iface.name, entry.offset, info.class_size
                ),
            );
        }

        if let Some(p) = parent_meta {
            if entry.offset < p.class_size {
                return fail(
                    name,
                    format_args!(
                        "'{}' at offset {} lies inside the parent class (size {})",
                        iface.name, entry.offset, p.class_size
                    ),
                );
            }
        }
        metas.push(iface);
    }

    for i in 0..entries.len() {
        for j in i + 1..entries.len() {
            let common = table.common(entries[i].interface, entries[j].interface);
            if common.is_valid() {
                return fail(
                    name,
                    format_args!(
                        "'{}' and '{}' are ambiguous through '{}'",
                        metas[i].name,
                        metas[j].name,
                        table.get(common).map_or("<invalid>", |m| m.name)
                    ),
                );
            }
            if entries[i].offset + metas[i].class_size > entries[j].offset {
                return fail(
                    name,
                    format_args!("'{}' overlaps '{}'", metas[i].name, metas[j].name),
                );
            }
        }
    }

    for (i, iface) in metas.iter().enumerate() {
        for &dep in &iface.dependencies {
            let satisfied = table.conforms(parent, dep)
                || entries[..i]
                    .iter()
                    .any(|earlier| table.check(earlier.interface, dep));
            if !satisfied {
                return fail(
                    name,
                    format_args!(
                        "dependency '{}' of interface '{}' is not satisfied",
                        table.get(dep).map_or("<invalid>", |m| m.name),
                        iface.name
                    ),
                );
            }
        }
    }

    Ok(())
}

fn check_variant_ops(table: &TypeTable, name: &str, parent: TypeId, info: &TypeInfo) -> Result<()> {
    if info.variant_ops.is_none() {
        return Ok(());
    }
    let implements = table.check(parent, TypeId::IVARIANT)
        || info
            .interfaces
            .iter()
            .any(|entry| table.check(entry.interface, TypeId::IVARIANT));
    if implements {
        Ok(())
    } else {
        fail(name, "variant ops require the IVariant interface")
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::runtime::{Registry, TypeFlags, TypeId, TypeInfo};

    fn reject(registry: &Registry, parent: TypeId, info: TypeInfo, flags: TypeFlags) -> ErrorKind {
        registry
            .register("Rejected", parent, info, flags)
            .unwrap_err()
            .kind()
    }

    #[test]
    fn test_unknown_parent() {
        let registry = Registry::new();
        let bogus = TypeId::from_index(9999);
        assert_eq!(
            reject(&registry, bogus, TypeInfo::new(), TypeFlags::empty()),
            ErrorKind::InvalidParent
        );
    }

    #[test]
    fn test_size_rules() {
        let registry = Registry::new();
        // classed without size
        assert_eq!(
            reject(&registry, TypeId::INVALID, TypeInfo::new(), TypeFlags::CLASSED),
            ErrorKind::InvalidType
        );
        // interfaced and instantiable
        assert_eq!(
            reject(
                &registry,
                TypeId::INVALID,
                TypeInfo::new().with_class_size(8).with_instance_size(8),
                TypeFlags::INTERFACED
            ),
            ErrorKind::InvalidType
        );
        // pinned but not classed
        assert_eq!(
            reject(&registry, TypeId::INVALID, TypeInfo::new(), TypeFlags::CLASS_PINNED),
            ErrorKind::InvalidType
        );
        assert_eq!(registry.find("Rejected"), TypeId::INVALID);
    }

    #[test]
    fn test_derived_size_rules() {
        let registry = Registry::new();
        let base = registry
            .register(
                "SizedBase",
                TypeId::INVALID,
                TypeInfo::new().with_class_size(16),
                TypeFlags::DERIVABLE,
            )
            .unwrap();
        assert_eq!(
            reject(&registry, base, TypeInfo::new().with_class_size(8), TypeFlags::empty()),
            ErrorKind::InvalidType
        );
        assert_eq!(
            reject(&registry, base, TypeInfo::new(), TypeFlags::empty()),
            ErrorKind::InvalidType
        );
    }

    #[test]
    fn test_root_flags_on_derived() {
        let registry = Registry::new();
        assert_eq!(
            reject(
                &registry,
                TypeId::STATIC_CLASS,
                TypeInfo::new().with_class_size(16),
                TypeFlags::INSTANTIABLE
            ),
            ErrorKind::InvalidType
        );
    }

    #[test]
    fn test_dependencies_need_dependent_flag() {
        let registry = Registry::new();
        // A derived non-dependent tree cannot list dependencies.
        assert_eq!(
            reject(
                &registry,
                TypeId::STATIC_CLASS,
                TypeInfo::new()
                    .with_class_size(16)
                    .with_dependency(TypeId::INSTANCE),
                TypeFlags::empty()
            ),
            ErrorKind::InvalidType
        );
    }

    #[test]
    fn test_variant_ops_need_ivariant() {
        let registry = Registry::new();
        let ops = registry.variant_ops(TypeId::UINT8).unwrap();
        assert_eq!(
            reject(
                &registry,
                TypeId::STATIC_CLASS,
                TypeInfo::new().with_class_size(16).with_variant_ops(ops.clone()),
                TypeFlags::empty()
            ),
            ErrorKind::InvalidType
        );
        registry
            .register(
                "WithOps",
                TypeId::STATIC_CLASS,
                TypeInfo::new()
                    .with_class_size(16)
                    .with_interface(TypeId::IVARIANT, 8)
                    .with_variant_ops(ops),
                TypeFlags::empty(),
            )
            .unwrap();
    }
}
