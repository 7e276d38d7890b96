//! The builtin types every registry starts with.
//!
//! Registration order fixes their ids; the `TypeId` constants depend on it.

use crate::error::Result;
use crate::runtime::flags::TypeFlags;
use crate::runtime::registry::Registry;
use crate::runtime::types::{TypeId, TypeInfo};
use crate::runtime::variant::{Primitive, builtin_ops, register_builtin_converters};

/// Class size of every builtin classed type.
const BUILTIN_CLASS_SIZE: usize = 8;

pub(crate) fn register_builtins(registry: &Registry) -> Result<()> {
    let builtin = |name: &str, parent: TypeId, info: TypeInfo, flags: TypeFlags, expected: TypeId| {
        let id = registry.register_with(name, parent, info, flags | TypeFlags::BUILTIN)?;
        debug_assert_eq!(id, expected, "builtin '{name}' registered out of order");
        Ok::<_, crate::error::Error>(id)
    };

    builtin(
        "Protocol",
        TypeId::INVALID,
        TypeInfo::new(),
        TypeFlags::DEPENDENT | TypeFlags::DERIVABLE | TypeFlags::ABSTRACT,
        TypeId::PROTOCOL,
    )?;
    builtin(
        "StaticClass",
        TypeId::INVALID,
        TypeInfo::new().with_class_size(BUILTIN_CLASS_SIZE),
        TypeFlags::CLASSED | TypeFlags::DEEP_DERIVABLE | TypeFlags::CLASS_PREINIT,
        TypeId::STATIC_CLASS,
    )?;
    builtin(
        "Interface",
        TypeId::INVALID,
        TypeInfo::new().with_class_size(BUILTIN_CLASS_SIZE),
        TypeFlags::INTERFACED
            | TypeFlags::DEEP_DERIVABLE
            | TypeFlags::ABSTRACT
            | TypeFlags::UNMAPPABLE
            | TypeFlags::CLASS_PREINIT,
        TypeId::INTERFACE,
    )?;
    builtin(
        "Instance",
        TypeId::INVALID,
        TypeInfo::new()
            .with_class_size(BUILTIN_CLASS_SIZE)
            .with_instance_size(BUILTIN_CLASS_SIZE),
        TypeFlags::INSTANTIABLE | TypeFlags::DEEP_DERIVABLE | TypeFlags::CLASS_PREINIT,
        TypeId::INSTANCE,
    )?;
    builtin(
        "IVariant",
        TypeId::INTERFACE,
        TypeInfo::new().with_class_size(BUILTIN_CLASS_SIZE),
        TypeFlags::ABSTRACT,
        TypeId::IVARIANT,
    )?;

    for kind in Primitive::ALL {
        builtin(
            kind.name(),
            TypeId::INVALID,
            TypeInfo::new()
                .with_class_size(BUILTIN_CLASS_SIZE)
                .with_interface(TypeId::IVARIANT, 0)
                .with_variant_ops(builtin_ops(kind)),
            TypeFlags::DERIVABLE | TypeFlags::CLASS_PINNED,
            kind.type_id(),
        )?;
    }

    // Bases of the user-registered value types. Each derived type brings its
    // own operation table.
    for (name, expected) in [
        ("enum", TypeId::ENUM),
        ("flags", TypeId::FLAGS),
        ("opaque", TypeId::OPAQUE),
    ] {
        builtin(
            name,
            TypeId::INVALID,
            TypeInfo::new()
                .with_class_size(BUILTIN_CLASS_SIZE)
                .with_interface(TypeId::IVARIANT, 0),
            TypeFlags::DERIVABLE | TypeFlags::ABSTRACT,
            expected,
        )?;
    }

    register_builtin_converters(registry);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::runtime::{Registry, TypeFlags, TypeId};

    #[test]
    fn test_builtin_ids_and_names() {
        let registry = Registry::new();
        let expected = [
            (TypeId::PROTOCOL, "Protocol"),
            (TypeId::STATIC_CLASS, "StaticClass"),
            (TypeId::INTERFACE, "Interface"),
            (TypeId::INSTANCE, "Instance"),
            (TypeId::IVARIANT, "IVariant"),
            (TypeId::NIL, "nil"),
            (TypeId::CHAR, "char"),
            (TypeId::DOUBLE, "double"),
            (TypeId::POINTER, "pointer"),
            (TypeId::ENUM, "enum"),
            (TypeId::FLAGS, "flags"),
            (TypeId::OPAQUE, "opaque"),
        ];
        for (id, name) in expected {
            assert_eq!(registry.name(id), Some(name));
            assert!(registry.flags(id).contains(TypeFlags::BUILTIN));
        }
    }

    #[test]
    fn test_builtin_shapes() {
        let registry = Registry::new();
        assert!(registry.flags(TypeId::INTERFACE).contains(TypeFlags::INTERFACED | TypeFlags::CLASSED));
        assert!(registry.flags(TypeId::IVARIANT).contains(TypeFlags::INTERFACED | TypeFlags::ABSTRACT));
        assert!(registry.flags(TypeId::PROTOCOL).contains(TypeFlags::DEPENDENT));
        assert!(registry.flags(TypeId::STRING).contains(TypeFlags::CLASS_PINNED));
        assert_eq!(registry.parent(TypeId::IVARIANT), TypeId::INTERFACE);
        assert_eq!(registry.instance_size(TypeId::INSTANCE), 8);

        // Preinit classes exist before anyone asks for them.
        assert_eq!(registry.class_ref_count(TypeId::STATIC_CLASS), 1);
        assert_eq!(registry.class_ref_count(TypeId::STRING), 0);
        for ty in [TypeId::NIL, TypeId::UINT8, TypeId::STRING] {
            assert!(registry.variant_ops(ty).is_some());
            assert!(registry.check(ty, TypeId::IVARIANT));
        }
        for ty in [TypeId::ENUM, TypeId::FLAGS, TypeId::OPAQUE] {
            assert!(registry.flags(ty).contains(TypeFlags::ABSTRACT | TypeFlags::DERIVABLE));
            assert!(registry.check(ty, TypeId::IVARIANT));
            assert!(registry.variant_ops(ty).is_none());
        }
    }
}
