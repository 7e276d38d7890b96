//! Registration rules and registry queries.

mod common;

use common::{classed_root, derived, unique_name};
use oxitype::{ErrorKind, Registry, RegistryConfig, TypeFlags, TypeId, TypeInfo};

// ============================================================================
// Registration
// ============================================================================

#[test]
fn test_register_and_lookup() {
    let registry = Registry::new();
    let name = unique_name("Lookup");
    let ty = registry
        .register(&name, TypeId::INVALID, TypeInfo::new().with_class_size(24), TypeFlags::DERIVABLE)
        .unwrap();

    assert!(registry.verify(ty));
    assert_eq!(registry.find(&name), ty);
    assert_eq!(registry.name(ty), Some(name.as_str()));
    assert_eq!(registry.class_size(ty), 24);
    assert!(registry.flags(ty).contains(TypeFlags::CLASSED | TypeFlags::DERIVABLE));
    assert_eq!(registry.count(), TypeId::BUILTIN_COUNT + 1);
    assert!(registry.type_ids().contains(&ty));
}

#[test]
fn test_failed_registration_commits_nothing() {
    let registry = Registry::new();
    let name = unique_name("Atomic");
    let before = registry.count();

    // Non-classed type with an interface map.
    let err = registry
        .register(
            &name,
            TypeId::INVALID,
            TypeInfo::new().with_interface(TypeId::IVARIANT, 0),
            TypeFlags::empty(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidType);
    assert_eq!(registry.count(), before);
    assert_eq!(registry.find(&name), TypeId::INVALID);

    // The name is still free.
    registry
        .register(&name, TypeId::INVALID, TypeInfo::new(), TypeFlags::empty())
        .unwrap();
}

#[test]
fn test_derivability() {
    let registry = Registry::new();
    let closed = classed_root(&registry, "Closed", 8, TypeFlags::empty());
    let shallow = classed_root(&registry, "Shallow", 8, TypeFlags::DERIVABLE);

    let err = registry
        .register(&unique_name("X"), closed, TypeInfo::new().with_class_size(8), TypeFlags::empty())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidType);

    let child = derived(&registry, "ShallowChild", shallow, 8);
    let err = registry
        .register(&unique_name("X"), child, TypeInfo::new().with_class_size(8), TypeFlags::empty())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidType);
}

#[test]
fn test_final_blocks_derivation() {
    let registry = Registry::new();
    let sealed = registry
        .register(
            &unique_name("Sealed"),
            TypeId::STATIC_CLASS,
            TypeInfo::new().with_class_size(8),
            TypeFlags::FINAL,
        )
        .unwrap();
    let err = registry
        .register(&unique_name("X"), sealed, TypeInfo::new().with_class_size(8), TypeFlags::empty())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidType);
}

#[test]
fn test_deep_chain_depth_and_ancestors() {
    let registry = Registry::new();
    let root = classed_root(&registry, "Deep", 8, TypeFlags::DEEP_DERIVABLE);

    let mut chain = vec![root];
    for i in 0..6 {
        let last = *chain.last().unwrap();
        chain.push(derived(&registry, "Deep", last, 8 + i * 4));
    }
    let leaf = *chain.last().unwrap();

    assert_eq!(registry.depth(leaf), chain.len() - 1);
    assert_eq!(registry.ancestor(leaf, registry.depth(leaf)), root);
    assert_eq!(registry.root(leaf), root);
    for (depth, &ty) in chain.iter().enumerate() {
        assert_eq!(registry.base(leaf, depth), ty);
        assert!(registry.check(leaf, ty));
    }
    // Most basic shared type.
    assert_eq!(registry.common(chain[3], chain[5]), root);

    let other = classed_root(&registry, "Unrelated", 8, TypeFlags::empty());
    assert_eq!(registry.common(leaf, other), TypeId::INVALID);
    assert!(!registry.check(leaf, other));
}

// ============================================================================
// Unregistration
// ============================================================================

#[test]
fn test_unregister_rules() {
    let registry = Registry::new();
    let base = classed_root(&registry, "Unreg", 8, TypeFlags::DERIVABLE);
    let child = derived(&registry, "UnregChild", base, 8);

    assert_eq!(registry.unregister(base).unwrap_err().kind(), ErrorKind::InUse);

    let class = registry.class_ref(child).unwrap();
    assert_eq!(registry.unregister(child).unwrap_err().kind(), ErrorKind::InUse);
    drop(class);

    registry.unregister(child).unwrap();
    registry.unregister(base).unwrap();
    assert_eq!(registry.unregister(base).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(registry.name(base), None);
}

#[test]
fn test_unregister_builtins_unsupported() {
    let registry = Registry::new();
    for ty in [TypeId::PROTOCOL, TypeId::IVARIANT, TypeId::NIL, TypeId::POINTER] {
        assert_eq!(registry.unregister(ty).unwrap_err().kind(), ErrorKind::Unsupported);
    }
}

#[test]
fn test_unregister_drops_converters() {
    let registry = Registry::new();
    let ty = registry
        .register(
            &unique_name("Conv"),
            TypeId::INT32,
            TypeInfo::new().with_class_size(8),
            TypeFlags::empty(),
        )
        .unwrap();
    let before = registry.converter_count();
    registry
        .register_converter(ty, TypeId::STRING, |_, _| Ok(()))
        .unwrap();
    assert_eq!(registry.converter_count(), before + 1);

    registry.unregister(ty).unwrap();
    assert_eq!(registry.converter_count(), before);
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_registry_with_config() {
    let registry = Registry::with_config(RegistryConfig::default().with_initial_capacity(4));
    assert_eq!(registry.count(), TypeId::BUILTIN_COUNT);
    assert_eq!(registry.find("uint64"), TypeId::UINT64);
}

#[test]
fn test_global_registry() {
    let one = Registry::global();
    let two = Registry::global();
    assert!(one.ptr_eq(two));
    assert_eq!(one.find("string"), TypeId::STRING);
}
