//! Enumeration, flags and opaque types through the registry.
//!
//! Run with: `cargo test --test enum_test`

mod common;

use common::unique_name;
use oxitype::{EntryKind, EnumEntry, ErrorKind, Registry, TypeId, Value, Variant};
use std::cmp::Ordering;
use std::sync::Arc;

const SHADES: &[EnumEntry] = &[
    EnumEntry::new(3, "Light", "l"),
    EnumEntry::new(7, "Medium", "m"),
    EnumEntry::new(300, "Dark", "d"),
];

const STYLE: &[EnumEntry] = &[
    EnumEntry::new(0, "Plain", ""),
    EnumEntry::new(1, "Bold", "b"),
    EnumEntry::new(2, "Italic", "i"),
    EnumEntry::new(4, "Underline", "u"),
];

fn shade(registry: &Registry, value: u32) -> Variant {
    let ty = registry.find("Shade");
    Variant::construct_value_copy(registry, ty, &Value::U32(value)).unwrap()
}

// ============================================================================
// Enumerations
// ============================================================================

#[test]
fn test_enum_registration() {
    let registry = Registry::new();
    let ty = registry.register_enum("Shade", SHADES).unwrap();

    assert_eq!(registry.parent(ty), TypeId::ENUM);
    assert!(registry.check(ty, TypeId::IVARIANT));

    let table = registry.entry_table(ty).unwrap();
    assert_eq!(table.kind(), EntryKind::Enum);
    assert_eq!((table.min(), table.max()), (3, 300));
    assert_eq!(table.entries().len(), 3);
    assert!(registry.entry_table(TypeId::UINT32).is_none());

    assert_eq!(
        registry.register_enum("Shade", SHADES).unwrap_err().kind(),
        ErrorKind::DuplicateName
    );
    assert_eq!(
        registry.register_enum(&unique_name("Empty"), &[]).unwrap_err().kind(),
        ErrorKind::InvalidType
    );
}

#[test]
fn test_enum_variant_defaults_and_checks() {
    let registry = Registry::new();
    let ty = registry.register_enum("Shade", SHADES).unwrap();

    let mut v = Variant::construct_default(&registry, ty).unwrap();
    assert_eq!(v.as_u32().unwrap(), 3);

    v.set_value_copy(&Value::U32(300)).unwrap();
    assert_eq!(v.as_u32().unwrap(), 300);
    assert_eq!(
        v.set_value_copy(&Value::U32(4)).unwrap_err().kind(),
        ErrorKind::InvalidConversion
    );
    assert_eq!(v.as_u32().unwrap(), 300);

    let err = Variant::construct_value_copy(&registry, ty, &Value::U32(8)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConversion);

    // The abstract base has no operation table of its own.
    let err = Variant::construct_default(&registry, TypeId::ENUM).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidType);
}

#[test]
fn test_enum_save_and_load() {
    let registry = Registry::new();
    registry.register_enum("Shade", SHADES).unwrap();

    let mut v = shade(&registry, 7);
    assert_eq!(v.save_to_string().unwrap(), "Medium");

    v.load(" d ").unwrap();
    assert_eq!(v.as_u32().unwrap(), 300);
    v.load("Light").unwrap();
    assert_eq!(v.as_u32().unwrap(), 3);

    assert_eq!(v.load("Pitch").unwrap_err().kind(), ErrorKind::InvalidConversion);
    assert_eq!(v.as_u32().unwrap(), 3);
}

#[test]
fn test_enum_conversions() {
    let registry = Registry::new();
    let ty = registry.register_enum("Shade", SHADES).unwrap();
    let dark = shade(&registry, 300);

    assert_eq!(dark.to_string(&registry).unwrap(), "Dark");
    assert!(dark.to_bool(&registry).unwrap());
    assert_eq!(dark.to_u16(&registry).unwrap(), 300);
    assert_eq!(dark.to_i64(&registry).unwrap(), 300);
    assert_eq!(
        dark.to_u8(&registry).unwrap_err().kind(),
        ErrorKind::InvalidConversion
    );
    assert_eq!(shade(&registry, 7).to_u8(&registry).unwrap(), 7);
    assert_eq!(
        dark.to_f64(&registry).unwrap_err().kind(),
        ErrorKind::InvalidConversion
    );

    let mut target = Variant::construct_default(&registry, ty).unwrap();
    Variant::from("m").convert(&registry, &mut target).unwrap();
    assert_eq!(target.as_u32().unwrap(), 7);
    assert_eq!(
        Variant::from("Navy").convert(&registry, &mut target).unwrap_err().kind(),
        ErrorKind::InvalidConversion
    );
    assert!(registry.can_convert(TypeId::STRING, ty));
    assert!(!registry.can_convert(TypeId::DOUBLE, ty));
}

#[test]
fn test_enum_compares_by_value() {
    let registry = Registry::new();
    registry.register_enum("Shade", SHADES).unwrap();

    let light = shade(&registry, 3);
    let dark = shade(&registry, 300);
    assert_eq!(light.compare(&registry, &dark).unwrap(), Ordering::Less);
    assert!(dark.equals(&registry, &Variant::from(300u32)).unwrap());
    assert!(dark.equals(&registry, &Variant::from("Dark")).unwrap());
    assert!(!light.equals(&registry, &Variant::from("Dark")).unwrap());
}

#[test]
fn test_unregister_enum_drops_table_and_converters() {
    let registry = Registry::new();
    let before = registry.converter_count();
    let ty = registry.register_enum("Shade", SHADES).unwrap();
    assert!(registry.converter_count() > before);

    registry.unregister(ty).unwrap();
    assert!(registry.entry_table(ty).is_none());
    assert_eq!(registry.converter_count(), before);
    assert_eq!(registry.find("Shade"), TypeId::INVALID);

    // The name is free again.
    registry.register_enum("Shade", SHADES).unwrap();
}

// ============================================================================
// Flags
// ============================================================================

#[test]
fn test_flags_variants() {
    let registry = Registry::new();
    let ty = registry.register_flags("Style", STYLE).unwrap();
    assert_eq!(registry.parent(ty), TypeId::FLAGS);
    assert_eq!(registry.entry_table(ty).unwrap().mask(), 0b111);

    let mut v = Variant::construct_default(&registry, ty).unwrap();
    assert_eq!(v.as_u32().unwrap(), 0);
    assert_eq!(v.save_to_string().unwrap(), "Plain");

    v.set_value_copy(&Value::U32(0b101)).unwrap();
    assert_eq!(v.save_to_string().unwrap(), "Bold|Underline");
    assert_eq!(v.to_string(&registry).unwrap(), "Bold|Underline");
    assert_eq!(
        v.set_value_copy(&Value::U32(0b1000)).unwrap_err().kind(),
        ErrorKind::InvalidConversion
    );

    v.load("i|b").unwrap();
    assert_eq!(v.as_u32().unwrap(), 0b011);
    v.load("").unwrap();
    assert_eq!(v.as_u32().unwrap(), 0);
    assert_eq!(v.load("Bold|Strike").unwrap_err().kind(), ErrorKind::InvalidConversion);

    let mut target = Variant::construct_default(&registry, ty).unwrap();
    Variant::from("Italic | Underline")
        .convert(&registry, &mut target)
        .unwrap();
    assert_eq!(target.to_u8(&registry).unwrap(), 0b110);
}

// ============================================================================
// Opaque types
// ============================================================================

#[derive(Debug)]
struct Session {
    user: String,
}

#[test]
fn test_opaque_variants_share_payload() {
    let registry = Registry::new();
    let ty = registry.register_opaque::<Session>("Session").unwrap();
    assert_eq!(registry.parent(ty), TypeId::OPAQUE);

    let session = Arc::new(Session {
        user: "ada".into(),
    });
    let a = Variant::from_opaque(&registry, ty, Arc::clone(&session)).unwrap();
    let mut b = Variant::construct_default(&registry, ty).unwrap();
    assert!(b.as_opaque::<Session>().unwrap().is_none());
    assert!(!b.to_bool(&registry).unwrap());

    b.set_copy(&a).unwrap();
    assert_eq!(Arc::strong_count(&session), 3);
    assert!(a.equals(&registry, &b).unwrap());
    assert_eq!(b.as_opaque::<Session>().unwrap().unwrap().user, "ada");

    let other = Variant::from_opaque(&registry, ty, Arc::new(Session { user: "bob".into() })).unwrap();
    assert!(!a.equals(&registry, &other).unwrap());

    drop((a, b));
    assert_eq!(Arc::strong_count(&session), 1);
}

#[test]
fn test_opaque_conversions() {
    let registry = Registry::new();
    let ty = registry.register_opaque::<Session>("Session").unwrap();
    let session = Arc::new(Session {
        user: "eve".into(),
    });
    let address = Arc::as_ptr(&session) as usize;
    let v = Variant::from_opaque(&registry, ty, session).unwrap();

    assert!(v.to_bool(&registry).unwrap());
    assert_eq!(v.to_pointer(&registry).unwrap(), address);
    assert_eq!(v.to_string(&registry).unwrap(), format!("{address:#x}"));
    assert_eq!(v.save_to_string().unwrap(), format!("{address:#x}"));

    let mut cleared = Variant::construct_copy(&v).unwrap();
    Variant::nil().convert(&registry, &mut cleared).unwrap();
    assert!(cleared.as_opaque::<Session>().unwrap().is_none());

    let mut loaded = Variant::construct_copy(&v).unwrap();
    assert_eq!(loaded.load("0x0").unwrap_err().kind(), ErrorKind::Unsupported);
}

#[test]
fn test_opaque_rejects_foreign_payload() {
    let registry = Registry::new();
    let ty = registry.register_opaque::<Session>("Session").unwrap();

    let err = Variant::from_opaque(&registry, ty, Arc::new(5u64)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidType);

    let v = Variant::from_opaque(&registry, ty, Arc::new(Session { user: String::new() })).unwrap();
    assert_eq!(v.as_opaque::<u64>().unwrap_err().kind(), ErrorKind::InvalidType);
    assert_eq!(
        Variant::from(1u8).as_opaque::<Session>().unwrap_err().kind(),
        ErrorKind::InvalidType
    );
}
