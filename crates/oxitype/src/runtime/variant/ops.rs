//! Per-type variant operation tables.

use crate::error::{Error, Result};
use crate::runtime::types::TypeId;
use crate::runtime::variant::value::Value;
use bitflags::bitflags;
use std::cmp::Ordering;

bitflags! {
    /// Operations a [`VariantOps`] table supports.
    ///
    /// The variant layer consults these before dispatching; a method whose
    /// flag is clear is never called.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpsFlags: u32 {
        /// Copy and move may be a plain clone of the payload.
        const RELOCATABLE          = 0x1;
        const CONSTRUCT_DEFAULT    = 0x2;
        const CONSTRUCT_COPY       = 0x4;
        const CONSTRUCT_MOVE       = 0x8;
        const CONSTRUCT_VALUE_COPY = 0x10;
        const CONSTRUCT_VALUE_MOVE = 0x20;
        const SET_COPY             = 0x40;
        const SET_MOVE             = 0x80;
        const SET_VALUE_COPY       = 0x100;
        const SET_VALUE_MOVE       = 0x200;
        const GET_VALUE_COPY       = 0x400;
        const GET_VALUE_PEEK       = 0x800;
        const GET_VALUE_MOVE       = 0x1000;
        const COMPARE              = 0x2000;
        const SAVE                 = 0x4000;
        const LOAD                 = 0x8000;
        /// The type carries no payload.
        const VALUELESS            = 0x40000;
    }
}

fn unsupported<T: ?Sized>(operation: &'static str) -> Error {
    Error::unsupported(operation, std::any::type_name::<T>())
}

/// Operation table of a variant-compatible type.
///
/// Registered through [`TypeInfo::with_variant_ops`](crate::TypeInfo::with_variant_ops)
/// and inherited by derived types. Every method defaults to `Unsupported`;
/// implement those named by [`flags`](VariantOps::flags).
///
/// "Copy" methods read from a variant of the same type. "Value" methods
/// accept the type's native payload.
///
/// # Example
///
/// ```rust
/// use oxitype::{OpsFlags, Registry, TypeFlags, TypeId, TypeInfo, Value, Variant, VariantOps};
/// use std::cmp::Ordering;
/// use std::sync::Arc;
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Celsius(f64);
///
/// struct CelsiusOps;
///
/// impl VariantOps for CelsiusOps {
///     fn flags(&self) -> OpsFlags {
///         OpsFlags::RELOCATABLE
///             | OpsFlags::CONSTRUCT_DEFAULT
///             | OpsFlags::SET_VALUE_COPY
///             | OpsFlags::GET_VALUE_PEEK
///             | OpsFlags::COMPARE
///     }
///
///     fn construct_default(&self, _ty: TypeId) -> oxitype::Result<Value> {
///         Ok(Value::boxed(Celsius(0.0)))
///     }
///
///     fn set_value_copy(&self, dst: &mut Value, value: &Value) -> oxitype::Result<()> {
///         *dst = value.clone();
///         Ok(())
///     }
///
///     fn get_value_peek<'a>(&self, src: &'a Value) -> oxitype::Result<&'a Value> {
///         Ok(src)
///     }
///
///     fn compare(&self, a: &Value, b: &Value) -> oxitype::Result<Ordering> {
///         let a = a.downcast_ref::<Celsius>().map_or(0.0, |c| c.0);
///         let b = b.downcast_ref::<Celsius>().map_or(0.0, |c| c.0);
///         Ok(a.total_cmp(&b))
///     }
/// }
///
/// let registry = Registry::new();
/// let celsius = registry
///     .register(
///         "Celsius",
///         TypeId::STATIC_CLASS,
///         TypeInfo::new()
///             .with_class_size(16)
///             .with_interface(TypeId::IVARIANT, 8)
///             .with_variant_ops(Arc::new(CelsiusOps)),
///         TypeFlags::empty(),
///     )
///     .unwrap();
///
/// let warm = Variant::construct_value_copy(&registry, celsius, &Value::boxed(Celsius(21.5))).unwrap();
/// let copy = Variant::construct_copy(&warm).unwrap();
/// assert_eq!(warm.compare(&registry, &copy).unwrap(), Ordering::Equal);
/// ```
#[allow(unused_variables)]
pub trait VariantOps: Send + Sync {
    fn flags(&self) -> OpsFlags;

    /// The type's zero value.
    fn construct_default(&self, ty: TypeId) -> Result<Value> {
        Err(unsupported::<Self>("construct_default"))
    }

    fn construct_copy(&self, src: &Value) -> Result<Value> {
        Err(unsupported::<Self>("construct_copy"))
    }

    /// Takes the payload out of `src`, leaving the type's zero value behind.
    fn construct_move(&self, src: &mut Value) -> Result<Value> {
        Err(unsupported::<Self>("construct_move"))
    }

    fn construct_value_copy(&self, value: &Value) -> Result<Value> {
        Err(unsupported::<Self>("construct_value_copy"))
    }

    fn construct_value_move(&self, value: Value) -> Result<Value> {
        Err(unsupported::<Self>("construct_value_move"))
    }

    /// Releases anything the payload holds outside Rust ownership.
    fn destruct(&self, value: &mut Value) -> Result<()> {
        Ok(())
    }

    fn set_copy(&self, dst: &mut Value, src: &Value) -> Result<()> {
        Err(unsupported::<Self>("set_copy"))
    }

    fn set_move(&self, dst: &mut Value, src: &mut Value) -> Result<()> {
        Err(unsupported::<Self>("set_move"))
    }

    fn set_value_copy(&self, dst: &mut Value, value: &Value) -> Result<()> {
        Err(unsupported::<Self>("set_value_copy"))
    }

    fn set_value_move(&self, dst: &mut Value, value: Value) -> Result<()> {
        Err(unsupported::<Self>("set_value_move"))
    }

    fn get_value_copy(&self, src: &Value) -> Result<Value> {
        Err(unsupported::<Self>("get_value_copy"))
    }

    /// Borrows the payload; valid until the variant is next modified.
    fn get_value_peek<'a>(&self, src: &'a Value) -> Result<&'a Value> {
        Err(unsupported::<Self>("get_value_peek"))
    }

    fn get_value_move(&self, src: &mut Value) -> Result<Value> {
        Err(unsupported::<Self>("get_value_move"))
    }

    fn compare(&self, a: &Value, b: &Value) -> Result<Ordering> {
        Err(unsupported::<Self>("compare"))
    }

    /// Appends the text form of `value` to `out`.
    fn save(&self, value: &Value, out: &mut String) -> Result<()> {
        Err(unsupported::<Self>("save"))
    }

    /// Replaces `value` with the one parsed from `text`.
    fn load(&self, value: &mut Value, text: &str) -> Result<()> {
        Err(unsupported::<Self>("load"))
    }
}
