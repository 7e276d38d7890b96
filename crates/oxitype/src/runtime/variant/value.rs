//! Variant payloads.

use std::any::Any;
use std::fmt;

/// Payload of a user-defined variant type.
///
/// Implemented for every `Clone + Debug + Send + Sync + 'static` type, so user
/// types only need to pick a Rust representation and write a
/// [`VariantOps`](super::VariantOps) for it.
pub trait BoxedValue: Any + Send + Sync + fmt::Debug {
    /// Clones the payload behind a fresh box.
    fn clone_boxed(&self) -> Box<dyn BoxedValue>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T> BoxedValue for T
where
    T: Any + Clone + Send + Sync + fmt::Debug,
{
    fn clone_boxed(&self) -> Box<dyn BoxedValue> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The payload carried by a [`Variant`](super::Variant).
///
/// Builtin types use the scalar arms; user types carry a [`BoxedValue`].
#[derive(Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    /// A single byte character.
    Char(u8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    /// An opaque address-sized value.
    Pointer(usize),
    Boxed(Box<dyn BoxedValue>),
}

impl Value {
    /// Boxes a user payload.
    pub fn boxed<T: BoxedValue>(value: T) -> Value {
        Value::Boxed(Box::new(value))
    }

    /// Borrows a boxed payload as `T`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Value::Boxed(b) => (**b).as_any().downcast_ref(),
            _ => None,
        }
    }

    /// Mutably borrows a boxed payload as `T`.
    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        match self {
            Value::Boxed(b) => (**b).as_any_mut().downcast_mut(),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Short name of the arm, for diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Char(_) => "char",
            Value::U8(_) => "uint8",
            Value::I16(_) => "int16",
            Value::U16(_) => "uint16",
            Value::I32(_) => "int32",
            Value::U32(_) => "uint32",
            Value::I64(_) => "int64",
            Value::U64(_) => "uint64",
            Value::F32(_) => "float",
            Value::F64(_) => "double",
            Value::Str(_) => "string",
            Value::Pointer(_) => "pointer",
            Value::Boxed(_) => "boxed",
        }
    }
}

impl Clone for Value {
    fn clone(&self) -> Self {
        match self {
            Value::Nil => Value::Nil,
            Value::Bool(v) => Value::Bool(*v),
            Value::Char(v) => Value::Char(*v),
            Value::U8(v) => Value::U8(*v),
            Value::I16(v) => Value::I16(*v),
            Value::U16(v) => Value::U16(*v),
            Value::I32(v) => Value::I32(*v),
            Value::U32(v) => Value::U32(*v),
            Value::I64(v) => Value::I64(*v),
            Value::U64(v) => Value::U64(*v),
            Value::F32(v) => Value::F32(*v),
            Value::F64(v) => Value::F64(*v),
            Value::Str(v) => Value::Str(v.clone()),
            Value::Pointer(v) => Value::Pointer(*v),
            Value::Boxed(b) => Value::Boxed((**b).clone_boxed()),
        }
    }
}

/// Structural equality of the builtin arms. Boxed payloads never compare
/// equal here; their type's `VariantOps::compare` decides.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) | (Value::U8(a), Value::U8(b)) => a == b,
            (Value::I16(a), Value::I16(b)) => a == b,
            (Value::U16(a), Value::U16(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::U32(a), Value::U32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Pointer(a), Value::Pointer(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("Nil"),
            Value::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Value::Char(v) => f.debug_tuple("Char").field(&char::from(*v)).finish(),
            Value::U8(v) => f.debug_tuple("U8").field(v).finish(),
            Value::I16(v) => f.debug_tuple("I16").field(v).finish(),
            Value::U16(v) => f.debug_tuple("U16").field(v).finish(),
            Value::I32(v) => f.debug_tuple("I32").field(v).finish(),
            Value::U32(v) => f.debug_tuple("U32").field(v).finish(),
            Value::I64(v) => f.debug_tuple("I64").field(v).finish(),
            Value::U64(v) => f.debug_tuple("U64").field(v).finish(),
            Value::F32(v) => f.debug_tuple("F32").field(v).finish(),
            Value::F64(v) => f.debug_tuple("F64").field(v).finish(),
            Value::Str(v) => f.debug_tuple("Str").field(v).finish(),
            Value::Pointer(v) => write!(f, "Pointer({v:#x})"),
            Value::Boxed(b) => f.debug_tuple("Boxed").field(b).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_boxed_clone_and_downcast() {
        let mut value = Value::boxed(Point { x: 1, y: 2 });
        let copy = value.clone();
        value.downcast_mut::<Point>().unwrap().x = 10;

        assert_eq!(copy.downcast_ref::<Point>(), Some(&Point { x: 1, y: 2 }));
        assert_eq!(value.downcast_ref::<Point>().unwrap().x, 10);
        assert!(value.downcast_ref::<String>().is_none());
        assert_eq!(value.kind_name(), "boxed");
    }

    #[test]
    fn test_equality() {
        assert_eq!(Value::U8(3), Value::U8(3));
        assert_ne!(Value::U8(3), Value::Char(3));
        assert_ne!(Value::boxed(1u32), Value::boxed(1u32));
        assert_eq!(Value::default(), Value::Nil);
    }

    #[test]
    fn test_debug() {
        assert_eq!(format!("{:?}", Value::Char(b'x')), "Char('x')");
        assert_eq!(format!("{:?}", Value::Pointer(255)), "Pointer(0xff)");
    }
}
