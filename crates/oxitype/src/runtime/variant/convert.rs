//! The converter table and the builtin conversions.
//!
//! Converters are keyed by `(from, to)`. Lookup walks both types' parent
//! chains, nearest first, so a converter registered for a base type also
//! serves every type derived from it.

use crate::error::{Error, Result};
use crate::runtime::registry::Registry;
use crate::runtime::types::TypeId;
use crate::runtime::variant::Variant;
use crate::runtime::variant::primitives::Primitive;
use crate::runtime::variant::text;
use crate::runtime::variant::value::Value;
use oxitype_log::{debug, warn};
use smallvec::SmallVec;
use std::sync::Arc;

/// Converts `src` into the pre-typed destination variant.
pub type ConverterFn = Arc<dyn Fn(&Variant, &mut Variant) -> Result<()> + Send + Sync>;

impl Registry {
    /// Registers a converter from `from` to `to`, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if either type is not registered.
    ///
    /// # Example
    ///
    /// ```rust
    /// use oxitype::{Registry, TypeFlags, TypeId, TypeInfo, Value, Variant};
    ///
    /// let registry = Registry::new();
    /// let meters = registry
    ///     .register("meters", TypeId::DOUBLE, TypeInfo::new().with_class_size(8), TypeFlags::empty())
    ///     .unwrap();
    /// registry
    ///     .register_converter(meters, TypeId::INT32, |src, dst| {
    ///         let m = src.as_f64()?;
    ///         dst.set_value_move(Value::I32((m * 100.0) as i32))
    ///     })
    ///     .unwrap();
    ///
    /// let length = Variant::construct_value_copy(&registry, meters, &Value::F64(1.25)).unwrap();
    /// let mut centimeters = Variant::construct_default(&registry, TypeId::INT32).unwrap();
    /// length.convert(&registry, &mut centimeters).unwrap();
    /// assert_eq!(centimeters.as_i32().unwrap(), 125);
    /// ```
    pub fn register_converter<F>(&self, from: TypeId, to: TypeId, converter: F) -> Result<()>
    where
        F: Fn(&Variant, &mut Variant) -> Result<()> + Send + Sync + 'static,
    {
        let (from_name, to_name) = {
            let table = self.inner.table.read();
            let name = |ty: TypeId| {
                table
                    .get(ty)
                    .map(|m| m.name)
                    .ok_or_else(|| Error::not_found(format!("type {ty}")))
            };
            (name(from)?, name(to)?)
        };

        let previous = self
            .inner
            .converters
            .write()
            .insert((from, to), Arc::new(converter));
        if previous.is_some() {
            warn!("replaced converter from '{from_name}' to '{to_name}'");
        }
        debug!("registered converter from '{from_name}' to '{to_name}'");
        Ok(())
    }

    /// Removes the converter registered for exactly `(from, to)`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if there is none.
    pub fn unregister_converter(&self, from: TypeId, to: TypeId) -> Result<()> {
        match self.inner.converters.write().remove(&(from, to)) {
            Some(_) => Ok(()),
            None => Err(Error::not_found(format!("converter from {from} to {to}"))),
        }
    }

    /// Number of registered converters, builtin ones included.
    #[must_use]
    pub fn converter_count(&self) -> usize {
        self.inner.converters.read().len()
    }

    /// Returns true if a value of `from` can be converted to `to`, either
    /// because `from` is compatible with `to` or through a converter.
    #[must_use]
    pub fn can_convert(&self, from: TypeId, to: TypeId) -> bool {
        self.check(from, to) || self.find_converter(from, to).is_some()
    }

    /// The nearest converter over both parent chains.
    pub(crate) fn find_converter(&self, from: TypeId, to: TypeId) -> Option<ConverterFn> {
        let (sources, targets) = {
            let table = self.inner.table.read();
            let chain = |ty: TypeId| {
                let mut out = SmallVec::<[TypeId; 8]>::new();
                let mut level = table.get(ty);
                while let Some(meta) = level {
                    out.push(meta.id);
                    level = table.get(meta.parent);
                }
                out
            };
            (chain(from), chain(to))
        };

        let converters = self.inner.converters.read();
        sources.iter().find_map(|&source| {
            targets
                .iter()
                .find_map(|&target| converters.get(&(source, target)).cloned())
        })
    }
}

/// Installs the conversions between builtin types.
pub(crate) fn register_builtin_converters(registry: &Registry) {
    let mut converters = registry.inner.converters.write();
    for from in Primitive::ALL {
        for to in Primitive::ALL {
            if from == to || !builtin_pair(from, to) {
                continue;
            }
            let converter: ConverterFn = Arc::new(move |src: &Variant, dst: &mut Variant| {
                let value = convert_value(src.payload(), to)?;
                dst.set_value_move(value)
            });
            converters.insert((from.type_id(), to.type_id()), converter);
        }
    }
}

fn builtin_pair(from: Primitive, to: Primitive) -> bool {
    match to {
        Primitive::Nil => false,
        Primitive::Pointer => false,
        Primitive::Bool | Primitive::Str => true,
        Primitive::Char | Primitive::F32 | Primitive::F64 => from != Primitive::Pointer,
        _ => true,
    }
}

/// Numeric view of a builtin payload.
#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i128),
    Float(f64),
}

impl Number {
    fn of(value: &Value, to: Primitive) -> Result<Number> {
        Ok(match value {
            Value::Nil => Number::Int(0),
            Value::Bool(v) => Number::Int(i128::from(*v)),
            Value::Char(v) | Value::U8(v) => Number::Int(i128::from(*v)),
            Value::I16(v) => Number::Int(i128::from(*v)),
            Value::U16(v) => Number::Int(i128::from(*v)),
            Value::I32(v) => Number::Int(i128::from(*v)),
            Value::U32(v) => Number::Int(i128::from(*v)),
            Value::I64(v) => Number::Int(i128::from(*v)),
            Value::U64(v) => Number::Int(i128::from(*v)),
            Value::F32(v) => Number::Float(f64::from(*v)),
            Value::F64(v) => Number::Float(*v),
            Value::Pointer(v) => Number::Int(*v as i128),
            Value::Str(s) => {
                let trimmed = s.trim();
                if let Ok(n) = trimmed.parse::<i128>() {
                    Number::Int(n)
                } else if let Ok(f) = trimmed.parse::<f64>() {
                    Number::Float(f)
                } else {
                    return Err(Error::conversion(format!("string {s:?}"), to.name()));
                }
            }
            Value::Boxed(_) => return Err(Error::conversion("boxed value", to.name())),
        })
    }

    fn is_truthy(self) -> bool {
        match self {
            Number::Int(n) => n != 0,
            Number::Float(f) => f != 0.0 && !f.is_nan(),
        }
    }
}

// Integer sources wrap. Float sources saturate at the target's bounds, and NaN
// becomes zero.
macro_rules! cast {
    ($number:expr, $ty:ty) => {
        match $number {
            Number::Int(n) => n as $ty,
            Number::Float(f) => f as $ty,
        }
    };
}

/// Converts a builtin payload to the `to` representation.
///
/// Narrowing integer conversions truncate. Floats converted to an integer
/// drop the fraction and saturate at the target's range; NaN converts to 0.
pub(crate) fn convert_value(value: &Value, to: Primitive) -> Result<Value> {
    Ok(match to {
        Primitive::Str => Value::Str(text::render(value)?),
        Primitive::Bool => Value::Bool(match value {
            Value::Str(s) => string_to_bool(s)?,
            other => Number::of(other, to)?.is_truthy(),
        }),
        Primitive::Char => Value::Char(match value {
            Value::Str(s) => string_to_char(s)?,
            other => cast!(Number::of(other, to)?, u8),
        }),
        Primitive::U8 => Value::U8(cast!(Number::of(value, to)?, u8)),
        Primitive::I16 => Value::I16(cast!(Number::of(value, to)?, i16)),
        Primitive::U16 => Value::U16(cast!(Number::of(value, to)?, u16)),
        Primitive::I32 => Value::I32(cast!(Number::of(value, to)?, i32)),
        Primitive::U32 => Value::U32(cast!(Number::of(value, to)?, u32)),
        Primitive::I64 => Value::I64(cast!(Number::of(value, to)?, i64)),
        Primitive::U64 => Value::U64(cast!(Number::of(value, to)?, u64)),
        Primitive::F32 => Value::F32(cast!(Number::of(value, to)?, f32)),
        Primitive::F64 => Value::F64(cast!(Number::of(value, to)?, f64)),
        Primitive::Pointer => Value::Pointer(cast!(Number::of(value, to)?, usize)),
        Primitive::Nil => return Err(Error::unsupported("convert", "nil")),
    })
}

fn string_to_bool(s: &str) -> Result<bool> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(false);
    }
    if let Some(word) = text::parse_bool_word(trimmed) {
        return Ok(word);
    }
    Ok(Number::of(&Value::Str(trimmed.to_owned()), Primitive::Bool)?.is_truthy())
}

fn string_to_char(s: &str) -> Result<u8> {
    match s.as_bytes() {
        [] => Ok(0),
        [c] => Ok(*c),
        _ => Err(Error::conversion(format!("string {s:?}"), "char")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_float_to_integer_saturates() {
        assert_eq!(convert_value(&Value::F64(2.9), Primitive::I16), Ok(Value::I16(2)));
        assert_eq!(convert_value(&Value::F64(-2.9), Primitive::I16), Ok(Value::I16(-2)));
        assert_eq!(convert_value(&Value::F64(1e20), Primitive::I32), Ok(Value::I32(i32::MAX)));
        assert_eq!(convert_value(&Value::F64(-1e20), Primitive::I32), Ok(Value::I32(i32::MIN)));
        assert_eq!(convert_value(&Value::F64(-3.7), Primitive::U8), Ok(Value::U8(0)));
        assert_eq!(
            convert_value(&Value::F64(f64::INFINITY), Primitive::U16),
            Ok(Value::U16(u16::MAX))
        );
        assert_eq!(
            convert_value(&Value::F32(f32::NEG_INFINITY), Primitive::U64),
            Ok(Value::U64(0))
        );
        assert_eq!(convert_value(&Value::F32(f32::NAN), Primitive::I64), Ok(Value::I64(0)));
        assert_eq!(
            convert_value(&Value::Str("1e20".into()), Primitive::U32),
            Ok(Value::U32(u32::MAX))
        );
        // Integer sources keep wrapping.
        assert_eq!(convert_value(&Value::I64(-1), Primitive::U8), Ok(Value::U8(u8::MAX)));
    }

    #[test]
    fn test_numeric_narrowing_truncates() {
        assert_eq!(convert_value(&Value::U16(0x1234), Primitive::U8), Ok(Value::U8(0x34)));
        assert_eq!(convert_value(&Value::I32(-1), Primitive::U16), Ok(Value::U16(u16::MAX)));
        assert_eq!(convert_value(&Value::F64(3.9), Primitive::I32), Ok(Value::I32(3)));
        assert_eq!(convert_value(&Value::U64(u64::MAX), Primitive::I64), Ok(Value::I64(-1)));
    }

    #[test]
    fn test_to_bool() {
        assert_eq!(convert_value(&Value::F32(f32::NAN), Primitive::Bool), Ok(Value::Bool(false)));
        assert_eq!(convert_value(&Value::I16(-3), Primitive::Bool), Ok(Value::Bool(true)));
        assert_eq!(convert_value(&Value::Str("TRUE".into()), Primitive::Bool), Ok(Value::Bool(true)));
        assert_eq!(convert_value(&Value::Str(String::new()), Primitive::Bool), Ok(Value::Bool(false)));
        assert_eq!(convert_value(&Value::Str("0.5".into()), Primitive::Bool), Ok(Value::Bool(true)));
        assert_eq!(
            convert_value(&Value::Str("maybe".into()), Primitive::Bool)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidConversion
        );
    }

    #[test]
    fn test_string_to_char_lengths() {
        assert_eq!(convert_value(&Value::Str(String::new()), Primitive::Char), Ok(Value::Char(0)));
        assert_eq!(convert_value(&Value::Str("q".into()), Primitive::Char), Ok(Value::Char(b'q')));
        assert_eq!(
            convert_value(&Value::Str("qq".into()), Primitive::Char)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidConversion
        );
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(convert_value(&Value::Str(" 42 ".into()), Primitive::I64), Ok(Value::I64(42)));
        assert_eq!(convert_value(&Value::Str("2.5".into()), Primitive::F32), Ok(Value::F32(2.5)));
        assert!(convert_value(&Value::Str("x1".into()), Primitive::U8).is_err());
    }

    #[test]
    fn test_nil_source() {
        assert_eq!(convert_value(&Value::Nil, Primitive::I32), Ok(Value::I32(0)));
        assert_eq!(convert_value(&Value::Nil, Primitive::Str), Ok(Value::Str("nil".into())));
    }

    #[test]
    fn test_builtin_pairs() {
        assert!(builtin_pair(Primitive::Pointer, Primitive::U64));
        assert!(builtin_pair(Primitive::Pointer, Primitive::Str));
        assert!(!builtin_pair(Primitive::Pointer, Primitive::F64));
        assert!(!builtin_pair(Primitive::U8, Primitive::Nil));
        assert!(builtin_pair(Primitive::Nil, Primitive::Bool));
    }

    #[test]
    fn test_registry_converter_table() {
        let registry = Registry::new();
        let builtin = registry.converter_count();
        assert!(builtin > 0);
        assert!(registry.can_convert(TypeId::UINT8, TypeId::STRING));
        assert!(!registry.can_convert(TypeId::STRING, TypeId::NIL));

        registry
            .register_converter(TypeId::NIL, TypeId::POINTER, |_, dst| {
                dst.set_value_move(Value::Pointer(0))
            })
            .unwrap();
        assert_eq!(registry.converter_count(), builtin + 1);
        registry
            .unregister_converter(TypeId::NIL, TypeId::POINTER)
            .unwrap();
        assert_eq!(
            registry
                .unregister_converter(TypeId::NIL, TypeId::POINTER)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            registry
                .register_converter(TypeId::INVALID, TypeId::POINTER, |_, _| Ok(()))
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }
}
