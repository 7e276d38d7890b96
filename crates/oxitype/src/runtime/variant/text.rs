//! Text forms of builtin values.
//!
//! Two forms exist. The saved form round-trips through [`load`]: floats use
//! the shortest representation that parses back to the same value and
//! characters are quoted. The rendered form is what conversion to `string`
//! produces: floats with three decimals and characters as bare text.

use crate::error::{Error, Result};
use crate::runtime::variant::primitives::Primitive;
use crate::runtime::variant::value::Value;
use std::fmt::Write as _;

fn malformed(kind: Primitive, text: &str) -> Error {
    Error::conversion(format!("text {text:?}"), kind.name())
}

/// Appends the saved form of a builtin value.
pub(crate) fn save(value: &Value, out: &mut String) -> Result<()> {
    // Writing into a String cannot fail.
    let _ = match value {
        Value::Nil => write!(out, "nil"),
        Value::Bool(v) => write!(out, "{v}"),
        Value::Char(c) => save_char(*c, out),
        Value::U8(v) => write!(out, "{v}"),
        Value::I16(v) => write!(out, "{v}"),
        Value::U16(v) => write!(out, "{v}"),
        Value::I32(v) => write!(out, "{v}"),
        Value::U32(v) => write!(out, "{v}"),
        Value::I64(v) => write!(out, "{v}"),
        Value::U64(v) => write!(out, "{v}"),
        Value::F32(v) => write!(out, "{v}"),
        Value::F64(v) => write!(out, "{v}"),
        Value::Str(v) => write!(out, "{v}"),
        Value::Pointer(v) => write!(out, "{v:#x}"),
        Value::Boxed(_) => return Err(Error::unsupported("save", "boxed value")),
    };
    Ok(())
}

fn save_char(c: u8, out: &mut String) -> std::fmt::Result {
    match c {
        b'\'' => out.write_str("'\\''"),
        b'\\' => out.write_str("'\\\\'"),
        0x20..=0x7e => write!(out, "'{}'", char::from(c)),
        _ => write!(out, "'\\x{c:02x}'"),
    }
}

/// Parses the saved form of a `kind` value.
pub(crate) fn load(kind: Primitive, text: &str) -> Result<Value> {
    let trimmed = text.trim();
    let bad = || malformed(kind, text);
    let value = match kind {
        Primitive::Nil => {
            if trimmed != "nil" {
                return Err(bad());
            }
            Value::Nil
        }
        Primitive::Bool => Value::Bool(parse_bool_word(trimmed).ok_or_else(bad)?),
        Primitive::Char => Value::Char(load_char(trimmed).ok_or_else(bad)?),
        Primitive::U8 => Value::U8(trimmed.parse().map_err(|_| bad())?),
        Primitive::I16 => Value::I16(trimmed.parse().map_err(|_| bad())?),
        Primitive::U16 => Value::U16(trimmed.parse().map_err(|_| bad())?),
        Primitive::I32 => Value::I32(trimmed.parse().map_err(|_| bad())?),
        Primitive::U32 => Value::U32(trimmed.parse().map_err(|_| bad())?),
        Primitive::I64 => Value::I64(trimmed.parse().map_err(|_| bad())?),
        Primitive::U64 => Value::U64(trimmed.parse().map_err(|_| bad())?),
        Primitive::F32 => Value::F32(trimmed.parse().map_err(|_| bad())?),
        Primitive::F64 => Value::F64(trimmed.parse().map_err(|_| bad())?),
        Primitive::Pointer => Value::Pointer(parse_address(trimmed).ok_or_else(bad)?),
        Primitive::Str => Value::Str(text.to_owned()),
    };
    Ok(value)
}

fn load_char(text: &str) -> Option<u8> {
    let inner = text.strip_prefix('\'')?.strip_suffix('\'')?;
    match inner.as_bytes() {
        [c] if *c != b'\\' => Some(*c),
        [b'\\', b'\\'] => Some(b'\\'),
        [b'\\', b'\''] => Some(b'\''),
        [b'\\', b'x', ..] => u8::from_str_radix(&inner[2..], 16).ok(),
        _ => None,
    }
}

/// `true`/`false` in any case.
pub(crate) fn parse_bool_word(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Hex with a `0x` prefix, decimal otherwise.
pub(crate) fn parse_address(text: &str) -> Option<usize> {
    match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// The form a value takes when converted to `string`.
pub(crate) fn render(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Nil => "nil".to_owned(),
        Value::Bool(v) => v.to_string(),
        Value::Char(0) => String::new(),
        Value::Char(c) => char::from(*c).to_string(),
        Value::U8(v) => v.to_string(),
        Value::I16(v) => v.to_string(),
        Value::U16(v) => v.to_string(),
        Value::I32(v) => v.to_string(),
        Value::U32(v) => v.to_string(),
        Value::I64(v) => v.to_string(),
        Value::U64(v) => v.to_string(),
        Value::F32(v) => format!("{v:.3}"),
        Value::F64(v) => format!("{v:.3}"),
        Value::Str(v) => v.clone(),
        Value::Pointer(v) => format!("{v:#x}"),
        Value::Boxed(_) => return Err(Error::conversion("boxed value", "string")),
    })
}
