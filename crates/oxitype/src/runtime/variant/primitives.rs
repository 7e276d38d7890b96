//! Operation tables of the builtin scalar and string types.

use crate::error::{Error, Result};
use crate::runtime::types::TypeId;
use crate::runtime::variant::ops::{OpsFlags, VariantOps};
use crate::runtime::variant::text;
use crate::runtime::variant::value::Value;
use std::cmp::Ordering;
use std::sync::{Arc, OnceLock};

/// The builtin variant types, in id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Primitive {
    Nil,
    Bool,
    Char,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Str,
    Pointer,
}

impl Primitive {
    pub(crate) const ALL: [Primitive; 14] = [
        Primitive::Nil,
        Primitive::Bool,
        Primitive::Char,
        Primitive::U8,
        Primitive::I16,
        Primitive::U16,
        Primitive::I32,
        Primitive::U32,
        Primitive::I64,
        Primitive::U64,
        Primitive::F32,
        Primitive::F64,
        Primitive::Str,
        Primitive::Pointer,
    ];

    pub(crate) fn of(ty: TypeId) -> Option<Primitive> {
        let first = TypeId::NIL.index();
        let index = ty.index().checked_sub(first)?;
        Self::ALL.get(index).copied()
    }

    pub(crate) fn of_value(value: &Value) -> Option<Primitive> {
        Some(match value {
            Value::Nil => Primitive::Nil,
            Value::Bool(_) => Primitive::Bool,
            Value::Char(_) => Primitive::Char,
            Value::U8(_) => Primitive::U8,
            Value::I16(_) => Primitive::I16,
            Value::U16(_) => Primitive::U16,
            Value::I32(_) => Primitive::I32,
            Value::U32(_) => Primitive::U32,
            Value::I64(_) => Primitive::I64,
            Value::U64(_) => Primitive::U64,
            Value::F32(_) => Primitive::F32,
            Value::F64(_) => Primitive::F64,
            Value::Str(_) => Primitive::Str,
            Value::Pointer(_) => Primitive::Pointer,
            Value::Boxed(_) => return None,
        })
    }

    pub(crate) fn type_id(self) -> TypeId {
        TypeId::from_index(TypeId::NIL.index() + self as usize)
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Primitive::Nil => "nil",
            Primitive::Bool => "bool",
            Primitive::Char => "char",
            Primitive::U8 => "uint8",
            Primitive::I16 => "int16",
            Primitive::U16 => "uint16",
            Primitive::I32 => "int32",
            Primitive::U32 => "uint32",
            Primitive::I64 => "int64",
            Primitive::U64 => "uint64",
            Primitive::F32 => "float",
            Primitive::F64 => "double",
            Primitive::Str => "string",
            Primitive::Pointer => "pointer",
        }
    }

    pub(crate) fn default_value(self) -> Value {
        match self {
            Primitive::Nil => Value::Nil,
            Primitive::Bool => Value::Bool(false),
            Primitive::Char => Value::Char(0),
            Primitive::U8 => Value::U8(0),
            Primitive::I16 => Value::I16(0),
            Primitive::U16 => Value::U16(0),
            Primitive::I32 => Value::I32(0),
            Primitive::U32 => Value::U32(0),
            Primitive::I64 => Value::I64(0),
            Primitive::U64 => Value::U64(0),
            Primitive::F32 => Value::F32(0.0),
            Primitive::F64 => Value::F64(0.0),
            Primitive::Str => Value::Str(String::new()),
            Primitive::Pointer => Value::Pointer(0),
        }
    }

    pub(crate) fn is_numeric(self) -> bool {
        !matches!(self, Primitive::Nil | Primitive::Str | Primitive::Pointer)
    }

    fn flags(self) -> OpsFlags {
        match self {
            Primitive::Nil => {
                OpsFlags::VALUELESS
                    | OpsFlags::CONSTRUCT_DEFAULT
                    | OpsFlags::COMPARE
                    | OpsFlags::SAVE
                    | OpsFlags::LOAD
            }
            Primitive::Str => {
                OpsFlags::CONSTRUCT_DEFAULT
                    | OpsFlags::CONSTRUCT_COPY
                    | OpsFlags::CONSTRUCT_MOVE
                    | OpsFlags::CONSTRUCT_VALUE_COPY
                    | OpsFlags::CONSTRUCT_VALUE_MOVE
                    | OpsFlags::SET_COPY
                    | OpsFlags::SET_MOVE
                    | OpsFlags::SET_VALUE_COPY
                    | OpsFlags::SET_VALUE_MOVE
                    | OpsFlags::GET_VALUE_COPY
                    | OpsFlags::GET_VALUE_PEEK
                    | OpsFlags::GET_VALUE_MOVE
                    | OpsFlags::COMPARE
                    | OpsFlags::SAVE
                    | OpsFlags::LOAD
            }
            _ => {
                OpsFlags::RELOCATABLE
                    | OpsFlags::CONSTRUCT_DEFAULT
                    | OpsFlags::SET_VALUE_COPY
                    | OpsFlags::GET_VALUE_COPY
                    | OpsFlags::GET_VALUE_PEEK
                    | OpsFlags::COMPARE
                    | OpsFlags::SAVE
                    | OpsFlags::LOAD
            }
        }
    }
}

/// Shared operation table of one builtin type.
pub(crate) struct PrimitiveOps {
    kind: Primitive,
}

/// The builtin operation table for `kind`.
pub(crate) fn builtin_ops(kind: Primitive) -> Arc<dyn VariantOps> {
    static TABLES: OnceLock<Vec<Arc<dyn VariantOps>>> = OnceLock::new();
    let tables = TABLES.get_or_init(|| {
        Primitive::ALL
            .iter()
            .map(|&kind| Arc::new(PrimitiveOps { kind }) as Arc<dyn VariantOps>)
            .collect()
    });
    Arc::clone(&tables[kind as usize])
}

impl PrimitiveOps {
    fn require(&self, flag: OpsFlags, operation: &'static str) -> Result<()> {
        if self.kind.flags().contains(flag) {
            Ok(())
        } else {
            Err(Error::unsupported(operation, self.kind.name()))
        }
    }

    fn expect_kind(&self, value: &Value) -> Result<()> {
        if Primitive::of_value(value) == Some(self.kind) {
            Ok(())
        } else {
            Err(Error::invalid_type(format!(
                "expected a {} payload, got {}",
                self.kind.name(),
                value.kind_name()
            )))
        }
    }

    fn take(&self, src: &mut Value) -> Result<Value> {
        self.expect_kind(src)?;
        Ok(std::mem::replace(src, self.kind.default_value()))
    }
}

impl VariantOps for PrimitiveOps {
    fn flags(&self) -> OpsFlags {
        self.kind.flags()
    }

    fn construct_default(&self, _ty: TypeId) -> Result<Value> {
        Ok(self.kind.default_value())
    }

    fn construct_copy(&self, src: &Value) -> Result<Value> {
        self.require(OpsFlags::CONSTRUCT_COPY, "construct_copy")?;
        self.expect_kind(src)?;
        Ok(src.clone())
    }

    fn construct_move(&self, src: &mut Value) -> Result<Value> {
        self.require(OpsFlags::CONSTRUCT_MOVE, "construct_move")?;
        self.take(src)
    }

    fn construct_value_copy(&self, value: &Value) -> Result<Value> {
        self.require(OpsFlags::CONSTRUCT_VALUE_COPY, "construct_value_copy")?;
        self.expect_kind(value)?;
        Ok(value.clone())
    }

    fn construct_value_move(&self, value: Value) -> Result<Value> {
        self.require(OpsFlags::CONSTRUCT_VALUE_MOVE, "construct_value_move")?;
        self.expect_kind(&value)?;
        Ok(value)
    }

    fn set_copy(&self, dst: &mut Value, src: &Value) -> Result<()> {
        self.require(OpsFlags::SET_COPY, "set_copy")?;
        self.expect_kind(src)?;
        dst.clone_from(src);
        Ok(())
    }

    fn set_move(&self, dst: &mut Value, src: &mut Value) -> Result<()> {
        self.require(OpsFlags::SET_MOVE, "set_move")?;
        *dst = self.take(src)?;
        Ok(())
    }

    fn set_value_copy(&self, dst: &mut Value, value: &Value) -> Result<()> {
        self.require(OpsFlags::SET_VALUE_COPY, "set_value_copy")?;
        self.expect_kind(value)?;
        dst.clone_from(value);
        Ok(())
    }

    fn set_value_move(&self, dst: &mut Value, value: Value) -> Result<()> {
        self.require(OpsFlags::SET_VALUE_MOVE, "set_value_move")?;
        self.expect_kind(&value)?;
        *dst = value;
        Ok(())
    }

    fn get_value_copy(&self, src: &Value) -> Result<Value> {
        self.require(OpsFlags::GET_VALUE_COPY, "get_value_copy")?;
        Ok(src.clone())
    }

    fn get_value_peek<'a>(&self, src: &'a Value) -> Result<&'a Value> {
        self.require(OpsFlags::GET_VALUE_PEEK, "get_value_peek")?;
        Ok(src)
    }

    fn get_value_move(&self, src: &mut Value) -> Result<Value> {
        self.require(OpsFlags::GET_VALUE_MOVE, "get_value_move")?;
        self.take(src)
    }

    fn compare(&self, a: &Value, b: &Value) -> Result<Ordering> {
        let ordering = match (a, b) {
            (Value::Nil, Value::Nil) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Char(a), Value::Char(b)) | (Value::U8(a), Value::U8(b)) => a.cmp(b),
            (Value::I16(a), Value::I16(b)) => a.cmp(b),
            (Value::U16(a), Value::U16(b)) => a.cmp(b),
            (Value::I32(a), Value::I32(b)) => a.cmp(b),
            (Value::U32(a), Value::U32(b)) => a.cmp(b),
            (Value::I64(a), Value::I64(b)) => a.cmp(b),
            (Value::U64(a), Value::U64(b)) => a.cmp(b),
            (Value::F32(a), Value::F32(b)) => a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b)),
            (Value::F64(a), Value::F64(b)) => a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b)),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Pointer(a), Value::Pointer(b)) => a.cmp(b),
            _ => {
                return Err(Error::invalid_type(format!(
                    "cannot compare {} with {} as {}",
                    a.kind_name(),
                    b.kind_name(),
                    self.kind.name()
                )));
            }
        };
        Ok(ordering)
    }

    fn save(&self, value: &Value, out: &mut String) -> Result<()> {
        self.expect_kind(value)?;
        text::save(value, out)
    }

    fn load(&self, value: &mut Value, text: &str) -> Result<()> {
        *value = text::load(self.kind, text)?;
        Ok(())
    }
}
