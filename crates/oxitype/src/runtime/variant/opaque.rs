//! Opaque types: shared user payloads with reference-counted lifetimes.
//!
//! A type registered through [`Registry::register_opaque`] carries an
//! `Arc<T>` inside [`Value::Boxed`], or [`Value::Nil`] while null. Copying a
//! variant shares the payload and dropping the last variant frees it. Two
//! variants compare equal when they share one payload.
//!
//! Saving writes the payload's address. There is no matching load: an address
//! cannot be turned back into a live payload.

use crate::error::{Error, Result};
use crate::runtime::flags::TypeFlags;
use crate::runtime::registry::Registry;
use crate::runtime::types::{TypeId, TypeInfo};
use crate::runtime::variant::Variant;
use crate::runtime::variant::ops::{OpsFlags, VariantOps};
use crate::runtime::variant::value::Value;
use oxitype_log::debug;
use std::cmp::Ordering;
use std::fmt::{self, Write as _};
use std::marker::PhantomData;
use std::sync::Arc;

fn foreign_payload(type_name: &str, value: &Value) -> Error {
    Error::invalid_type(format!(
        "expected a {type_name} payload, got {}",
        value.kind_name()
    ))
}

/// The shared payload of `value`, `None` when null.
fn shared<'a, T: 'static>(type_name: &str, value: &'a Value) -> Result<Option<&'a Arc<T>>> {
    match value {
        Value::Nil => Ok(None),
        other => other
            .downcast_ref::<Arc<T>>()
            .map(Some)
            .ok_or_else(|| foreign_payload(type_name, other)),
    }
}

/// Address of the shared payload, 0 when null.
fn address<T: 'static>(type_name: &str, value: &Value) -> Result<usize> {
    Ok(shared::<T>(type_name, value)?.map_or(0, |arc| Arc::as_ptr(arc).cast::<()>() as usize))
}

pub(crate) struct OpaqueOps<T> {
    type_name: String,
    _payload: PhantomData<fn() -> T>,
}

impl<T: 'static> OpaqueOps<T> {
    fn check(&self, value: &Value) -> Result<()> {
        shared::<T>(&self.type_name, value).map(drop)
    }

    fn copied(&self, value: &Value) -> Result<Value> {
        self.check(value)?;
        Ok(value.clone())
    }

    /// Takes the payload, leaving null behind.
    fn taken(&self, value: &mut Value) -> Result<Value> {
        self.check(value)?;
        Ok(std::mem::take(value))
    }
}

impl<T: 'static> VariantOps for OpaqueOps<T> {
    fn flags(&self) -> OpsFlags {
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
    }

    fn construct_default(&self, _ty: TypeId) -> Result<Value> {
        Ok(Value::Nil)
    }

    fn construct_copy(&self, src: &Value) -> Result<Value> {
        self.copied(src)
    }

    fn construct_move(&self, src: &mut Value) -> Result<Value> {
        self.taken(src)
    }

    fn construct_value_copy(&self, value: &Value) -> Result<Value> {
        self.copied(value)
    }

    fn construct_value_move(&self, value: Value) -> Result<Value> {
        self.check(&value)?;
        Ok(value)
    }

    fn set_copy(&self, dst: &mut Value, src: &Value) -> Result<()> {
        *dst = self.copied(src)?;
        Ok(())
    }

    fn set_move(&self, dst: &mut Value, src: &mut Value) -> Result<()> {
        *dst = self.taken(src)?;
        Ok(())
    }

    fn set_value_copy(&self, dst: &mut Value, value: &Value) -> Result<()> {
        *dst = self.copied(value)?;
        Ok(())
    }

    fn set_value_move(&self, dst: &mut Value, value: Value) -> Result<()> {
        self.check(&value)?;
        *dst = value;
        Ok(())
    }

    fn get_value_copy(&self, src: &Value) -> Result<Value> {
        self.copied(src)
    }

    fn get_value_peek<'a>(&self, src: &'a Value) -> Result<&'a Value> {
        Ok(src)
    }

    fn get_value_move(&self, src: &mut Value) -> Result<Value> {
        self.taken(src)
    }

    fn compare(&self, a: &Value, b: &Value) -> Result<Ordering> {
        let a = address::<T>(&self.type_name, a)?;
        let b = address::<T>(&self.type_name, b)?;
        Ok(a.cmp(&b))
    }

    fn save(&self, value: &Value, out: &mut String) -> Result<()> {
        let address = address::<T>(&self.type_name, value)?;
        // Writing into a String cannot fail.
        let _ = write!(out, "{address:#x}");
        Ok(())
    }
}

impl Registry {
    /// Registers an opaque type whose variants share an `Arc<T>`.
    ///
    /// Converters to `bool` (non-null), `string` and `pointer` (the address)
    /// and from `nil` (null) are registered with the type.
    ///
    /// # Errors
    ///
    /// Anything [`Registry::register`] returns.
    ///
    /// # Example
    ///
    /// ```rust
    /// use oxitype::{Registry, Variant};
    /// use std::sync::Arc;
    ///
    /// #[derive(Debug)]
    /// struct Texture {
    ///     width: u32,
    /// }
    ///
    /// let registry = Registry::new();
    /// let texture = registry.register_opaque::<Texture>("Texture").unwrap();
    ///
    /// let handle = Arc::new(Texture { width: 64 });
    /// let a = Variant::from_opaque(&registry, texture, Arc::clone(&handle)).unwrap();
    /// let b = Variant::construct_copy(&a).unwrap();
    /// assert_eq!(Arc::strong_count(&handle), 3);
    /// assert!(a.equals(&registry, &b).unwrap());
    ///
    /// let shared = b.as_opaque::<Texture>().unwrap().unwrap();
    /// assert_eq!(shared.width, 64);
    /// assert!(b.to_bool(&registry).unwrap());
    ///
    /// drop((a, b, shared));
    /// assert_eq!(Arc::strong_count(&handle), 1);
    /// ```
    pub fn register_opaque<T>(&self, name: &str) -> Result<TypeId>
    where
        T: fmt::Debug + Send + Sync + 'static,
    {
        let ty = self.register(
            name,
            TypeId::OPAQUE,
            TypeInfo::new()
                .with_class_size(self.class_size(TypeId::OPAQUE))
                .with_variant_ops(Arc::new(OpaqueOps::<T> {
                    type_name: name.to_owned(),
                    _payload: PhantomData,
                })),
            TypeFlags::empty(),
        )?;

        self.register_converter(ty, TypeId::BOOL, |src, dst| {
            let address = address::<T>(src.type_name().unwrap_or("opaque"), src.payload())?;
            dst.set_value_move(Value::Bool(address != 0))
        })?;
        self.register_converter(ty, TypeId::STRING, |src, dst| {
            let address = address::<T>(src.type_name().unwrap_or("opaque"), src.payload())?;
            dst.set_value_move(Value::Str(format!("{address:#x}")))
        })?;
        self.register_converter(ty, TypeId::POINTER, |src, dst| {
            let address = address::<T>(src.type_name().unwrap_or("opaque"), src.payload())?;
            dst.set_value_move(Value::Pointer(address))
        })?;
        self.register_converter(TypeId::NIL, ty, |_, dst| dst.set_value_move(Value::Nil))?;

        debug!("registered opaque type '{}'", name);
        Ok(ty)
    }
}

impl Variant {
    /// Constructs a `ty` variant sharing `payload`.
    ///
    /// # Errors
    ///
    /// `InvalidType` if `ty` is not an opaque type over `T`, plus the lookup
    /// errors of [`Variant::construct_value_move`].
    pub fn from_opaque<T>(registry: &Registry, ty: TypeId, payload: Arc<T>) -> Result<Variant>
    where
        T: fmt::Debug + Send + Sync + 'static,
    {
        Variant::construct_value_move(registry, ty, Value::boxed(payload))
    }

    /// Shares the payload of an opaque variant; `None` while it is null.
    ///
    /// # Errors
    ///
    /// `InvalidType` if the variant does not hold an `Arc<T>` payload.
    pub fn as_opaque<T: 'static>(&self) -> Result<Option<Arc<T>>> {
        let value = self.get_value_peek()?;
        let name = self.type_name().unwrap_or("opaque");
        Ok(shared::<T>(name, value)?.cloned())
    }
}
