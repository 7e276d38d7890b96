//! The variant value engine.
//!
//! A [`Variant`] pairs a [`Value`] with the type it belongs to and dispatches
//! every operation through that type's [`VariantOps`] table.
//!
//! # Architecture
//!
//! - A variant moves through `Invalid -> Constructed -> Destructed`. Only the
//!   constructors leave `Invalid`; [`Variant::destruct`] (or drop) ends the
//!   lifetime and is idempotent.
//! - Each operation checks the table's [`OpsFlags`] first. Missing operations
//!   fall back along a fixed chain (move to copy, construct to
//!   default-then-set, relocatable types to a plain clone); when the chain is
//!   exhausted the call fails with `Unsupported`.
//! - Conversions go through the registry: compatible types share the payload
//!   directly, everything else needs a converter (see
//!   [`Registry::register_converter`]).
//! - Besides the builtin scalars, user types can be registered as
//!   enumerations, flags ([`Registry::register_enum`],
//!   [`Registry::register_flags`]) or opaque shared payloads
//!   ([`Registry::register_opaque`]).
//!
//! # Thread Safety
//!
//! A `Variant` is `Send + Sync` but has no interior locking; mutating one from
//! several threads needs outside synchronization.

mod convert;
mod enums;
mod opaque;
mod ops;
mod primitives;
mod text;
mod value;

pub use convert::ConverterFn;
pub use enums::{EntryKind, EntryTable, EnumEntry};
pub use ops::{OpsFlags, VariantOps};
pub use value::{BoxedValue, Value};

pub(crate) use convert::register_builtin_converters;
pub(crate) use primitives::{Primitive, builtin_ops};

use crate::error::{Error, Result};
use crate::runtime::registry::Registry;
use crate::runtime::types::TypeId;
use oxitype_log::warn;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of a [`Variant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VariantState {
    #[default]
    Invalid,
    Constructed,
    Destructed,
}

/// The type a variant dispatches through.
#[derive(Clone)]
struct Binding {
    ty: TypeId,
    name: &'static str,
    ops: Arc<dyn VariantOps>,
}

impl Binding {
    fn resolve(registry: &Registry, ty: TypeId) -> Result<Binding> {
        let meta = registry.meta_or_not_found(ty)?;
        let ops = meta.variant_ops.clone().ok_or_else(|| {
            Error::invalid_type(format!("'{}' is not variant-compatible", meta.name))
        })?;
        Ok(Binding {
            ty,
            name: meta.name,
            ops,
        })
    }

    fn builtin(kind: Primitive) -> Binding {
        Binding {
            ty: kind.type_id(),
            name: kind.name(),
            ops: builtin_ops(kind),
        }
    }

    fn supports(&self, flags: OpsFlags) -> bool {
        self.ops.flags().contains(flags)
    }

    fn unsupported(&self, operation: &'static str) -> Error {
        Error::unsupported(operation, self.name)
    }

    fn default_value(&self) -> Result<Value> {
        if !self.supports(OpsFlags::CONSTRUCT_DEFAULT) {
            return Err(self.unsupported("construct_default"));
        }
        self.ops.construct_default(self.ty)
    }

    fn copy_value(&self, src: &Value) -> Result<Value> {
        if self.supports(OpsFlags::CONSTRUCT_COPY) {
            return self.ops.construct_copy(src);
        }
        if self.supports(OpsFlags::CONSTRUCT_DEFAULT | OpsFlags::SET_COPY) {
            let mut value = self.ops.construct_default(self.ty)?;
            self.ops.set_copy(&mut value, src)?;
            return Ok(value);
        }
        if self.supports(OpsFlags::VALUELESS) {
            return self.default_value();
        }
        if self.supports(OpsFlags::RELOCATABLE) {
            return Ok(src.clone());
        }
        Err(self.unsupported("construct_copy"))
    }

    fn move_value(&self, src: &mut Value) -> Result<Value> {
        if self.supports(OpsFlags::CONSTRUCT_MOVE) {
            return self.ops.construct_move(src);
        }
        if self.supports(OpsFlags::CONSTRUCT_DEFAULT | OpsFlags::SET_MOVE) {
            let mut value = self.ops.construct_default(self.ty)?;
            self.ops.set_move(&mut value, src)?;
            return Ok(value);
        }
        if self.supports(OpsFlags::RELOCATABLE) {
            return Ok(src.clone());
        }
        self.copy_value(src)
    }

    fn value_copy(&self, value: &Value) -> Result<Value> {
        if self.supports(OpsFlags::CONSTRUCT_VALUE_COPY) {
            return self.ops.construct_value_copy(value);
        }
        if self.supports(OpsFlags::CONSTRUCT_DEFAULT | OpsFlags::SET_VALUE_COPY) {
            let mut out = self.ops.construct_default(self.ty)?;
            self.ops.set_value_copy(&mut out, value)?;
            return Ok(out);
        }
        Err(self.unsupported("construct_value_copy"))
    }

    fn value_move(&self, value: Value) -> Result<Value> {
        if self.supports(OpsFlags::CONSTRUCT_VALUE_MOVE) {
            return self.ops.construct_value_move(value);
        }
        if self.supports(OpsFlags::CONSTRUCT_DEFAULT | OpsFlags::SET_VALUE_MOVE) {
            let mut out = self.ops.construct_default(self.ty)?;
            self.ops.set_value_move(&mut out, value)?;
            return Ok(out);
        }
        self.value_copy(&value)
    }
}

fn not_constructed(operation: &'static str, state: VariantState) -> Error {
    Error::invalid_type(format!("{operation} on a variant in state {state:?}"))
}

/// A typed value dispatched through the registry.
///
/// # Example
///
/// ```rust
/// use oxitype::{Registry, TypeId, Variant};
/// use std::cmp::Ordering;
///
/// let registry = Registry::new();
/// let byte = Variant::from(250u8);
/// let mut text = Variant::construct_default(&registry, TypeId::STRING).unwrap();
/// byte.convert(&registry, &mut text).unwrap();
///
/// assert_eq!(text.as_str().unwrap(), "250");
/// assert_eq!(byte.compare(&registry, &text).unwrap(), Ordering::Equal);
/// ```
pub struct Variant {
    binding: Option<Binding>,
    state: VariantState,
    value: Value,
}

impl Variant {
    /// An unconstructed variant.
    #[must_use]
    pub const fn new() -> Variant {
        Variant {
            binding: None,
            state: VariantState::Invalid,
            value: Value::Nil,
        }
    }

    fn constructed(binding: Binding, value: Value) -> Variant {
        Variant {
            binding: Some(binding),
            state: VariantState::Constructed,
            value,
        }
    }

    /// A constructed `nil` variant.
    #[must_use]
    pub fn nil() -> Variant {
        Self::constructed(Binding::builtin(Primitive::Nil), Value::Nil)
    }

    #[must_use]
    pub fn from_char(c: u8) -> Variant {
        Self::constructed(Binding::builtin(Primitive::Char), Value::Char(c))
    }

    #[must_use]
    pub fn from_pointer(address: usize) -> Variant {
        Self::constructed(Binding::builtin(Primitive::Pointer), Value::Pointer(address))
    }

    /// Constructs the zero value of `ty`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `ty` is not registered
    /// - `InvalidType` if `ty` has no variant operation table
    /// - `Unsupported` if the table cannot default-construct
    pub fn construct_default(registry: &Registry, ty: TypeId) -> Result<Variant> {
        let binding = Binding::resolve(registry, ty)?;
        let value = binding.default_value()?;
        Ok(Self::constructed(binding, value))
    }

    /// Constructs a copy of `src`, with the same type.
    pub fn construct_copy(src: &Variant) -> Result<Variant> {
        let binding = src.bound("construct_copy")?;
        let value = binding.copy_value(&src.value)?;
        Ok(Self::constructed(binding.clone(), value))
    }

    /// Constructs from `src`, leaving `src` holding its type's zero value
    /// when the type owns its payload.
    pub fn construct_move(src: &mut Variant) -> Result<Variant> {
        let (binding, value) = src.parts_mut("construct_move")?;
        let moved = binding.move_value(value)?;
        Ok(Self::constructed(binding.clone(), moved))
    }

    /// Constructs a `ty` variant holding a copy of `value`.
    pub fn construct_value_copy(registry: &Registry, ty: TypeId, value: &Value) -> Result<Variant> {
        let binding = Binding::resolve(registry, ty)?;
        let value = binding.value_copy(value)?;
        Ok(Self::constructed(binding, value))
    }

    /// Constructs a `ty` variant taking ownership of `value`.
    pub fn construct_value_move(registry: &Registry, ty: TypeId, value: Value) -> Result<Variant> {
        let binding = Binding::resolve(registry, ty)?;
        let value = binding.value_move(value)?;
        Ok(Self::constructed(binding, value))
    }

    /// The variant's type, `INVALID` before construction.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.binding.as_ref().map_or(TypeId::INVALID, |b| b.ty)
    }

    #[must_use]
    pub fn type_name(&self) -> Option<&'static str> {
        self.binding.as_ref().map(|b| b.name)
    }

    #[must_use]
    pub fn state(&self) -> VariantState {
        self.state
    }

    #[must_use]
    pub fn is_constructed(&self) -> bool {
        self.state == VariantState::Constructed
    }

    /// Operations the variant's type supports; empty before construction.
    #[must_use]
    pub fn ops_flags(&self) -> OpsFlags {
        self.binding
            .as_ref()
            .map_or(OpsFlags::empty(), |b| b.ops.flags())
    }

    #[must_use]
    pub fn is_valueless(&self) -> bool {
        self.ops_flags().contains(OpsFlags::VALUELESS)
    }

    /// The raw payload, bypassing the operation table.
    pub(crate) fn payload(&self) -> &Value {
        &self.value
    }

    fn bound(&self, operation: &'static str) -> Result<&Binding> {
        match (&self.binding, self.state) {
            (Some(binding), VariantState::Constructed) => Ok(binding),
            _ => Err(not_constructed(operation, self.state)),
        }
    }

    fn parts_mut(&mut self, operation: &'static str) -> Result<(&Binding, &mut Value)> {
        match (&self.binding, self.state) {
            (Some(binding), VariantState::Constructed) => Ok((binding, &mut self.value)),
            _ => Err(not_constructed(operation, self.state)),
        }
    }

    /// Installs `fresh` after releasing the current payload.
    fn replace(&mut self, fresh: Variant) -> Result<()> {
        let released = self.destruct();
        *self = fresh;
        released
    }

    /// Copies `src` into this variant, adopting its type if it differs.
    pub fn set_copy(&mut self, src: &Variant) -> Result<()> {
        let src_ty = src.bound("set_copy")?.ty;
        let (binding, value) = self.parts_mut("set_copy")?;
        if binding.ty == src_ty && binding.supports(OpsFlags::SET_COPY) {
            return binding.ops.set_copy(value, &src.value);
        }
        let fresh = Variant::construct_copy(src)?;
        self.replace(fresh)
    }

    /// Moves `src` into this variant, adopting its type if it differs.
    pub fn set_move(&mut self, src: &mut Variant) -> Result<()> {
        let src_ty = src.bound("set_move")?.ty;
        let (binding, value) = self.parts_mut("set_move")?;
        if binding.ty == src_ty {
            if binding.supports(OpsFlags::SET_MOVE) {
                return binding.ops.set_move(value, &mut src.value);
            }
            if binding.supports(OpsFlags::SET_COPY) {
                return binding.ops.set_copy(value, &src.value);
            }
        }
        let fresh = Variant::construct_move(src)?;
        self.replace(fresh)
    }

    /// Replaces the payload with a copy of `value`, keeping the type.
    pub fn set_value_copy(&mut self, value: &Value) -> Result<()> {
        let (binding, dst) = self.parts_mut("set_value_copy")?;
        if !binding.supports(OpsFlags::SET_VALUE_COPY) {
            return Err(binding.unsupported("set_value_copy"));
        }
        binding.ops.set_value_copy(dst, value)
    }

    /// Replaces the payload with `value`, keeping the type.
    pub fn set_value_move(&mut self, value: Value) -> Result<()> {
        let (binding, dst) = self.parts_mut("set_value_move")?;
        if binding.supports(OpsFlags::SET_VALUE_MOVE) {
            return binding.ops.set_value_move(dst, value);
        }
        self.set_value_copy(&value)
    }

    /// Makes this a `ty` variant holding a copy of `value`.
    pub fn set_value_copy_as(&mut self, registry: &Registry, ty: TypeId, value: &Value) -> Result<()> {
        if self.bound("set_value_copy")?.ty == ty {
            return self.set_value_copy(value);
        }
        let fresh = Variant::construct_value_copy(registry, ty, value)?;
        self.replace(fresh)
    }

    /// Makes this a `ty` variant holding `value`.
    pub fn set_value_move_as(&mut self, registry: &Registry, ty: TypeId, value: Value) -> Result<()> {
        if self.bound("set_value_move")?.ty == ty {
            return self.set_value_move(value);
        }
        let fresh = Variant::construct_value_move(registry, ty, value)?;
        self.replace(fresh)
    }

    /// A copy of the payload.
    pub fn get_value_copy(&self) -> Result<Value> {
        let binding = self.bound("get_value_copy")?;
        if !binding.supports(OpsFlags::GET_VALUE_COPY) {
            return Err(binding.unsupported("get_value_copy"));
        }
        binding.ops.get_value_copy(&self.value)
    }

    /// Borrows the payload.
    pub fn get_value_peek(&self) -> Result<&Value> {
        let binding = self.bound("get_value_peek")?;
        if !binding.supports(OpsFlags::GET_VALUE_PEEK) {
            return Err(binding.unsupported("get_value_peek"));
        }
        binding.ops.get_value_peek(&self.value)
    }

    /// Takes the payload out, leaving the type's zero value when the type
    /// owns its payload.
    pub fn get_value_move(&mut self) -> Result<Value> {
        let (binding, value) = self.parts_mut("get_value_move")?;
        if binding.supports(OpsFlags::GET_VALUE_MOVE) {
            return binding.ops.get_value_move(value);
        }
        self.get_value_copy()
    }

    /// Ends the variant's lifetime. Destructing twice is a no-op.
    ///
    /// # Errors
    ///
    /// `InvalidType` if the variant was never constructed; otherwise whatever
    /// the type's `destruct` returns. The variant is destructed either way.
    pub fn destruct(&mut self) -> Result<()> {
        match self.state {
            VariantState::Destructed => Ok(()),
            VariantState::Invalid => Err(not_constructed("destruct", self.state)),
            VariantState::Constructed => {
                self.state = VariantState::Destructed;
                let result = match &self.binding {
                    Some(binding) => binding.ops.destruct(&mut self.value),
                    None => Ok(()),
                };
                self.value = Value::Nil;
                result
            }
        }
    }

    fn compare_direct(&self, other: &Variant) -> Result<Ordering> {
        let binding = self.bound("compare")?;
        if !binding.supports(OpsFlags::COMPARE) {
            return Err(binding.unsupported("compare"));
        }
        binding.ops.compare(&self.value, &other.value)
    }

    fn converted_to(&self, registry: &Registry, ty: TypeId) -> Result<Variant> {
        let mut dst = Variant::construct_default(registry, ty)?;
        self.convert(registry, &mut dst)?;
        Ok(dst)
    }

    /// Orders two variants.
    ///
    /// Variants of compatible types compare directly. Otherwise this one is
    /// converted to the other's type and compared there, and failing that the
    /// other is converted to this one's type.
    ///
    /// # Errors
    ///
    /// `InvalidConversion` if neither conversion exists, `Unsupported` if the
    /// type cannot compare.
    pub fn compare(&self, registry: &Registry, other: &Variant) -> Result<Ordering> {
        let mine = self.bound("compare")?;
        let theirs = other.bound("compare")?;

        if mine.ty == theirs.ty
            || registry.check(mine.ty, theirs.ty)
            || registry.check(theirs.ty, mine.ty)
        {
            return self.compare_direct(other);
        }
        if let Ok(converted) = self.converted_to(registry, theirs.ty) {
            return converted.compare_direct(other);
        }
        if let Ok(converted) = other.converted_to(registry, mine.ty) {
            return self.compare_direct(&converted);
        }
        Err(Error::conversion(mine.name, theirs.name))
    }

    /// Returns true if [`compare`](Variant::compare) reports `Equal`.
    pub fn equals(&self, registry: &Registry, other: &Variant) -> Result<bool> {
        Ok(self.compare(registry, other)? == Ordering::Equal)
    }

    /// Converts this variant's value into `dst`, which keeps its type.
    ///
    /// # Errors
    ///
    /// - `Unsupported` when `dst` is `nil` (unless this is `nil` as well)
    /// - `InvalidConversion` when no converter applies or the converter
    ///   rejects the value
    pub fn convert(&self, registry: &Registry, dst: &mut Variant) -> Result<()> {
        let from = self.bound("convert")?;
        let (to_ty, to_name) = {
            let to = dst.bound("convert")?;
            (to.ty, to.name)
        };

        if registry.check(from.ty, to_ty) {
            let value = from.copy_value(&self.value)?;
            let (binding, slot) = dst.parts_mut("convert")?;
            binding.ops.destruct(slot)?;
            *slot = value;
            return Ok(());
        }
        if registry.check(to_ty, TypeId::NIL) {
            return Err(Error::unsupported("convert", to_name));
        }
        match registry.find_converter(from.ty, to_ty) {
            Some(converter) => converter(self, dst),
            None => Err(Error::conversion(from.name, to_name)),
        }
    }

    /// Appends the saved text form.
    pub fn save(&self, out: &mut String) -> Result<()> {
        let binding = self.bound("save")?;
        if !binding.supports(OpsFlags::SAVE) {
            return Err(binding.unsupported("save"));
        }
        binding.ops.save(&self.value, out)
    }

    /// The saved text form as a new string.
    pub fn save_to_string(&self) -> Result<String> {
        let mut out = String::new();
        self.save(&mut out)?;
        Ok(out)
    }

    /// Replaces the value with the one parsed from `text`.
    pub fn load(&mut self, text: &str) -> Result<()> {
        let (binding, value) = self.parts_mut("load")?;
        if !binding.supports(OpsFlags::LOAD) {
            return Err(binding.unsupported("load"));
        }
        binding.ops.load(value, text)
    }

    /// Borrows a string payload.
    pub fn as_str(&self) -> Result<&str> {
        self.bound("as_str")?;
        match &self.value {
            Value::Str(s) => Ok(s.as_str()),
            other => Err(Error::invalid_type(format!(
                "expected string, found {}",
                other.kind_name()
            ))),
        }
    }
}

macro_rules! typed_accessors {
    ($($kind:ident, $arm:ident, $ty:ty, $as_fn:ident, $set_fn:ident, $to_fn:ident;)*) => {
        impl Variant {
            $(
                #[doc = concat!("Reads a `", stringify!($ty), "` payload without conversion.")]
                #[allow(clippy::clone_on_copy)]
                pub fn $as_fn(&self) -> Result<$ty> {
                    self.bound(stringify!($as_fn))?;
                    match &self.value {
                        Value::$arm(v) => Ok(v.clone()),
                        other => Err(Error::invalid_type(format!(
                            "expected {}, found {}",
                            Primitive::$kind.name(),
                            other.kind_name()
                        ))),
                    }
                }

                #[doc = concat!("Makes this a `", stringify!($kind), "` variant holding `value`.")]
                pub fn $set_fn(&mut self, value: $ty) -> Result<()> {
                    self.bound(stringify!($set_fn))?;
                    let fresh = Variant::constructed(Binding::builtin(Primitive::$kind), Value::$arm(value));
                    self.replace(fresh)
                }

                #[doc = concat!("Converts the value to `", stringify!($ty), "` through the registry.")]
                pub fn $to_fn(&self, registry: &Registry) -> Result<$ty> {
                    let mut dst = Variant::constructed(
                        Binding::builtin(Primitive::$kind),
                        Primitive::$kind.default_value(),
                    );
                    self.convert(registry, &mut dst)?;
                    dst.$as_fn()
                }
            )*
        }
    };
}

typed_accessors! {
    Bool, Bool, bool, as_bool, set_bool, to_bool;
    Char, Char, u8, as_char, set_char, to_char;
    U8, U8, u8, as_u8, set_u8, to_u8;
    I16, I16, i16, as_i16, set_i16, to_i16;
    U16, U16, u16, as_u16, set_u16, to_u16;
    I32, I32, i32, as_i32, set_i32, to_i32;
    U32, U32, u32, as_u32, set_u32, to_u32;
    I64, I64, i64, as_i64, set_i64, to_i64;
    U64, U64, u64, as_u64, set_u64, to_u64;
    F32, F32, f32, as_f32, set_f32, to_f32;
    F64, F64, f64, as_f64, set_f64, to_f64;
    Str, Str, String, as_string, set_string, to_string;
    Pointer, Pointer, usize, as_pointer, set_pointer, to_pointer;
}

macro_rules! from_scalar {
    ($($ty:ty => $kind:ident, $arm:ident;)*) => {
        $(
            impl From<$ty> for Variant {
                fn from(value: $ty) -> Self {
                    Variant::constructed(Binding::builtin(Primitive::$kind), Value::$arm(value))
                }
            }
        )*
    };
}

from_scalar! {
    bool => Bool, Bool;
    u8 => U8, U8;
    i16 => I16, I16;
    u16 => U16, U16;
    i32 => I32, I32;
    u32 => U32, U32;
    i64 => I64, I64;
    u64 => U64, U64;
    f32 => F32, F32;
    f64 => F64, F64;
    String => Str, Str;
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::from(value.to_owned())
    }
}

impl Default for Variant {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Variant {
    fn drop(&mut self) {
        if self.is_constructed() {
            if let Err(e) = self.destruct() {
                warn!("destructing a '{}' variant failed: {}", self.type_name().unwrap_or("?"), e);
            }
        }
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variant")
            .field("type", &self.type_name().unwrap_or("<none>"))
            .field("state", &self.state)
            .field("value", &self.value)
            .finish()
    }
}
