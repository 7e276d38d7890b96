//! Enumeration and flags types.
//!
//! An enumeration names a closed set of `u32` values. A flags type names the
//! bits of a `u32` set. Both carry their payload as [`Value::U32`], save it by
//! name and load it from a name or a nick.
//!
//! # Architecture
//!
//! - [`Registry::register_enum`] and [`Registry::register_flags`] derive a
//!   type from the abstract `enum` or `flags` builtin and give it an operation
//!   table holding its [`EntryTable`].
//! - Each registered type gets its own converters to `bool`, the integer
//!   types and `string`, plus one from `string`. They go away with the type.
//! - A value outside the table is rejected on every write path, so a
//!   constructed enum variant always holds a named value.

use crate::error::{Error, Result};
use crate::runtime::flags::TypeFlags;
use crate::runtime::registry::Registry;
use crate::runtime::types::{TypeId, TypeInfo};
use crate::runtime::variant::Variant;
use crate::runtime::variant::ops::{OpsFlags, VariantOps};
use crate::runtime::variant::value::Value;
use oxitype_log::debug;
use std::cmp::Ordering;
use std::sync::Arc;

/// One named value of an enumeration or flags type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumEntry {
    pub value: u32,
    pub name: &'static str,
    /// Short alternative name, accepted wherever the name is. May be empty.
    pub nick: &'static str,
}

impl EnumEntry {
    #[must_use]
    pub const fn new(value: u32, name: &'static str, nick: &'static str) -> Self {
        EnumEntry { value, name, nick }
    }

    fn answers_to(&self, text: &str) -> bool {
        self.name == text || (!self.nick.is_empty() && self.nick == text)
    }
}

/// Whether a table names whole values or bits of a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Enum,
    Flags,
}

/// The entries of one enumeration or flags type.
///
/// # Example
///
/// ```rust
/// use oxitype::{EnumEntry, Registry};
///
/// const ACCESS: &[EnumEntry] = &[
///     EnumEntry::new(0, "None", "none"),
///     EnumEntry::new(1, "Read", "r"),
///     EnumEntry::new(2, "Write", "w"),
/// ];
///
/// let registry = Registry::new();
/// let access = registry.register_flags("Access", ACCESS).unwrap();
/// let table = registry.entry_table(access).unwrap();
///
/// assert_eq!(table.mask(), 3);
/// assert_eq!(table.format(3).unwrap(), "Read|Write");
/// assert_eq!(table.parse("w | r").unwrap(), 3);
/// assert!(!table.contains(4));
/// ```
#[derive(Debug)]
pub struct EntryTable {
    type_name: String,
    kind: EntryKind,
    entries: Box<[EnumEntry]>,
    min: u32,
    max: u32,
    mask: u32,
}

impl EntryTable {
    /// Builds and checks a table.
    ///
    /// # Errors
    ///
    /// `InvalidType` when `entries` is empty or repeats a name, a nick, or
    /// (for enumerations) a value.
    pub fn new(type_name: &str, kind: EntryKind, entries: &[EnumEntry]) -> Result<Self> {
        let reject = |reason: String| Err(Error::invalid_type(format!("'{type_name}': {reason}")));
        if entries.is_empty() {
            return reject("needs at least one entry".into());
        }
        for (i, entry) in entries.iter().enumerate() {
            if entry.name.is_empty() {
                return reject(format!("entry {} has no name", entry.value));
            }
            for earlier in &entries[..i] {
                if earlier.answers_to(entry.name)
                    || (!entry.nick.is_empty() && earlier.answers_to(entry.nick))
                {
                    return reject(format!("entry name '{}' is used twice", entry.name));
                }
                if kind == EntryKind::Enum && earlier.value == entry.value {
                    return reject(format!("value {} is named twice", entry.value));
                }
            }
        }

        let values = entries.iter().map(|e| e.value);
        Ok(EntryTable {
            type_name: type_name.to_owned(),
            kind,
            min: values.clone().min().unwrap_or(0),
            max: values.clone().max().unwrap_or(0),
            mask: values.fold(0, |mask, v| mask | v),
            entries: entries.into(),
        })
    }

    #[must_use]
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Entries in declaration order.
    #[must_use]
    pub fn entries(&self) -> &[EnumEntry] {
        &self.entries
    }

    /// Smallest declared value.
    #[must_use]
    pub fn min(&self) -> u32 {
        self.min
    }

    /// Largest declared value.
    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Union of every declared value.
    #[must_use]
    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// The value a default-constructed variant holds: the first entry's.
    #[must_use]
    pub fn default_value(&self) -> u32 {
        self.entries.first().map_or(0, |e| e.value)
    }

    /// The first entry declaring exactly `value`.
    #[must_use]
    pub fn entry(&self, value: u32) -> Option<&EnumEntry> {
        self.entries.iter().find(|e| e.value == value)
    }

    /// The entry named or nicknamed `text`.
    #[must_use]
    pub fn lookup(&self, text: &str) -> Option<&EnumEntry> {
        self.entries.iter().find(|e| e.answers_to(text))
    }

    /// Returns true if `value` may be held by a variant of this type.
    ///
    /// For flags that means `value` is a union of whole entries.
    #[must_use]
    pub fn contains(&self, value: u32) -> bool {
        match self.kind {
            EntryKind::Enum => self.entry(value).is_some(),
            EntryKind::Flags => self.covered(value) == value,
        }
    }

    /// Union of the entries whose bits are all set in `value`.
    fn covered(&self, value: u32) -> u32 {
        self.entries
            .iter()
            .filter(|e| value & e.value == e.value)
            .fold(0, |acc, e| acc | e.value)
    }

    fn rejected(&self, what: impl Into<String>) -> Error {
        Error::conversion(what, self.type_name.as_str())
    }

    pub(crate) fn checked(&self, value: u32) -> Result<u32> {
        if self.contains(value) {
            Ok(value)
        } else {
            Err(self.rejected(format!("value {value:#x}")))
        }
    }

    /// The text form of `value`.
    ///
    /// An enumeration value becomes its entry's name. A flags value becomes
    /// the names of its set entries joined by `|`, or the name of a zero
    /// entry (if one exists, otherwise empty) when no bit is set.
    ///
    /// # Errors
    ///
    /// `InvalidConversion` if the table does not contain `value`.
    pub fn format(&self, value: u32) -> Result<String> {
        let value = self.checked(value)?;
        if self.kind == EntryKind::Enum || value == 0 {
            return Ok(self.entry(value).map_or_else(String::new, |e| e.name.to_owned()));
        }

        let mut out = String::new();
        for entry in self.entries.iter() {
            if entry.value != 0 && value & entry.value == entry.value {
                if !out.is_empty() {
                    out.push('|');
                }
                out.push_str(entry.name);
            }
        }
        Ok(out)
    }

    /// Parses the text form produced by [`format`](EntryTable::format).
    ///
    /// Names and nicks are both accepted, surrounding whitespace is ignored,
    /// and a flags value may list its entries in any order.
    ///
    /// # Errors
    ///
    /// `InvalidConversion` on an unknown name.
    pub fn parse(&self, text: &str) -> Result<u32> {
        let unknown = |token: &str| self.rejected(format!("name {token:?}"));
        match self.kind {
            EntryKind::Enum => {
                let token = text.trim();
                self.lookup(token).map(|e| e.value).ok_or_else(|| unknown(token))
            }
            EntryKind::Flags => text
                .split('|')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .try_fold(0, |acc, token| {
                    self.lookup(token)
                        .map(|e| acc | e.value)
                        .ok_or_else(|| unknown(token))
                }),
        }
    }
}

/// Operation table shared by every enumeration and flags type.
pub(crate) struct EntryOps {
    table: Arc<EntryTable>,
}

impl EntryOps {
    fn payload(&self, value: &Value) -> Result<u32> {
        match value {
            Value::U32(v) => Ok(*v),
            other => Err(Error::invalid_type(format!(
                "expected a {} payload, got {}",
                self.table.type_name,
                other.kind_name()
            ))),
        }
    }
}

impl VariantOps for EntryOps {
    fn flags(&self) -> OpsFlags {
        OpsFlags::RELOCATABLE
            | OpsFlags::CONSTRUCT_DEFAULT
            | OpsFlags::SET_VALUE_COPY
            | OpsFlags::GET_VALUE_COPY
            | OpsFlags::GET_VALUE_PEEK
            | OpsFlags::COMPARE
            | OpsFlags::SAVE
            | OpsFlags::LOAD
    }

    fn construct_default(&self, _ty: TypeId) -> Result<Value> {
        Ok(Value::U32(self.table.default_value()))
    }

    fn set_value_copy(&self, dst: &mut Value, value: &Value) -> Result<()> {
        let value = self.table.checked(self.payload(value)?)?;
        *dst = Value::U32(value);
        Ok(())
    }

    fn get_value_copy(&self, src: &Value) -> Result<Value> {
        Ok(src.clone())
    }

    fn get_value_peek<'a>(&self, src: &'a Value) -> Result<&'a Value> {
        Ok(src)
    }

    fn compare(&self, a: &Value, b: &Value) -> Result<Ordering> {
        Ok(self.payload(a)?.cmp(&self.payload(b)?))
    }

    fn save(&self, value: &Value, out: &mut String) -> Result<()> {
        out.push_str(&self.table.format(self.payload(value)?)?);
        Ok(())
    }

    fn load(&self, value: &mut Value, text: &str) -> Result<()> {
        *value = Value::U32(self.table.parse(text)?);
        Ok(())
    }
}

const INTEGER_TARGETS: [TypeId; 7] = [
    TypeId::UINT8,
    TypeId::INT16,
    TypeId::UINT16,
    TypeId::INT32,
    TypeId::UINT32,
    TypeId::INT64,
    TypeId::UINT64,
];

/// `value` as a payload of the integer type `to`, if it fits.
fn integer_value(value: u32, to: TypeId) -> Option<Value> {
    Some(match to {
        TypeId::UINT8 => Value::U8(u8::try_from(value).ok()?),
        TypeId::INT16 => Value::I16(i16::try_from(value).ok()?),
        TypeId::UINT16 => Value::U16(u16::try_from(value).ok()?),
        TypeId::INT32 => Value::I32(i32::try_from(value).ok()?),
        TypeId::UINT32 => Value::U32(value),
        TypeId::INT64 => Value::I64(i64::from(value)),
        TypeId::UINT64 => Value::U64(u64::from(value)),
        _ => return None,
    })
}

impl Registry {
    /// Registers an enumeration deriving the `enum` builtin.
    ///
    /// Variants of the new type default to the first entry's value.
    ///
    /// # Errors
    ///
    /// - `InvalidType` if the entry table is malformed (see [`EntryTable::new`])
    /// - anything [`Registry::register`] returns
    ///
    /// # Example
    ///
    /// ```rust
    /// use oxitype::{EnumEntry, Registry, Value, Variant};
    ///
    /// let registry = Registry::new();
    /// let color = registry
    ///     .register_enum(
    ///         "Color",
    ///         &[
    ///             EnumEntry::new(0, "Red", "r"),
    ///             EnumEntry::new(1, "Green", "g"),
    ///             EnumEntry::new(2, "Blue", "b"),
    ///         ],
    ///     )
    ///     .unwrap();
    ///
    /// let mut c = Variant::construct_default(&registry, color).unwrap();
    /// assert_eq!(c.to_string(&registry).unwrap(), "Red");
    ///
    /// c.load("b").unwrap();
    /// assert_eq!(c.as_u32().unwrap(), 2);
    /// assert_eq!(c.save_to_string().unwrap(), "Blue");
    /// assert!(c.set_value_copy(&Value::U32(9)).is_err());
    /// ```
    pub fn register_enum(&self, name: &str, entries: &[EnumEntry]) -> Result<TypeId> {
        self.register_entries(name, EntryKind::Enum, entries)
    }

    /// Registers a flags type deriving the `flags` builtin.
    ///
    /// # Errors
    ///
    /// Same as [`Registry::register_enum`].
    pub fn register_flags(&self, name: &str, entries: &[EnumEntry]) -> Result<TypeId> {
        self.register_entries(name, EntryKind::Flags, entries)
    }

    /// The entry table of an enumeration or flags type.
    #[must_use]
    pub fn entry_table(&self, ty: TypeId) -> Option<Arc<EntryTable>> {
        self.inner.entry_tables.read().get(&ty).cloned()
    }

    fn register_entries(&self, name: &str, kind: EntryKind, entries: &[EnumEntry]) -> Result<TypeId> {
        let table = Arc::new(EntryTable::new(name, kind, entries)?);
        let parent = match kind {
            EntryKind::Enum => TypeId::ENUM,
            EntryKind::Flags => TypeId::FLAGS,
        };

        let ty = self.register(
            name,
            parent,
            TypeInfo::new()
                .with_class_size(self.class_size(parent))
                .with_variant_ops(Arc::new(EntryOps {
                    table: Arc::clone(&table),
                })),
            TypeFlags::empty(),
        )?;
        self.inner
            .entry_tables
            .write()
            .insert(ty, Arc::clone(&table));
        self.register_entry_converters(ty, &table)?;

        debug!("registered {:?} '{}' with {} entries", kind, name, entries.len());
        Ok(ty)
    }

    fn register_entry_converters(&self, ty: TypeId, table: &Arc<EntryTable>) -> Result<()> {
        let t = Arc::clone(table);
        self.register_converter(ty, TypeId::BOOL, move |src, dst| {
            let valid = t.contains(src.as_u32()?);
            dst.set_value_move(Value::Bool(valid))
        })?;

        let t = Arc::clone(table);
        self.register_converter(ty, TypeId::STRING, move |src, dst| {
            let text = t.format(src.as_u32()?)?;
            dst.set_value_move(Value::Str(text))
        })?;

        for target in INTEGER_TARGETS {
            let t = Arc::clone(table);
            self.register_converter(ty, target, move |src, dst| {
                let value = src.as_u32()?;
                let out = integer_value(value, target).ok_or_else(|| {
                    Error::conversion(
                        format!("{} value {value}", t.type_name),
                        dst.type_name().unwrap_or("integer"),
                    )
                })?;
                dst.set_value_move(out)
            })?;
        }

        let t = Arc::clone(table);
        self.register_converter(TypeId::STRING, ty, move |src: &Variant, dst: &mut Variant| {
            let value = t.parse(src.as_str()?)?;
            dst.set_value_move(Value::U32(value))
        })
    }
}
