//! Casting a class to one of its interfaces.
//!
//! A class carries a small flattened table of every interface reachable from
//! it (its own map entries, interfaces those map in turn, and inherited ones),
//! each with the byte range its default class was copied into. Casting is a
//! linear search of that table; no offsets are recomputed per call.
//!
//! [`Registry::resolve_interface`](crate::Registry::resolve_interface)
//! answers the same question from metadata alone, without building a class.

use crate::error::{Error, Result};
use crate::runtime::class::Class;
use crate::runtime::query::ClassInterface;
use crate::runtime::types::TypeId;
use std::fmt;

/// A borrowed view of one interface's bytes inside a class.
///
/// Offsets passed to [`read`](InterfaceRef::read) and
/// [`write`](InterfaceRef::write) are relative to the interface and bounded by
/// the interface's class size.
pub struct InterfaceRef<'a> {
    class: &'a Class,
    location: ClassInterface,
}

impl<'a> InterfaceRef<'a> {
    /// The interface type.
    #[must_use]
    pub fn interface(&self) -> TypeId {
        self.location.interface
    }

    /// Offset of the interface inside the class.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.location.offset
    }

    /// Size of the interface's class.
    #[must_use]
    pub fn size(&self) -> usize {
        self.location.size
    }

    /// The class this view points into.
    #[must_use]
    pub fn class(&self) -> &'a Class {
        self.class
    }

    /// Copy of the interface's bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let data = self.class.data();
        data.bytes()[self.location.offset..self.location.offset + self.location.size].to_vec()
    }

    /// Reads a `T` at `offset` within the interface.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` if the read leaves the interface.
    pub fn read<T: Copy>(&self, offset: usize) -> Result<T> {
        let at = self.locate(offset, size_of::<T>())?;
        self.class.data().read(at)
    }

    /// Writes a `T` at `offset` within the interface.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` if the write leaves the interface.
    pub fn write<T: Copy>(&self, offset: usize, value: T) -> Result<()> {
        let at = self.locate(offset, size_of::<T>())?;
        self.class.data_mut().write(at, value)
    }

    fn locate(&self, offset: usize, size: usize) -> Result<usize> {
        match offset.checked_add(size) {
            Some(end) if end <= self.location.size => Ok(self.location.offset + offset),
            _ => Err(Error::OutOfRange {
                index: offset,
                len: self.location.size,
            }),
        }
    }
}

impl fmt::Debug for InterfaceRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceRef")
            .field("class", &self.class.name())
            .field("interface", &self.location.interface)
            .field("offset", &self.location.offset)
            .field("size", &self.location.size)
            .finish()
    }
}

impl Class {
    /// Casts this class to interface `iface`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the class does not map `iface`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use oxitype::{Registry, TypeId};
    ///
    /// let registry = Registry::new();
    /// let class = registry.class_ref(TypeId::STRING).unwrap();
    /// let iface = class.interface(TypeId::IVARIANT).unwrap();
    /// assert_eq!(iface.offset(), 0);
    /// assert!(class.interface(TypeId::INSTANCE).is_err());
    /// ```
    pub fn interface(&self, iface: TypeId) -> Result<InterfaceRef<'_>> {
        let location = self.find_interface(iface).ok_or_else(|| {
            Error::not_found(format!("interface {iface} in class '{}'", self.name()))
        })?;
        Ok(InterfaceRef {
            class: self,
            location,
        })
    }
}
