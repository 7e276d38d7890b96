//! Error types for the `OxiType` runtime.
//!
//! Every registry, class-store and variant call that can fail returns
//! [`Result`]. Structural violations are never logged and swallowed; they are
//! handed back to the caller as one of the kinds below.

use oxitype_mem::AllocError;
use std::fmt;

/// Errors that can occur in the `OxiType` runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A derivation, flag, size or interface rule was violated, or the type
    /// does not support what was asked of it.
    InvalidType {
        /// What was wrong.
        reason: String,
    },

    /// A derived type named a parent that cannot serve as one.
    InvalidParent {
        /// Name of the type being registered.
        name: String,
    },

    /// A type with this name is already registered.
    DuplicateName {
        /// The conflicting name.
        name: String,
    },

    /// Unknown type, missing interface mapping or missing converter.
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// The type still has live classes, instances or dependants.
    InUse {
        /// Name of the type.
        name: String,
    },

    /// The operation is not in the type's supported set.
    Unsupported {
        /// The operation that was attempted.
        operation: &'static str,
        /// Name of the type it was attempted on.
        type_name: String,
    },

    /// No converter exists, or a conversion precondition failed.
    InvalidConversion {
        /// Source type name.
        from: String,
        /// Destination type name.
        to: String,
    },

    /// An index or byte range fell outside its container.
    OutOfRange {
        /// The offending index or offset.
        index: usize,
        /// The container's length.
        len: usize,
    },

    /// The injected allocator failed.
    MemoryAllocation {
        /// Requested size in bytes.
        size: usize,
    },
}

/// Fieldless discriminant of [`Error`], handy for matching in callers and
/// tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidType,
    InvalidParent,
    DuplicateName,
    NotFound,
    InUse,
    Unsupported,
    InvalidConversion,
    OutOfRange,
    MemoryAllocation,
}

impl Error {
    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidType { .. } => ErrorKind::InvalidType,
            Error::InvalidParent { .. } => ErrorKind::InvalidParent,
            Error::DuplicateName { .. } => ErrorKind::DuplicateName,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::InUse { .. } => ErrorKind::InUse,
            Error::Unsupported { .. } => ErrorKind::Unsupported,
            Error::InvalidConversion { .. } => ErrorKind::InvalidConversion,
            Error::OutOfRange { .. } => ErrorKind::OutOfRange,
            Error::MemoryAllocation { .. } => ErrorKind::MemoryAllocation,
        }
    }

    pub(crate) fn invalid_type(reason: impl Into<String>) -> Self {
        Error::InvalidType {
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound { what: what.into() }
    }

    pub(crate) fn unsupported(operation: &'static str, type_name: impl Into<String>) -> Self {
        Error::Unsupported {
            operation,
            type_name: type_name.into(),
        }
    }

    pub(crate) fn conversion(from: impl Into<String>, to: impl Into<String>) -> Self {
        Error::InvalidConversion {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidType { reason } => write!(f, "Invalid type: {reason}"),
            Error::InvalidParent { name } => {
                write!(f, "Invalid parent type for '{name}'")
            }
            Error::DuplicateName { name } => {
                write!(f, "Type name '{name}' is already registered")
            }
            Error::NotFound { what } => write!(f, "Not found: {what}"),
            Error::InUse { name } => write!(f, "Type '{name}' is still in use"),
            Error::Unsupported {
                operation,
                type_name,
            } => {
                write!(f, "Operation '{operation}' is not supported by type '{type_name}'")
            }
            Error::InvalidConversion { from, to } => {
                write!(f, "Cannot convert '{from}' to '{to}'")
            }
            Error::OutOfRange { index, len } => {
                write!(f, "Index {index} out of range for length {len}")
            }
            Error::MemoryAllocation { size } => {
                write!(f, "Memory allocation of {size} bytes failed")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<AllocError> for Error {
    fn from(err: AllocError) -> Self {
        match err {
            AllocError::OutOfMemory { size, .. } => Error::MemoryAllocation { size },
            AllocError::ZeroSized | AllocError::InvalidLayout => {
                Error::MemoryAllocation { size: 0 }
            }
        }
    }
}

/// Result type for `OxiType` runtime operations.
pub type Result<T> = std::result::Result<T, Error>;
