//! Heap error types

use thiserror::Error;

/// Errors raised by the class registry, layouts and allocator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HeapError {
    /// Class id or name is not registered
    #[error("unknown class: {0}")]
    UnknownClass(String),

    /// A class with this name already exists
    #[error("duplicate class: {0}")]
    DuplicateClass(String),

    /// Class definition is malformed
    #[error("invalid class definition for {class}: {reason}")]
    InvalidDefinition {
        /// Class name
        class: String,
        /// What is wrong
        reason: String,
    },

    /// Abstract classes, interfaces and enums have no bare instances
    #[error("cannot instantiate {class}: {reason}")]
    NotInstantiable {
        /// Class name
        class: String,
        /// Why
        reason: &'static str,
    },

    /// No such instance field
    #[error("no field {field} on {class}")]
    NoSuchField {
        /// Class name
        class: String,
        /// Field name
        field: String,
    },

    /// Value does not fit the slot
    #[error("type mismatch on {class}.{field}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Class name
        class: String,
        /// Field name (or element index)
        field: String,
        /// Expected kind
        expected: String,
        /// Actual kind
        found: &'static str,
    },

    /// Object body has the wrong shape for the operation
    #[error("{class}: expected {expected} body")]
    WrongBody {
        /// Class name
        class: String,
        /// Expected body kind
        expected: &'static str,
    },

    /// Handle or element index lies outside the object
    #[error("index {index} out of bounds for length {len}")]
    OutOfBounds {
        /// Requested index
        index: usize,
        /// Actual length
        len: usize,
    },
}

impl HeapError {
    /// Create an invalid definition error
    pub fn invalid(class: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            class: class.into(),
            reason: reason.into(),
        }
    }

    /// Create a no-such-field error
    pub fn no_such_field(class: impl Into<String>, field: impl Into<String>) -> Self {
        Self::NoSuchField {
            class: class.into(),
            field: field.into(),
        }
    }
}

/// Result type for heap operations
pub type HeapResult<T> = std::result::Result<T, HeapError>;
