//! Clone error types

use replica_heap::HeapError;
use thiserror::Error;

/// Boxed error raised by foreign clone delegates
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Clone errors. Every error aborts the whole clone operation.
#[derive(Debug, Error)]
pub enum CloneError {
    /// Invalid cloner setup (e.g. requested backend unavailable)
    #[error("ConfigError: {0}")]
    Config(String),

    /// A class could not be introspected
    #[error("IntrospectionError: cannot introspect {class}: {source}")]
    Introspection {
        /// Class name
        class: String,
        /// Underlying failure
        #[source]
        source: HeapError,
    },

    /// Bare-instance allocation failed
    #[error("AllocationError: cannot allocate {class}: {source}")]
    Allocation {
        /// Class name
        class: String,
        /// Underlying failure
        #[source]
        source: HeapError,
    },

    /// Reading or writing a field failed
    #[error("AccessError: {class}.{field} on object {object:#x}: {source}")]
    Access {
        /// Class name
        class: String,
        /// Field name or element index
        field: String,
        /// Address of the object being read or written
        object: usize,
        /// Underlying failure
        #[source]
        source: HeapError,
    },

    /// A self-copy method or clone implementor failed with a foreign or
    /// heap error
    #[error("DelegateError: cloning {class} failed: {source}")]
    Delegate {
        /// Class name
        class: String,
        /// Underlying failure
        #[source]
        source: BoxError,
    },

    /// Heap error outside any field context
    #[error(transparent)]
    Heap(#[from] HeapError),
}

impl CloneError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an access error for a field of an object
    pub fn access(
        class: impl Into<String>,
        field: impl Into<String>,
        object: usize,
        source: HeapError,
    ) -> Self {
        Self::Access {
            class: class.into(),
            field: field.into(),
            object,
            source,
        }
    }

    /// Wrap a delegate failure, passing clone errors through unchanged
    pub fn delegate(class: impl Into<String>, source: BoxError) -> Self {
        match source.downcast::<CloneError>() {
            Ok(err) => *err,
            Err(source) => Self::Delegate {
                class: class.into(),
                source,
            },
        }
    }
}

/// Result type for clone operations
pub type CloneResult<T> = std::result::Result<T, CloneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delegate_passes_clone_errors_through() {
        let inner: BoxError = Box::new(CloneError::config("boom"));
        assert!(matches!(
            CloneError::delegate("Thing", inner),
            CloneError::Config(msg) if msg == "boom"
        ));

        let foreign: BoxError = "disk on fire".into();
        let err = CloneError::delegate("Thing", foreign);
        assert!(matches!(err, CloneError::Delegate { ref class, .. } if class == "Thing"));
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn test_access_error_names_field_and_object() {
        let err = CloneError::access(
            "Node",
            "next",
            0x10,
            HeapError::no_such_field("Node", "next"),
        );
        let msg = err.to_string();
        assert!(msg.contains("Node.next"));
        assert!(msg.contains("0x10"));
    }
}
