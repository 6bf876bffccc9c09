//! Error types for the threadscope crate.
//!
//! The taxonomy follows the propagation mechanism's layers: accessor writes,
//! snapshot restore/reset, scoped invocations, and the entry point.

use thiserror::Error;
use uuid::Uuid;

/// The main error type for threadscope operations.
#[derive(Debug, Error)]
pub enum ThreadscopeError {
    /// A propagation error occurred outside of an invocation.
    #[error("{0}")]
    Propagation(#[from] PropagationError),

    /// An invocation failed.
    #[error("{0}")]
    Invocation(#[from] InvocationError),

    /// The configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A task handling the request could not be joined.
    #[error("Request task failed: {0}")]
    Join(String),
}

impl From<serde_json::Error> for ThreadscopeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error raised by a thread-bound value accessor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessorError {
    /// The value handed to the accessor is not of the accessor's type.
    #[error("value for '{key}' is not a {expected}")]
    TypeMismatch {
        /// The accessor key.
        key: String,
        /// The expected type name.
        expected: &'static str,
    },

    /// The thread-bound storage has already been torn down on this thread.
    #[error("thread-bound storage for '{key}' is no longer available")]
    Unavailable {
        /// The accessor key.
        key: String,
    },

    /// The thread-bound storage is borrowed elsewhere on this thread.
    #[error("thread-bound storage for '{key}' is currently borrowed")]
    Busy {
        /// The accessor key.
        key: String,
    },

    /// The accessor rejected the write.
    #[error("write to '{key}' rejected: {message}")]
    Rejected {
        /// The accessor key.
        key: String,
        /// Why the write was rejected.
        message: String,
    },
}

impl AccessorError {
    /// Creates a rejection error.
    #[must_use]
    pub fn rejected(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Error raised while capturing, carrying, restoring or resetting context.
#[derive(Debug, Clone, Error)]
pub enum PropagationError {
    /// No carrier was in scope for the invocation.
    #[error("no propagation carrier in scope for operation '{operation}'")]
    MissingCarrier {
        /// The operation being invoked.
        operation: String,
    },

    /// The carrier in scope holds no context snapshot.
    #[error("no context snapshot in propagation carrier for operation '{operation}'")]
    MissingSnapshot {
        /// The operation being invoked.
        operation: String,
    },

    /// Writing a captured value onto the current thread failed.
    #[error("failed to restore '{key}': {source}")]
    Restore {
        /// The accessor key.
        key: String,
        /// The underlying accessor error.
        #[source]
        source: AccessorError,
    },

    /// Writing a prior value back onto the current thread failed.
    #[error("failed to reset '{key}': {source}")]
    Reset {
        /// The accessor key.
        key: String,
        /// The underlying accessor error.
        #[source]
        source: AccessorError,
    },

    /// The calling thread can no longer record restores, typically because it
    /// is shutting down.
    #[error("cannot record restore of context snapshot {snapshot_id} on this thread")]
    BracketUnavailable {
        /// The snapshot id.
        snapshot_id: Uuid,
    },

    /// A reset was requested for a snapshot that is not restored on this thread.
    #[error("context snapshot {snapshot_id} is not restored on this thread")]
    NotRestored {
        /// The snapshot id.
        snapshot_id: Uuid,
    },

    /// Two accessors were registered under the same key.
    #[error("accessor '{0}' is already registered")]
    DuplicateAccessor(String),
}

/// Error returned by a scoped invocation.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The context could not be propagated around the unit of work.
    #[error(transparent)]
    Propagation(#[from] PropagationError),

    /// The unit of work itself failed. The error is passed through unchanged.
    #[error(transparent)]
    Delegate(anyhow::Error),

    /// No unit of work is registered under the requested name.
    #[error("operation '{0}' is not registered")]
    UnknownOperation(String),

    /// The operation did not settle within its timeout.
    #[error("operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The operation name.
        operation: String,
        /// The configured timeout.
        timeout_ms: u64,
    },

    /// The task running the operation panicked or was aborted.
    #[error("operation '{operation}' task failed: {message}")]
    Join {
        /// The operation name.
        operation: String,
        /// The join error message.
        message: String,
    },
}

impl InvocationError {
    /// Classifies an error that surfaced from a deferred computation.
    ///
    /// Propagation failures raised by the per-poll bracket travel through the
    /// deferred future as `anyhow::Error`; they are recovered here so callers
    /// can still tell wiring defects from delegate failures.
    #[must_use]
    pub fn from_deferred(err: anyhow::Error) -> Self {
        match err.downcast::<PropagationError>() {
            Ok(propagation) => Self::Propagation(propagation),
            Err(other) => Self::Delegate(other),
        }
    }

    /// Returns true if this error was raised by the unit of work itself.
    #[must_use]
    pub const fn is_delegate(&self) -> bool {
        matches!(self, Self::Delegate(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessor_error_display() {
        let err = AccessorError::TypeMismatch {
            key: "locale".to_string(),
            expected: "alloc::string::String",
        };
        assert_eq!(
            err.to_string(),
            "value for 'locale' is not a alloc::string::String"
        );
    }

    #[test]
    fn test_restore_error_keeps_source() {
        let err = PropagationError::Restore {
            key: "X".to_string(),
            source: AccessorError::rejected("X", "read-only"),
        };
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source, Some("write to 'X' rejected: read-only".to_string()));
    }

    #[test]
    fn test_from_deferred_recovers_propagation_error() {
        let raw = anyhow::Error::new(PropagationError::MissingSnapshot {
            operation: "user".to_string(),
        });
        let err = InvocationError::from_deferred(raw);
        assert!(matches!(
            err,
            InvocationError::Propagation(PropagationError::MissingSnapshot { .. })
        ));
    }

    #[test]
    fn test_from_deferred_keeps_delegate_error() {
        let err = InvocationError::from_deferred(anyhow::anyhow!("boom"));
        assert!(err.is_delegate());
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_serde_error_converts() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: ThreadscopeError = parse.unwrap_err().into();
        assert!(matches!(err, ThreadscopeError::Serialization(_)));
    }
}
