//! Accessors over thread-bound values.
//!
//! An accessor is the only way the propagation machinery touches ambient
//! thread-bound storage: it reads the value bound on the calling thread and
//! writes (or clears) it. The set of accessors is registered up front in an
//! [`AccessorRegistry`] and shared read-only by every request.

pub mod attributes;
mod registry;
mod slot;

pub use attributes::{RequestAttributes, RequestAttributesAccessor};
pub use registry::AccessorRegistry;
pub use slot::{FnAccessor, ThreadLocalSlot};

use crate::errors::AccessorError;
use std::any::Any;
use std::sync::Arc;

/// A type-erased value bound to a thread.
pub type BoundValue = Arc<dyn Any + Send + Sync>;

/// Capability contract for one kind of thread-bound value.
///
/// Implementations operate on the calling thread only and need no
/// cross-thread synchronization.
pub trait ThreadLocalAccessor: Send + Sync {
    /// Returns the stable key identifying this kind of value.
    fn key(&self) -> &str;

    /// Returns the value bound on the calling thread, if any.
    fn get_value(&self) -> Option<BoundValue>;

    /// Binds `value` on the calling thread, or clears the binding for `None`.
    fn set_value(&self, value: Option<BoundValue>) -> Result<(), AccessorError>;
}

impl<A: ThreadLocalAccessor + ?Sized> ThreadLocalAccessor for Arc<A> {
    fn key(&self) -> &str {
        (**self).key()
    }

    fn get_value(&self) -> Option<BoundValue> {
        (**self).get_value()
    }

    fn set_value(&self, value: Option<BoundValue>) -> Result<(), AccessorError> {
        (**self).set_value(value)
    }
}
