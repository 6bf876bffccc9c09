//! Thread-bound request attributes.
//!
//! A request handler binds a [`RequestAttributes`] map to the thread that
//! received the request; application code anywhere on that thread reads it
//! back with [`current`]. [`RequestAttributesAccessor`] exposes the holder to
//! the propagation machinery so the attributes follow the request across
//! thread hops.

use super::{BoundValue, ThreadLocalAccessor};
use crate::errors::AccessorError;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

/// The key the request attributes accessor is registered under.
pub const REQUEST_ATTRIBUTES_KEY: &str = "RequestAttributes";

thread_local! {
    static CURRENT: RefCell<Option<Arc<RequestAttributes>>> = const { RefCell::new(None) };
}

/// Request-scoped attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestAttributes {
    #[serde(flatten)]
    attributes: HashMap<String, serde_json::Value>,
}

impl RequestAttributes {
    /// Creates an empty attribute map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Returns an attribute by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }

    /// Returns all attribute names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.attributes.keys().cloned().collect()
    }

    /// Returns the number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns true if there are no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Binds `attributes` to the calling thread, replacing any previous binding.
pub fn bind(attributes: RequestAttributes) {
    CURRENT.with(|current| *current.borrow_mut() = Some(Arc::new(attributes)));
}

/// Clears the calling thread's binding.
pub fn clear() {
    CURRENT.with(|current| *current.borrow_mut() = None);
}

/// Returns the attributes bound to the calling thread.
#[must_use]
pub fn current() -> Option<Arc<RequestAttributes>> {
    CURRENT
        .try_with(|current| current.borrow().clone())
        .ok()
        .flatten()
}

/// Returns one attribute from the calling thread's binding.
#[must_use]
pub fn get_attribute(name: &str) -> Option<serde_json::Value> {
    current().and_then(|attributes| attributes.get(name).cloned())
}

/// Accessor for the thread-bound [`RequestAttributes`].
///
/// Values cross threads as `Arc<RequestAttributes>`; restoring a snapshot
/// shares the captured map rather than copying it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestAttributesAccessor;

impl ThreadLocalAccessor for RequestAttributesAccessor {
    fn key(&self) -> &str {
        REQUEST_ATTRIBUTES_KEY
    }

    fn get_value(&self) -> Option<BoundValue> {
        current().map(|attributes| attributes as BoundValue)
    }

    fn set_value(&self, value: Option<BoundValue>) -> Result<(), AccessorError> {
        let attributes = match value {
            None => None,
            Some(value) => Some(value.downcast::<RequestAttributes>().map_err(|_| {
                AccessorError::TypeMismatch {
                    key: REQUEST_ATTRIBUTES_KEY.to_string(),
                    expected: "RequestAttributes",
                }
            })?),
        };

        CURRENT
            .try_with(|current| match current.try_borrow_mut() {
                Ok(mut slot) => {
                    *slot = attributes;
                    Ok(())
                }
                Err(_) => Err(AccessorError::Busy {
                    key: REQUEST_ATTRIBUTES_KEY.to_string(),
                }),
            })
            .unwrap_or_else(|_| {
                Err(AccessorError::Unavailable {
                    key: REQUEST_ATTRIBUTES_KEY.to_string(),
                })
            })
    }
}
