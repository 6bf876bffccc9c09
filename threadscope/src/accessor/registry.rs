//! The registered set of propagated accessors.

use super::{RequestAttributesAccessor, ThreadLocalAccessor};
use crate::errors::PropagationError;
use std::fmt;
use std::sync::Arc;

/// An ordered set of accessors with unique keys.
///
/// Built once during setup, then shared behind an `Arc`. Capture, restore and
/// reset all visit accessors in registration order.
#[derive(Clone, Default)]
pub struct AccessorRegistry {
    accessors: Vec<Arc<dyn ThreadLocalAccessor>>,
}

impl AccessorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding only the request attributes accessor.
    #[must_use]
    pub fn with_request_attributes() -> Self {
        Self {
            accessors: vec![Arc::new(RequestAttributesAccessor) as Arc<dyn ThreadLocalAccessor>],
        }
    }

    /// Registers an accessor.
    ///
    /// # Errors
    ///
    /// Returns `PropagationError::DuplicateAccessor` if the key is taken.
    pub fn register(&mut self, accessor: Arc<dyn ThreadLocalAccessor>) -> Result<(), PropagationError> {
        if self.contains(accessor.key()) {
            return Err(PropagationError::DuplicateAccessor(accessor.key().to_string()));
        }
        self.accessors.push(accessor);
        Ok(())
    }

    /// Registers an accessor, builder style.
    pub fn with(mut self, accessor: impl ThreadLocalAccessor + 'static) -> Result<Self, PropagationError> {
        self.register(Arc::new(accessor))?;
        Ok(self)
    }

    /// Returns the accessor registered under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Arc<dyn ThreadLocalAccessor>> {
        self.accessors.iter().find(|accessor| accessor.key() == key)
    }

    /// Checks if an accessor is registered under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterates accessors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ThreadLocalAccessor>> {
        self.accessors.iter()
    }

    /// Returns all keys in registration order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.accessors.iter().map(|a| a.key().to_string()).collect()
    }

    /// Returns the number of accessors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    /// Returns true if no accessors are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}

impl fmt::Debug for AccessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::attributes::REQUEST_ATTRIBUTES_KEY;
    use crate::accessor::ThreadLocalSlot;
    use std::cell::RefCell;

    thread_local! {
        static PRINCIPAL: RefCell<Option<String>> = const { RefCell::new(None) };
    }

    #[test]
    fn test_registry_preserves_order() {
        let registry = AccessorRegistry::with_request_attributes()
            .with(ThreadLocalSlot::new("principal", &PRINCIPAL))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.keys(),
            vec![REQUEST_ATTRIBUTES_KEY.to_string(), "principal".to_string()]
        );
        assert!(registry.contains("principal"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_registry_rejects_duplicate_keys() {
        let mut registry = AccessorRegistry::new();
        registry
            .register(Arc::new(ThreadLocalSlot::new("principal", &PRINCIPAL)))
            .unwrap();

        let err = registry
            .register(Arc::new(ThreadLocalSlot::new("principal", &PRINCIPAL)))
            .unwrap_err();
        assert!(matches!(err, PropagationError::DuplicateAccessor(ref key) if key == "principal"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_registry() {
        let registry = AccessorRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.iter().count(), 0);
    }
}
