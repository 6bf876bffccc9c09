//! The explicit propagation carrier.
//!
//! A [`Carrier`] is an immutable key/value map attached to an async task. It
//! is how a request's [`ContextSnapshot`](crate::snapshot::ContextSnapshot)
//! and other cross-cutting values travel across thread hops without relying
//! on thread-bound storage for the transport itself. Updating a carrier
//! returns a new carrier; existing values are never mutated.

mod scope;

pub use scope::{spawn_with_carrier, WithCarrier};

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

type CarrierValue = Arc<dyn Any + Send + Sync>;

/// A typed key into a [`Carrier`].
pub struct CarrierKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> CarrierKey<T> {
    /// Creates a key with the given name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Returns the key name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for CarrierKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for CarrierKey<T> {}

impl<T> fmt::Debug for CarrierKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CarrierKey").field(&self.name).finish()
    }
}

/// An immutable, forward-propagated key/value map.
///
/// Cloning is cheap: clones share the underlying map.
#[derive(Clone, Default)]
pub struct Carrier {
    entries: Arc<HashMap<&'static str, CarrierValue>>,
}

impl Carrier {
    /// Creates an empty carrier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new carrier with `key` set to `value`.
    #[must_use]
    pub fn with<T: Send + Sync + 'static>(&self, key: &CarrierKey<T>, value: T) -> Self {
        self.with_arc(key, Arc::new(value))
    }

    /// Returns a new carrier with `key` set to an already shared value.
    #[must_use]
    pub fn with_arc<T: Send + Sync + 'static>(&self, key: &CarrierKey<T>, value: Arc<T>) -> Self {
        let mut entries = HashMap::clone(&self.entries);
        entries.insert(key.name, value as CarrierValue);
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Returns a new carrier without `key`.
    #[must_use]
    pub fn without<T>(&self, key: &CarrierKey<T>) -> Self {
        if !self.entries.contains_key(key.name) {
            return self.clone();
        }
        let mut entries = HashMap::clone(&self.entries);
        entries.remove(key.name);
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Returns the value stored under `key`.
    ///
    /// A value stored under the same name with a different type reads as
    /// absent.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, key: &CarrierKey<T>) -> Option<Arc<T>> {
        self.entries
            .get(key.name)
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    /// Checks if a value is stored under `key`.
    #[must_use]
    pub fn contains<T>(&self, key: &CarrierKey<T>) -> bool {
        self.entries.contains_key(key.name)
    }

    /// Returns all key names.
    #[must_use]
    pub fn keys(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the carrier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the carrier attached to the current task, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        scope::current()
    }

    /// Runs `future` with this carrier attached.
    pub fn scope<F: std::future::Future>(self, future: F) -> tokio::task::futures::TaskLocalFuture<Self, F> {
        scope::attach(self, future)
    }

    /// Runs `f` synchronously with this carrier attached.
    pub fn sync_scope<R>(self, f: impl FnOnce() -> R) -> R {
        scope::attach_sync(self, f)
    }
}

impl fmt::Debug for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = self.keys();
        keys.sort_unstable();
        f.debug_struct("Carrier").field("keys", &keys).finish()
    }
}
