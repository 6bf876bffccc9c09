//! Accessors for tests.

use crate::accessor::{BoundValue, ThreadLocalAccessor};
use crate::errors::AccessorError;
use parking_lot::Mutex;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

thread_local! {
    static VALUES: RefCell<HashMap<String, BoundValue>> = RefCell::new(HashMap::new());
}

/// An accessor over a per-thread map, keyed by the accessor key.
///
/// Two accessors with the same key see the same binding on a given thread,
/// so a test can register one instance and inspect the value through another.
#[derive(Debug, Clone)]
pub struct LocalValueAccessor {
    key: String,
}

impl LocalValueAccessor {
    /// Creates an accessor for `key`.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Returns the accessor key.
    #[must_use]
    pub fn key_name(&self) -> &str {
        &self.key
    }

    /// Binds `value` on the calling thread.
    pub fn bind(&self, value: impl Any + Send + Sync) {
        VALUES.with(|values| {
            values
                .borrow_mut()
                .insert(self.key.clone(), Arc::new(value));
        });
    }

    /// Clears the binding on the calling thread.
    pub fn clear(&self) {
        VALUES.with(|values| {
            values.borrow_mut().remove(&self.key);
        });
    }

    /// Returns true if a value is bound on the calling thread.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        VALUES.with(|values| values.borrow().contains_key(&self.key))
    }

    /// Returns the bound value downcast to `T`.
    #[must_use]
    pub fn get<T: Clone + 'static>(&self) -> Option<T> {
        self.get_value()
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    /// Returns the bound value as a `String`.
    #[must_use]
    pub fn get_str(&self) -> Option<String> {
        self.get::<String>()
    }
}

impl ThreadLocalAccessor for LocalValueAccessor {
    fn key(&self) -> &str {
        &self.key
    }

    fn get_value(&self) -> Option<BoundValue> {
        VALUES.with(|values| values.borrow().get(&self.key).cloned())
    }

    fn set_value(&self, value: Option<BoundValue>) -> Result<(), AccessorError> {
        VALUES.with(|values| {
            let mut values = values.borrow_mut();
            match value {
                Some(value) => {
                    values.insert(self.key.clone(), value);
                }
                None => {
                    values.remove(&self.key);
                }
            }
        });
        Ok(())
    }
}

/// Wraps an accessor and records how it is used.
///
/// Write attempts are counted whether or not they succeed. While
/// [`fail_writes`](Self::fail_writes) is active, writes are rejected without
/// reaching the wrapped accessor.
pub struct RecordingAccessor {
    inner: Box<dyn ThreadLocalAccessor>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    failure: Mutex<Option<String>>,
}

impl RecordingAccessor {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: impl ThreadLocalAccessor + 'static) -> Self {
        Self {
            inner: Box::new(inner),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            failure: Mutex::new(None),
        }
    }

    /// Rejects all further writes with `message`.
    pub fn fail_writes(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    /// Lets writes through again.
    pub fn allow_writes(&self) {
        *self.failure.lock() = None;
    }

    /// Returns the number of reads.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Returns the number of attempted writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Resets call tracking.
    pub fn reset_counts(&self) {
        self.reads.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
    }
}

impl ThreadLocalAccessor for RecordingAccessor {
    fn key(&self) -> &str {
        self.inner.key()
    }

    fn get_value(&self) -> Option<BoundValue> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_value()
    }

    fn set_value(&self, value: Option<BoundValue>) -> Result<(), AccessorError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failure.lock().clone() {
            return Err(AccessorError::rejected(self.inner.key(), message));
        }
        self.inner.set_value(value)
    }
}

impl std::fmt::Debug for RecordingAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingAccessor")
            .field("key", &self.inner.key())
            .field("reads", &self.read_count())
            .field("writes", &self.write_count())
            .finish()
    }
}
