//! Accessors over `thread_local!` slots and closures.

use super::{BoundValue, ThreadLocalAccessor};
use crate::errors::AccessorError;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::thread::LocalKey;

/// A typed accessor over a `thread_local!` slot.
///
/// ```rust,ignore
/// thread_local! {
///     static LOCALE: RefCell<Option<String>> = const { RefCell::new(None) };
/// }
///
/// let locale = ThreadLocalSlot::new("locale", &LOCALE);
/// locale.set(Some("en-GB".to_string()))?;
/// ```
pub struct ThreadLocalSlot<T: 'static> {
    key: String,
    slot: &'static LocalKey<RefCell<Option<T>>>,
}

impl<T> ThreadLocalSlot<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an accessor for `slot` registered under `key`.
    #[must_use]
    pub fn new(key: impl Into<String>, slot: &'static LocalKey<RefCell<Option<T>>>) -> Self {
        Self {
            key: key.into(),
            slot,
        }
    }

    /// Returns a clone of the value bound on the calling thread.
    ///
    /// A slot that is torn down or mutably borrowed reads as unbound.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.slot
            .try_with(|cell| cell.try_borrow().ok().and_then(|value| value.clone()))
            .ok()
            .flatten()
    }

    /// Binds or clears the value on the calling thread.
    pub fn set(&self, value: Option<T>) -> Result<(), AccessorError> {
        let written = self.slot.try_with(|cell| match cell.try_borrow_mut() {
            Ok(mut slot) => {
                *slot = value;
                Ok(())
            }
            Err(_) => Err(AccessorError::Busy {
                key: self.key.clone(),
            }),
        });

        match written {
            Ok(result) => result,
            Err(_) => Err(AccessorError::Unavailable {
                key: self.key.clone(),
            }),
        }
    }
}

impl<T> ThreadLocalAccessor for ThreadLocalSlot<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn key(&self) -> &str {
        &self.key
    }

    fn get_value(&self) -> Option<BoundValue> {
        self.get().map(|value| Arc::new(value) as BoundValue)
    }

    fn set_value(&self, value: Option<BoundValue>) -> Result<(), AccessorError> {
        let typed = match value {
            None => None,
            Some(value) => Some((*value).downcast_ref::<T>().cloned().ok_or_else(|| {
                AccessorError::TypeMismatch {
                    key: self.key.clone(),
                    expected: std::any::type_name::<T>(),
                }
            })?),
        };
        self.set(typed)
    }
}

impl<T: 'static> fmt::Debug for ThreadLocalSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadLocalSlot")
            .field("key", &self.key)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

type Getter = Box<dyn Fn() -> Option<BoundValue> + Send + Sync>;
type Setter = Box<dyn Fn(Option<BoundValue>) -> Result<(), AccessorError> + Send + Sync>;

/// An accessor built from a getter and a fallible setter.
///
/// Useful when the thread-bound storage is owned by another library and only
/// reachable through its own functions.
pub struct FnAccessor {
    key: String,
    getter: Getter,
    setter: Setter,
}

impl FnAccessor {
    /// Creates a new closure-based accessor.
    pub fn new<G, S>(key: impl Into<String>, getter: G, setter: S) -> Self
    where
        G: Fn() -> Option<BoundValue> + Send + Sync + 'static,
        S: Fn(Option<BoundValue>) -> Result<(), AccessorError> + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            getter: Box::new(getter),
            setter: Box::new(setter),
        }
    }
}

impl ThreadLocalAccessor for FnAccessor {
    fn key(&self) -> &str {
        &self.key
    }

    fn get_value(&self) -> Option<BoundValue> {
        (self.getter)()
    }

    fn set_value(&self, value: Option<BoundValue>) -> Result<(), AccessorError> {
        (self.setter)(value)
    }
}

impl fmt::Debug for FnAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAccessor").field("key", &self.key).finish()
    }
}
