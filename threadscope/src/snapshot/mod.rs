//! Capturing thread-bound values and re-materializing them on other threads.
//!
//! A [`ContextSnapshot`] is captured once, on the thread that received a
//! request, and then restored around every piece of work that runs on behalf
//! of that request, on whichever thread it lands. Each restore is paired with
//! a reset on the same thread that puts back exactly what was bound before.

mod frames;
mod guard;
#[cfg(test)]
mod snapshot_tests;

pub use frames::open_brackets;
pub use guard::RestoreGuard;

use crate::accessor::{AccessorRegistry, BoundValue};
use crate::carrier::{Carrier, CarrierKey};
use crate::errors::PropagationError;
use chrono::{DateTime, Utc};
use frames::{PriorFrame, Release};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Carrier key under which the request's snapshot travels.
pub const SNAPSHOT_KEY: CarrierKey<ContextSnapshot> =
    CarrierKey::new("threadscope.context_snapshot");

/// An immutable capture of the registered thread-bound values.
pub struct ContextSnapshot {
    id: Uuid,
    captured_at: DateTime<Utc>,
    accessors: Arc<AccessorRegistry>,
    values: HashMap<String, Option<BoundValue>>,
}

impl ContextSnapshot {
    /// Captures the calling thread's values for every registered accessor.
    ///
    /// Accessors with nothing bound are captured as absent.
    #[must_use]
    pub fn capture(accessors: Arc<AccessorRegistry>) -> Self {
        let values = accessors
            .iter()
            .map(|accessor| (accessor.key().to_string(), accessor.get_value()))
            .collect();
        let snapshot = Self {
            id: Uuid::new_v4(),
            captured_at: Utc::now(),
            accessors,
            values,
        };

        debug!(
            snapshot_id = %snapshot.id,
            keys = ?snapshot.present_keys(),
            "Captured context snapshot"
        );
        snapshot
    }

    /// Returns the snapshot from `carrier`, if one was installed.
    #[must_use]
    pub fn from_carrier(carrier: &Carrier) -> Option<Arc<Self>> {
        carrier.get(&SNAPSHOT_KEY)
    }

    /// Returns a copy of `carrier` with this snapshot installed.
    #[must_use]
    pub fn install(self: &Arc<Self>, carrier: &Carrier) -> Carrier {
        carrier.with_arc(&SNAPSHOT_KEY, Arc::clone(self))
    }

    /// Returns the unique snapshot ID.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Returns when the snapshot was captured.
    #[must_use]
    pub const fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Returns the accessors this snapshot was captured with.
    #[must_use]
    pub fn accessors(&self) -> &Arc<AccessorRegistry> {
        &self.accessors
    }

    /// Returns the captured value for `key`.
    ///
    /// `None` both for keys captured as absent and for unknown keys.
    #[must_use]
    pub fn captured(&self, key: &str) -> Option<&BoundValue> {
        self.values.get(key).and_then(Option::as_ref)
    }

    /// Returns the captured value for `key` downcast to `T`.
    #[must_use]
    pub fn captured_as<T: 'static>(&self, key: &str) -> Option<&T> {
        self.captured(key).and_then(|value| value.downcast_ref::<T>())
    }

    /// Returns the keys that had a value bound at capture time.
    #[must_use]
    pub fn present_keys(&self) -> Vec<String> {
        self.accessors
            .iter()
            .map(|accessor| accessor.key())
            .filter(|key| self.captured(key).is_some())
            .map(ToString::to_string)
            .collect()
    }

    /// Returns true if this snapshot is restored on the calling thread.
    #[must_use]
    pub fn is_restored_on_current_thread(&self) -> bool {
        frames::is_open(self.id)
    }

    /// Writes the captured values onto the calling thread.
    ///
    /// The values bound before the restore are remembered on this thread only
    /// and written back by [`reset_on_current_thread`](Self::reset_on_current_thread).
    /// Restoring a snapshot whose bracket is the innermost one open on this
    /// thread re-applies the captured values but keeps the original prior
    /// values, so as many resets as restores are needed. If another snapshot
    /// was restored since, a new bracket is opened instead, and its reset
    /// puts back that other snapshot's values.
    ///
    /// # Errors
    ///
    /// Returns `PropagationError::Restore` if an accessor rejects a write, or
    /// `PropagationError::BracketUnavailable` if the thread can no longer
    /// record the restore. The accessors written are rolled back and no reset
    /// is owed.
    pub fn restore_on_current_thread(&self) -> Result<(), PropagationError> {
        if frames::reenter(self.id) {
            if let Err(err) = self.write_captured() {
                let _ = frames::release(self.id);
                return Err(err);
            }
            debug!(snapshot_id = %self.id, "Re-entered restored context snapshot");
            return Ok(());
        }

        let priors: Vec<Option<BoundValue>> =
            self.accessors.iter().map(|accessor| accessor.get_value()).collect();

        if let Err((written, err)) = self.write_captured_counting() {
            self.roll_back(written, &priors);
            return Err(err);
        }

        let frame = PriorFrame {
            snapshot_id: self.id,
            depth: 1,
            priors,
        };
        if let Err(frame) = frames::push(frame) {
            self.roll_back(frame.priors.len(), &frame.priors);
            return Err(PropagationError::BracketUnavailable {
                snapshot_id: self.id,
            });
        }
        debug!(snapshot_id = %self.id, "Restored context snapshot");
        Ok(())
    }

    /// Writes back the values bound before the matching restore.
    ///
    /// # Errors
    ///
    /// Returns `PropagationError::NotRestored` if there is no matching restore
    /// on this thread, or the first `PropagationError::Reset` after attempting
    /// every accessor.
    pub fn reset_on_current_thread(&self) -> Result<(), PropagationError> {
        let (frame, out_of_order) = match frames::release(self.id) {
            Release::NotRestored => {
                return Err(PropagationError::NotRestored {
                    snapshot_id: self.id,
                })
            }
            Release::Nested { remaining } => {
                debug!(snapshot_id = %self.id, remaining, "Left nested context restore");
                return Ok(());
            }
            Release::Released {
                frame,
                out_of_order,
            } => (frame, out_of_order),
        };

        if out_of_order {
            warn!(
                snapshot_id = %self.id,
                "Context reset out of order; a later restore on this thread is still open"
            );
        }

        let mut first_failure = None;
        for (accessor, prior) in self.accessors.iter().zip(frame.priors) {
            if let Err(source) = accessor.set_value(prior) {
                first_failure.get_or_insert(PropagationError::Reset {
                    key: accessor.key().to_string(),
                    source,
                });
            }
        }

        debug!(snapshot_id = %self.id, "Reset context snapshot");
        first_failure.map_or(Ok(()), Err)
    }

    /// Restores the snapshot and returns a guard that resets it.
    ///
    /// # Errors
    ///
    /// Returns the restore failure; nothing is left restored in that case.
    pub fn restore(&self) -> Result<RestoreGuard<'_>, PropagationError> {
        self.restore_on_current_thread()?;
        Ok(RestoreGuard::new(self))
    }

    /// Runs `f` with the snapshot restored on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the restore or reset failure. A reset failure discards `f`'s
    /// value, because the thread was left dirty.
    pub fn scope<R>(&self, f: impl FnOnce() -> R) -> Result<R, PropagationError> {
        let guard = self.restore()?;
        let value = f();
        guard.reset()?;
        Ok(value)
    }

    /// Writes `priors` back to the first `written` accessors.
    fn roll_back(&self, written: usize, priors: &[Option<BoundValue>]) {
        for (accessor, prior) in self.accessors.iter().take(written).zip(priors) {
            if let Err(rollback) = accessor.set_value(prior.clone()) {
                warn!(
                    snapshot_id = %self.id,
                    key = accessor.key(),
                    error = %rollback,
                    "Rollback of partial restore failed"
                );
            }
        }
    }

    fn write_captured(&self) -> Result<(), PropagationError> {
        self.write_captured_counting().map_err(|(_, err)| err)
    }

    /// Writes captured values in registration order, stopping at the first
    /// failure. On failure, returns how many accessors were written.
    fn write_captured_counting(&self) -> Result<(), (usize, PropagationError)> {
        for (index, accessor) in self.accessors.iter().enumerate() {
            let value = self.values.get(accessor.key()).cloned().flatten();
            accessor.set_value(value).map_err(|source| {
                (
                    index,
                    PropagationError::Restore {
                        key: accessor.key().to_string(),
                        source,
                    },
                )
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContextSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSnapshot")
            .field("id", &self.id)
            .field("captured_at", &self.captured_at)
            .field("keys", &self.accessors.keys())
            .field("present", &self.present_keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::LocalValueAccessor;

    fn registry(keys: &[&str]) -> Arc<AccessorRegistry> {
        let mut registry = AccessorRegistry::new();
        for key in keys {
            registry.register(Arc::new(LocalValueAccessor::new(*key))).unwrap();
        }
        Arc::new(registry)
    }

    #[test]
    fn test_capture_records_present_and_absent() {
        let x = LocalValueAccessor::new("X");
        x.bind("alpha".to_string());

        let snapshot = ContextSnapshot::capture(registry(&["X", "Y"]));

        assert_eq!(snapshot.captured_as::<String>("X"), Some(&"alpha".to_string()));
        assert!(snapshot.captured("Y").is_none());
        assert_eq!(snapshot.present_keys(), vec!["X".to_string()]);
        x.clear();
    }

    #[test]
    fn test_restore_then_reset_is_identity() {
        let x = LocalValueAccessor::new("X");
        let y = LocalValueAccessor::new("Y");
        x.bind("captured".to_string());
        let snapshot = ContextSnapshot::capture(registry(&["X", "Y"]));

        x.bind("before".to_string());
        y.bind(3_u8);

        snapshot.restore_on_current_thread().unwrap();
        assert_eq!(x.get_str(), Some("captured".to_string()));
        assert!(y.get::<u8>().is_none());

        snapshot.reset_on_current_thread().unwrap();
        assert_eq!(x.get_str(), Some("before".to_string()));
        assert_eq!(y.get::<u8>(), Some(3));
        assert_eq!(open_brackets(), 0);
    }

    #[test]
    fn test_reset_without_restore_fails() {
        let snapshot = ContextSnapshot::capture(registry(&["X"]));
        let err = snapshot.reset_on_current_thread().unwrap_err();
        assert!(matches!(err, PropagationError::NotRestored { snapshot_id } if snapshot_id == snapshot.id()));
    }

    #[test]
    fn test_guard_resets_on_drop() {
        let x = LocalValueAccessor::new("X");
        x.bind("captured".to_string());
        let snapshot = ContextSnapshot::capture(registry(&["X"]));
        x.clear();

        {
            let guard = snapshot.restore().unwrap();
            assert!(guard.snapshot().is_restored_on_current_thread());
            assert_eq!(x.get_str(), Some("captured".to_string()));
        }

        assert_eq!(x.get_str(), None);
        assert!(!snapshot.is_restored_on_current_thread());
    }

    #[test]
    fn test_scope_returns_value() {
        let x = LocalValueAccessor::new("X");
        x.bind("captured".to_string());
        let snapshot = ContextSnapshot::capture(registry(&["X"]));
        x.bind("outer".to_string());

        let seen = snapshot.scope(|| x.get_str()).unwrap();

        assert_eq!(seen, Some("captured".to_string()));
        assert_eq!(x.get_str(), Some("outer".to_string()));
        x.clear();
    }

    #[test]
    fn test_install_and_read_from_carrier() {
        let snapshot = Arc::new(ContextSnapshot::capture(registry(&["X"])));
        let carrier = snapshot.install(&Carrier::new());

        let found = ContextSnapshot::from_carrier(&carrier).unwrap();
        assert_eq!(found.id(), snapshot.id());
        assert!(ContextSnapshot::from_carrier(&Carrier::new()).is_none());
    }
}
