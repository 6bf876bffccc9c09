//! Scoped restore guard.

use super::ContextSnapshot;
use std::marker::PhantomData;
use tracing::warn;

/// Keeps a snapshot restored on the current thread until reset or dropped.
///
/// The guard is not `Send`: the reset has to happen on the thread that
/// performed the restore. Prefer [`RestoreGuard::reset`], which reports
/// failures; the `Drop` fallback covers panics and early returns and can only
/// log them.
#[must_use = "dropping the guard resets the snapshot immediately"]
pub struct RestoreGuard<'a> {
    snapshot: &'a ContextSnapshot,
    armed: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl<'a> RestoreGuard<'a> {
    pub(super) const fn new(snapshot: &'a ContextSnapshot) -> Self {
        Self {
            snapshot,
            armed: true,
            _thread_bound: PhantomData,
        }
    }

    /// Returns the restored snapshot.
    #[must_use]
    pub const fn snapshot(&self) -> &ContextSnapshot {
        self.snapshot
    }

    /// Resets the thread to its state before the restore.
    ///
    /// # Errors
    ///
    /// Returns the first accessor failure; every accessor is still attempted.
    pub fn reset(mut self) -> Result<(), crate::errors::PropagationError> {
        self.armed = false;
        self.snapshot.reset_on_current_thread()
    }
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = self.snapshot.reset_on_current_thread() {
            warn!(
                snapshot_id = %self.snapshot.id(),
                error = %err,
                "Context reset failed while unwinding"
            );
        }
    }
}
