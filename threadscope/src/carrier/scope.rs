//! Attaching carriers to tasks.
//!
//! The carrier lives in a tokio task-local slot. A task-local belongs to the
//! future, not to the thread polling it, so it follows the task wherever the
//! scheduler moves it. It does not follow `tokio::spawn`: whoever spawns a new
//! task has to attach the carrier again.

use super::Carrier;
use crate::errors::PropagationError;
use std::future::Future;
use tokio::task::futures::TaskLocalFuture;
use tokio::task::JoinHandle;

tokio::task_local! {
    static CURRENT_CARRIER: Carrier;
}

pub(super) fn current() -> Option<Carrier> {
    CURRENT_CARRIER.try_with(Clone::clone).ok()
}

pub(super) fn attach<F: Future>(carrier: Carrier, future: F) -> TaskLocalFuture<Carrier, F> {
    CURRENT_CARRIER.scope(carrier, future)
}

pub(super) fn attach_sync<R>(carrier: Carrier, f: impl FnOnce() -> R) -> R {
    CURRENT_CARRIER.sync_scope(carrier, f)
}

/// Extension for attaching a carrier to any future.
pub trait WithCarrier: Future + Sized {
    /// Runs this future with `carrier` attached.
    fn with_carrier(self, carrier: Carrier) -> TaskLocalFuture<Carrier, Self> {
        attach(carrier, self)
    }

    /// Runs this future with the caller's current carrier attached.
    ///
    /// # Errors
    ///
    /// Returns `PropagationError::MissingCarrier` if the caller has none.
    fn with_current_carrier(self) -> Result<TaskLocalFuture<Carrier, Self>, PropagationError> {
        let carrier = current().ok_or_else(|| PropagationError::MissingCarrier {
            operation: "with_current_carrier".to_string(),
        })?;
        Ok(attach(carrier, self))
    }
}

impl<F: Future> WithCarrier for F {}

/// Spawns `future` on the tokio runtime with `carrier` attached.
pub fn spawn_with_carrier<F>(carrier: Carrier, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(attach(carrier, future))
}
