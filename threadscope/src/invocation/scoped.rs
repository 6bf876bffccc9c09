//! The restore/reset bracket around units of work and deferred results.

use super::{Deferred, Invocation, Outcome, UnitOfWork};
use crate::carrier::Carrier;
use crate::errors::{InvocationError, PropagationError};
use crate::snapshot::ContextSnapshot;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, warn};

/// Runs a unit of work with the request's context restored on the calling
/// thread.
///
/// The snapshot is read from the carrier in scope, restored, the wrapped work
/// is called with that carrier attached, and the snapshot is reset before
/// anything is returned. Deferred
/// results are wrapped in a [`ScopedFuture`] so that every later step of the
/// computation sees the same context, on whatever thread it runs.
#[derive(Debug, Clone)]
pub struct ScopedInvocation<W> {
    delegate: W,
}

impl<W: UnitOfWork> ScopedInvocation<W> {
    /// Wraps `delegate`.
    #[must_use]
    pub const fn new(delegate: W) -> Self {
        Self { delegate }
    }

    /// Returns the wrapped unit of work.
    #[must_use]
    pub const fn delegate(&self) -> &W {
        &self.delegate
    }

    /// Invokes the wrapped unit of work inside the request's context.
    ///
    /// # Errors
    ///
    /// - `PropagationError::MissingCarrier` / `MissingSnapshot` before anything
    ///   is restored.
    /// - `PropagationError::Restore` if the context could not be restored; the
    ///   work is not called.
    /// - `InvocationError::Delegate` with the work's own error, unchanged. The
    ///   reset has already run.
    /// - `PropagationError::Reset` if the work succeeded but the thread could
    ///   not be reset.
    pub fn invoke(&self, invocation: &Invocation) -> Result<Outcome<W::Output>, InvocationError> {
        let operation = invocation.operation();
        let carrier =
            invocation
                .carrier_in_scope()
                .ok_or_else(|| PropagationError::MissingCarrier {
                    operation: operation.to_string(),
                })?;
        let snapshot = ContextSnapshot::from_carrier(&carrier).ok_or_else(|| {
            PropagationError::MissingSnapshot {
                operation: operation.to_string(),
            }
        })?;

        let (result, reset) = carrier.clone().sync_scope(|| {
            let guard = snapshot.restore()?;
            let result = self.delegate.run(invocation);
            Ok::<_, PropagationError>((result, guard.reset()))
        })?;

        let outcome = match (result, reset) {
            (Ok(outcome), Ok(())) => outcome,
            (Ok(_), Err(err)) => return Err(err.into()),
            (Err(err), Ok(())) => return Err(InvocationError::Delegate(err)),
            (Err(err), Err(reset)) => {
                warn!(
                    operation,
                    snapshot_id = %snapshot.id(),
                    error = %reset,
                    "Context reset failed after unit of work failed"
                );
                return Err(InvocationError::Delegate(err));
            }
        };

        Ok(match outcome {
            Outcome::Immediate(value) => Outcome::Immediate(value),
            Outcome::Deferred(future) => {
                debug!(operation, snapshot_id = %snapshot.id(), "Scoping deferred result");
                Outcome::Deferred(Box::pin(ScopedFuture::new(future, carrier, snapshot)))
            }
        })
    }
}

impl<W: UnitOfWork> UnitOfWork for ScopedInvocation<W> {
    type Output = W::Output;

    fn run(&self, invocation: &Invocation) -> anyhow::Result<Outcome<Self::Output>> {
        self.invoke(invocation).map_err(|err| match err {
            InvocationError::Delegate(inner) => inner,
            other => anyhow::Error::new(other),
        })
    }
}

/// A deferred computation that restores the request's context around each
/// poll.
///
/// Every poll runs with the carrier attached to the task and the snapshot
/// restored on the polling thread, and resets before returning, so nothing
/// stays bound on a worker thread between polls.
pub struct ScopedFuture<T> {
    inner: Deferred<T>,
    carrier: Carrier,
    snapshot: Arc<ContextSnapshot>,
}

impl<T> ScopedFuture<T> {
    pub(crate) fn new(inner: Deferred<T>, carrier: Carrier, snapshot: Arc<ContextSnapshot>) -> Self {
        Self {
            inner,
            carrier,
            snapshot,
        }
    }

    /// Scopes `inner` to the snapshot held by `carrier`.
    ///
    /// # Errors
    ///
    /// Returns `PropagationError::MissingSnapshot` if `carrier` holds none.
    pub fn from_carrier(
        operation: &str,
        inner: Deferred<T>,
        carrier: Carrier,
    ) -> Result<Self, PropagationError> {
        let snapshot = ContextSnapshot::from_carrier(&carrier).ok_or_else(|| {
            PropagationError::MissingSnapshot {
                operation: operation.to_string(),
            }
        })?;
        Ok(Self::new(inner, carrier, snapshot))
    }

    /// Returns the snapshot restored around each poll.
    #[must_use]
    pub const fn snapshot(&self) -> &Arc<ContextSnapshot> {
        &self.snapshot
    }
}

impl<T> Future for ScopedFuture<T> {
    type Output = anyhow::Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let snapshot = &this.snapshot;
        let inner = &mut this.inner;

        this.carrier.clone().sync_scope(|| {
            let guard = match snapshot.restore() {
                Ok(guard) => guard,
                Err(err) => return Poll::Ready(Err(err.into())),
            };
            let polled = inner.as_mut().poll(cx);

            match (guard.reset(), polled) {
                (Ok(()), polled) => polled,
                (Err(reset), Poll::Ready(Err(err))) => {
                    warn!(
                        snapshot_id = %snapshot.id(),
                        error = %reset,
                        "Context reset failed after deferred work failed"
                    );
                    Poll::Ready(Err(err))
                }
                (Err(reset), _) => Poll::Ready(Err(reset.into())),
            }
        })
    }
}

impl<T> fmt::Debug for ScopedFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedFuture")
            .field("snapshot_id", &self.snapshot.id())
            .field("carrier", &self.carrier)
            .finish_non_exhaustive()
    }
}
