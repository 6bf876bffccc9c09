//! Moving work to other threads without losing the request's context.

use super::ScopedFuture;
use crate::carrier::Carrier;
use crate::errors::PropagationError;
use crate::snapshot::ContextSnapshot;
use std::future::Future;
use tokio::task::JoinHandle;

fn carrier_in_scope(operation: &str) -> Result<Carrier, PropagationError> {
    Carrier::current().ok_or_else(|| PropagationError::MissingCarrier {
        operation: operation.to_string(),
    })
}

/// Spawns `future` as a new task with the current carrier attached and the
/// carrier's snapshot restored around every poll.
///
/// # Errors
///
/// Returns `PropagationError::MissingCarrier` or `MissingSnapshot` if the
/// calling task has no carrier with a snapshot. Nothing is spawned then.
pub fn spawn_scoped<F, T>(future: F) -> Result<JoinHandle<anyhow::Result<T>>, PropagationError>
where
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let carrier = carrier_in_scope("spawn_scoped")?;
    let scoped = ScopedFuture::from_carrier("spawn_scoped", Box::pin(future), carrier)?;
    Ok(tokio::spawn(scoped))
}

/// Runs `f` on the blocking pool with the current carrier attached and its
/// snapshot restored for the duration of the call.
///
/// The join handle yields the restore/reset outcome around `f`'s value.
///
/// # Errors
///
/// Returns `PropagationError::MissingCarrier` or `MissingSnapshot` if the
/// calling task has no carrier with a snapshot. Nothing is spawned then.
pub fn spawn_blocking_scoped<F, R>(
    f: F,
) -> Result<JoinHandle<Result<R, PropagationError>>, PropagationError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let carrier = carrier_in_scope("spawn_blocking_scoped")?;
    let snapshot = ContextSnapshot::from_carrier(&carrier).ok_or_else(|| {
        PropagationError::MissingSnapshot {
            operation: "spawn_blocking_scoped".to_string(),
        }
    })?;
    Ok(tokio::task::spawn_blocking(move || {
        carrier.sync_scope(|| snapshot.scope(f))
    }))
}
