//! Test fixtures for propagation tests.

use super::LocalValueAccessor;
use crate::accessor::AccessorRegistry;
use std::sync::Arc;

/// Builds a registry of [`LocalValueAccessor`]s for `keys`.
///
/// # Panics
///
/// Panics if `keys` contains duplicates.
#[must_use]
pub fn local_registry(keys: &[&str]) -> Arc<AccessorRegistry> {
    let mut registry = AccessorRegistry::new();
    for key in keys {
        if let Err(err) = registry.register(Arc::new(LocalValueAccessor::new(*key))) {
            panic!("invalid test registry: {err}");
        }
    }
    Arc::new(registry)
}

/// Runs `f` on a freshly spawned thread and returns its result.
///
/// Panics inside `f` are resumed on the calling thread.
pub fn run_on_thread<F, R>(f: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    std::thread::scope(|scope| match scope.spawn(f).join() {
        Ok(value) => value,
        Err(panic) => std::panic::resume_unwind(panic),
    })
}
