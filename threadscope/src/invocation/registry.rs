//! Named units of work, each registered behind a context-restoring wrapper.

use super::{Invocation, Outcome, ScopedInvocation, UnitOfWork};
use crate::errors::InvocationError;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A type-erased unit of work producing JSON.
pub type SharedWork = Arc<dyn UnitOfWork<Output = Value>>;

struct JsonWork<W>(W);

impl<W> UnitOfWork for JsonWork<W>
where
    W: UnitOfWork,
    W::Output: Serialize,
{
    type Output = Value;

    fn run(&self, invocation: &Invocation) -> anyhow::Result<Outcome<Value>> {
        self.0
            .run(invocation)?
            .try_map(|value| Ok(serde_json::to_value(value)?))
    }
}

/// Registry of units of work, looked up by operation name.
///
/// Every unit of work is wrapped in a [`ScopedInvocation`] when it is
/// registered; there is no way to register one that runs outside the
/// request's context. The registry is built once and then shared read-only.
#[derive(Clone, Default)]
pub struct WorkRegistry {
    works: HashMap<String, Arc<ScopedInvocation<SharedWork>>>,
}

impl WorkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `work` under `name`, replacing any previous registration.
    pub fn register<W>(&mut self, name: impl Into<String>, work: W) -> &mut Self
    where
        W: UnitOfWork + 'static,
        W::Output: Serialize,
    {
        let shared: SharedWork = Arc::new(JsonWork(work));
        self.works
            .insert(name.into(), Arc::new(ScopedInvocation::new(shared)));
        self
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with<W>(mut self, name: impl Into<String>, work: W) -> Self
    where
        W: UnitOfWork + 'static,
        W::Output: Serialize,
    {
        self.register(name, work);
        self
    }

    /// Returns the wrapped unit of work registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<ScopedInvocation<SharedWork>>> {
        self.works.get(name)
    }

    /// Checks if a unit of work is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.works.contains_key(name)
    }

    /// Returns the registered operation names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.works.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered units of work.
    #[must_use]
    pub fn len(&self) -> usize {
        self.works.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.works.is_empty()
    }

    /// Invokes the unit of work named by `invocation`.
    ///
    /// # Errors
    ///
    /// Returns `InvocationError::UnknownOperation` if nothing is registered
    /// under the name, otherwise whatever the scoped invocation returns.
    pub fn invoke(&self, invocation: &Invocation) -> Result<Outcome<Value>, InvocationError> {
        let work = self
            .get(invocation.operation())
            .ok_or_else(|| InvocationError::UnknownOperation(invocation.operation().to_string()))?;
        work.invoke(invocation)
    }
}

impl fmt::Debug for WorkRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkRegistry")
            .field("operations", &self.names())
            .finish()
    }
}
