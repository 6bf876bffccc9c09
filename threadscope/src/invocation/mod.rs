//! Units of work and the wrapper that runs them inside a restored context.
//!
//! A [`UnitOfWork`] is the equivalent of a resolver or request handler: it is
//! handed an [`Invocation`] and returns either a value it computed on the spot
//! or a deferred computation that will settle later, possibly on another
//! thread. Units of work are always run through [`ScopedInvocation`], which
//! brackets each synchronous step with a restore and a reset of the request's
//! context snapshot.

mod hop;
mod registry;
mod scoped;

pub use hop::{spawn_blocking_scoped, spawn_scoped};
pub use registry::{SharedWork, WorkRegistry};
pub use scoped::{ScopedFuture, ScopedInvocation};

use crate::carrier::Carrier;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// A computation that settles after the unit of work returned.
pub type Deferred<T> = BoxFuture<'static, anyhow::Result<T>>;

/// What a unit of work returned.
pub enum Outcome<T> {
    /// The value was computed during the call.
    Immediate(T),
    /// The value will be produced by a future.
    Deferred(Deferred<T>),
}

impl<T> Outcome<T> {
    /// Wraps `future` as a deferred outcome.
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::Deferred(Box::pin(future))
    }

    /// Returns true if the outcome is deferred.
    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }

    /// Waits for the outcome's value.
    ///
    /// # Errors
    ///
    /// Returns the deferred computation's error.
    pub async fn resolve(self) -> anyhow::Result<T> {
        match self {
            Self::Immediate(value) => Ok(value),
            Self::Deferred(future) => future.await,
        }
    }
}

impl<T: Send + 'static> Outcome<T> {
    /// Applies a fallible conversion to the outcome's value.
    ///
    /// Immediate values are converted now; deferred values are converted when
    /// the future settles, on whichever thread polls it.
    ///
    /// # Errors
    ///
    /// Returns the conversion error for an immediate value.
    pub fn try_map<U, F>(self, f: F) -> anyhow::Result<Outcome<U>>
    where
        U: Send + 'static,
        F: FnOnce(T) -> anyhow::Result<U> + Send + 'static,
    {
        match self {
            Self::Immediate(value) => f(value).map(Outcome::Immediate),
            Self::Deferred(future) => Ok(Outcome::deferred(async move { f(future.await?) })),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate(value) => f.debug_tuple("Immediate").field(value).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// The environment a unit of work is invoked with.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    operation: String,
    arguments: Map<String, Value>,
    carrier: Option<Carrier>,
}

impl Invocation {
    /// Creates an invocation of `operation` with no arguments.
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    /// Sets all arguments.
    #[must_use]
    pub fn with_arguments(mut self, arguments: Map<String, Value>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Sets one argument.
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    /// Tunnels `carrier` through the invocation.
    ///
    /// An explicit carrier takes precedence over the one attached to the task.
    #[must_use]
    pub fn with_carrier(mut self, carrier: Carrier) -> Self {
        self.carrier = Some(carrier);
        self
    }

    /// Returns the operation name.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Returns all arguments.
    #[must_use]
    pub const fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }

    /// Returns one argument.
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    /// Deserializes one argument.
    ///
    /// # Errors
    ///
    /// Fails if the argument is missing or has the wrong shape.
    pub fn argument_as<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let value = self.argument(name).cloned().ok_or_else(|| {
            anyhow::anyhow!("missing argument '{name}' for '{}'", self.operation)
        })?;
        Ok(serde_json::from_value(value)?)
    }

    /// Returns the carrier tunnelled through this invocation, if any.
    #[must_use]
    pub const fn carrier(&self) -> Option<&Carrier> {
        self.carrier.as_ref()
    }

    /// Returns the carrier in scope: the tunnelled one, else the task's.
    #[must_use]
    pub fn carrier_in_scope(&self) -> Option<Carrier> {
        self.carrier.clone().or_else(Carrier::current)
    }
}

/// A piece of work run on behalf of a request.
pub trait UnitOfWork: Send + Sync {
    /// The value the work produces.
    type Output: Send + 'static;

    /// Runs the work.
    ///
    /// # Errors
    ///
    /// Any error of the work itself.
    fn run(&self, invocation: &Invocation) -> anyhow::Result<Outcome<Self::Output>>;
}

impl<W: UnitOfWork + ?Sized> UnitOfWork for Arc<W> {
    type Output = W::Output;

    fn run(&self, invocation: &Invocation) -> anyhow::Result<Outcome<Self::Output>> {
        (**self).run(invocation)
    }
}

impl<W: UnitOfWork + ?Sized> UnitOfWork for Box<W> {
    type Output = W::Output;

    fn run(&self, invocation: &Invocation) -> anyhow::Result<Outcome<Self::Output>> {
        (**self).run(invocation)
    }
}

/// A unit of work backed by a closure.
pub struct FnWork<F, T> {
    func: F,
    _output: PhantomData<fn() -> T>,
}

impl<F, T> FnWork<F, T>
where
    F: Fn(&Invocation) -> anyhow::Result<Outcome<T>> + Send + Sync,
    T: Send + 'static,
{
    /// Creates a unit of work from `func`.
    #[must_use]
    pub const fn new(func: F) -> Self {
        Self {
            func,
            _output: PhantomData,
        }
    }
}

impl<F, T> UnitOfWork for FnWork<F, T>
where
    F: Fn(&Invocation) -> anyhow::Result<Outcome<T>> + Send + Sync,
    T: Send + 'static,
{
    type Output = T;

    fn run(&self, invocation: &Invocation) -> anyhow::Result<Outcome<T>> {
        (self.func)(invocation)
    }
}

impl<F, T> fmt::Debug for FnWork<F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnWork").finish_non_exhaustive()
    }
}
