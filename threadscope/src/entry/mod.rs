//! The request entry point.
//!
//! The entry point is the one place that touches a request before any thread
//! hop: it captures the registered thread-bound values on the receiving
//! thread, installs the snapshot in a fresh carrier, and only then hands the
//! request to the executor. It is not itself wrapped in a scoped invocation;
//! everything it dispatches is.

mod executor;
mod request;

pub use request::{OperationCall, OperationError, Request, Response};

use crate::accessor::AccessorRegistry;
use crate::carrier::{spawn_with_carrier, Carrier};
use crate::config::{EntryPointConfig, Offload};
use crate::errors::ThreadscopeError;
use crate::events::{self, EventSink, NoOpEventSink};
use crate::invocation::WorkRegistry;
use crate::snapshot::ContextSnapshot;
use executor::Executor;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Receives requests and runs them with the caller's context propagated.
#[derive(Clone)]
pub struct EntryPoint {
    accessors: Arc<AccessorRegistry>,
    works: Arc<WorkRegistry>,
    config: EntryPointConfig,
    sink: Option<Arc<dyn EventSink>>,
}

impl EntryPoint {
    /// Creates an entry point with the default configuration.
    #[must_use]
    pub fn new(accessors: AccessorRegistry, works: WorkRegistry) -> Self {
        Self {
            accessors: Arc::new(accessors),
            works: Arc::new(works),
            config: EntryPointConfig::default(),
            sink: None,
        }
    }

    /// Sets the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ThreadscopeError::Config` if `config` is invalid.
    pub fn with_config(mut self, config: EntryPointConfig) -> Result<Self, ThreadscopeError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Sets the event sink. Without one, the process-wide sink is used.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &EntryPointConfig {
        &self.config
    }

    /// Returns the registered accessors.
    #[must_use]
    pub const fn accessors(&self) -> &Arc<AccessorRegistry> {
        &self.accessors
    }

    /// Returns the registered units of work.
    #[must_use]
    pub const fn works(&self) -> &Arc<WorkRegistry> {
        &self.works
    }

    /// Captures the calling thread's context into a fresh carrier.
    #[must_use]
    pub fn capture(&self) -> Carrier {
        let snapshot = Arc::new(ContextSnapshot::capture(Arc::clone(&self.accessors)));
        self.event_sink().try_emit(
            events::CONTEXT_CAPTURED,
            Some(events::context_captured(&snapshot)),
        );
        snapshot.install(&Carrier::new())
    }

    /// Handles `request`.
    ///
    /// The context is captured on the calling thread when this method is
    /// called, not when the returned future is first polled. The request then
    /// runs where the configured [`Offload`] puts it.
    ///
    /// # Errors
    ///
    /// The future fails with `ThreadscopeError::Join` if the task running the
    /// request panicked. Failed operations are reported in the response.
    pub fn handle(
        &self,
        request: Request,
    ) -> impl Future<Output = Result<Response, ThreadscopeError>> + Send + 'static {
        let carrier = self.capture();
        let executor = Executor {
            works: Arc::clone(&self.works),
            sink: self.event_sink(),
            max_concurrent: self.config.max_concurrent_operations,
            timeout: self.config.operation_timeout(),
        };
        let offload = self.config.offload;
        debug!(
            operations = request.operations.len(),
            ?offload,
            "Dispatching request"
        );

        async move {
            match offload {
                Offload::Inline => Ok(executor.execute(carrier, request).await),
                Offload::Worker => {
                    spawn_with_carrier(carrier.clone(), executor.execute(carrier, request))
                        .await
                        .map_err(|err| ThreadscopeError::Join(err.to_string()))
                }
                Offload::Blocking => {
                    let runtime = tokio::runtime::Handle::try_current()
                        .map_err(|err| ThreadscopeError::Config(err.to_string()))?;
                    tokio::task::spawn_blocking(move || {
                        runtime.block_on(carrier.clone().scope(executor.execute(carrier, request)))
                    })
                    .await
                    .map_err(|err| ThreadscopeError::Join(err.to_string()))
                }
            }
        }
    }

    /// Parses `body` as a request, handles it, and renders the response.
    ///
    /// The context is captured when the returned future is first polled.
    ///
    /// # Errors
    ///
    /// Returns `ThreadscopeError::Serialization` for malformed bodies, or the
    /// error of [`handle`](Self::handle).
    pub async fn handle_json(&self, body: &str) -> Result<Value, ThreadscopeError> {
        let request = Request::from_json(body)?;
        let response = self.handle(request).await?;
        Ok(response.to_specification())
    }

    fn event_sink(&self) -> Arc<dyn EventSink> {
        if !self.config.emit_events {
            return Arc::new(NoOpEventSink);
        }
        self.sink.clone().unwrap_or_else(events::get_event_sink)
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoint")
            .field("accessors", &self.accessors.keys())
            .field("operations", &self.works.names())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
