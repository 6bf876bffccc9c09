//! # Threadscope
//!
//! Carries thread-bound request state across async thread hops.
//!
//! Many libraries keep per-request state (locale, security principal, request
//! attributes) in thread-local storage and assume one request is served by one
//! thread. Once work is handed to a runtime that moves tasks between worker
//! threads, that assumption breaks. Threadscope:
//!
//! - **Captures** the registered thread-bound values on the thread that
//!   received the request ([`ContextSnapshot`](snapshot::ContextSnapshot))
//! - **Carries** the capture with the request as an explicit value attached to
//!   its tasks ([`Carrier`](carrier::Carrier))
//! - **Restores** it around every unit of work, on whatever thread that work
//!   runs, and resets the thread afterwards
//!   ([`ScopedInvocation`](invocation::ScopedInvocation))
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use threadscope::prelude::*;
//!
//! let works = WorkRegistry::new().with(
//!     "whoami",
//!     FnWork::new(|_: &Invocation| {
//!         Ok(Outcome::Immediate(attributes::get_attribute("user")))
//!     }),
//! );
//! let entry = EntryPoint::new(AccessorRegistry::with_request_attributes(), works);
//!
//! attributes::bind(RequestAttributes::new().with("user", "ada".into()));
//! let response = entry
//!     .handle(Request::new().with_operation(OperationCall::new("whoami")))
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod accessor;
pub mod carrier;
pub mod config;
pub mod entry;
pub mod errors;
pub mod events;
pub mod invocation;
pub mod observability;
pub mod snapshot;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::accessor::attributes::{self, RequestAttributes};
    pub use crate::accessor::{
        AccessorRegistry, BoundValue, FnAccessor, ThreadLocalAccessor, ThreadLocalSlot,
    };
    pub use crate::carrier::{spawn_with_carrier, Carrier, CarrierKey, WithCarrier};
    pub use crate::config::{EntryPointConfig, Offload};
    pub use crate::entry::{EntryPoint, OperationCall, Request, Response};
    pub use crate::errors::{
        AccessorError, InvocationError, PropagationError, ThreadscopeError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::invocation::{
        spawn_blocking_scoped, spawn_scoped, FnWork, Invocation, Outcome, ScopedInvocation,
        UnitOfWork, WorkRegistry,
    };
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::snapshot::{ContextSnapshot, RestoreGuard};
}
