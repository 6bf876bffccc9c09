//! Testing utilities for code that propagates thread-bound context.
//!
//! This module provides:
//! - Accessors backed by a per-thread map, usable with any key
//! - A recording accessor that counts reads/writes and can fail writes
//! - Helpers for running work on a fresh thread
//! - Assertions about the calling thread's bound values

mod accessors;
mod assertions;
mod fixtures;

pub use accessors::{LocalValueAccessor, RecordingAccessor};
pub use assertions::{assert_bound, assert_no_open_brackets, assert_unbound};
pub use fixtures::{local_registry, run_on_thread};
