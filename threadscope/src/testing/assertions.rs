//! Test assertions for thread-bound values.

use super::LocalValueAccessor;
use crate::snapshot::open_brackets;

/// Asserts that `accessor` has `expected` bound on the calling thread.
pub fn assert_bound(accessor: &LocalValueAccessor, expected: &str) {
    assert_eq!(
        accessor.get_str().as_deref(),
        Some(expected),
        "Expected '{}' bound to '{}' on {:?}",
        expected,
        accessor.key_name(),
        std::thread::current().id()
    );
}

/// Asserts that nothing is bound to `accessor` on the calling thread.
pub fn assert_unbound(accessor: &LocalValueAccessor) {
    assert!(
        !accessor.is_bound(),
        "Expected '{}' to be unbound on {:?}, found {:?}",
        accessor.key_name(),
        std::thread::current().id(),
        accessor.get_str()
    );
}

/// Asserts that every restore on the calling thread has been reset.
pub fn assert_no_open_brackets() {
    let open = open_brackets();
    assert_eq!(
        open, 0,
        "Expected no open restore brackets on {:?}, found {}",
        std::thread::current().id(),
        open
    );
}
