//! Cross-thread behaviour of context snapshots.

use super::{open_brackets, ContextSnapshot};
use crate::accessor::AccessorRegistry;
use crate::errors::{AccessorError, PropagationError};
use crate::testing::{run_on_thread, LocalValueAccessor, RecordingAccessor};
use std::sync::{Arc, Barrier};

fn local_registry(keys: &[&str]) -> Arc<AccessorRegistry> {
    let mut registry = AccessorRegistry::new();
    for key in keys {
        registry.register(Arc::new(LocalValueAccessor::new(*key))).unwrap();
    }
    Arc::new(registry)
}

fn recording_registry(accessors: &[&Arc<RecordingAccessor>]) -> Arc<AccessorRegistry> {
    let mut registry = AccessorRegistry::new();
    for accessor in accessors {
        registry.register((*accessor).clone()).unwrap();
    }
    Arc::new(registry)
}

#[test]
fn test_capture_on_one_thread_restore_on_another() {
    let x = LocalValueAccessor::new("X");
    x.bind("alpha".to_string());
    let snapshot = Arc::new(ContextSnapshot::capture(local_registry(&["X"])));

    let observed = run_on_thread({
        let snapshot = Arc::clone(&snapshot);
        move || {
            let x = LocalValueAccessor::new("X");
            let before = x.get_str();
            snapshot.restore_on_current_thread().unwrap();
            let during = x.get_str();
            snapshot.reset_on_current_thread().unwrap();
            (before, during, x.get_str())
        }
    });

    assert_eq!(observed, (None, Some("alpha".to_string()), None));
    assert_eq!(x.get_str(), Some("alpha".to_string()));
    x.clear();
}

#[test]
fn test_concurrent_restores_are_isolated() {
    const THREADS: usize = 8;

    let x = LocalValueAccessor::new("X");
    x.bind("captured".to_string());
    let snapshot = Arc::new(ContextSnapshot::capture(local_registry(&["X"])));
    x.clear();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let snapshot = Arc::clone(&snapshot);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let x = LocalValueAccessor::new("X");
                let own = format!("thread-{i}");
                x.bind(own.clone());

                snapshot.restore_on_current_thread().unwrap();
                // Every thread holds the snapshot restored at the same time.
                barrier.wait();
                let during = x.get_str();
                barrier.wait();
                snapshot.reset_on_current_thread().unwrap();

                (own, during, x.get_str())
            })
        })
        .collect();

    for handle in handles {
        let (own, during, after) = handle.join().unwrap();
        assert_eq!(during, Some("captured".to_string()));
        assert_eq!(after, Some(own));
    }
}

#[test]
fn test_absent_capture_clears_then_reset_restores() {
    let snapshot = ContextSnapshot::capture(local_registry(&["X"]));
    let x = LocalValueAccessor::new("X");
    x.bind("bound-later".to_string());

    snapshot.restore_on_current_thread().unwrap();
    assert_eq!(x.get_str(), None);

    snapshot.reset_on_current_thread().unwrap();
    assert_eq!(x.get_str(), Some("bound-later".to_string()));
    x.clear();
}

#[test]
fn test_double_restore_keeps_original_prior() {
    let x = LocalValueAccessor::new("X");
    x.bind("captured".to_string());
    let snapshot = ContextSnapshot::capture(local_registry(&["X"]));
    x.bind("original".to_string());

    snapshot.restore_on_current_thread().unwrap();
    snapshot.restore_on_current_thread().unwrap();
    assert_eq!(open_brackets(), 2);

    snapshot.reset_on_current_thread().unwrap();
    assert_eq!(x.get_str(), Some("captured".to_string()));

    snapshot.reset_on_current_thread().unwrap();
    assert_eq!(x.get_str(), Some("original".to_string()));
    assert_eq!(open_brackets(), 0);
    x.clear();
}

#[test]
fn test_nested_snapshots_unwind_in_order() {
    let x = LocalValueAccessor::new("X");
    let registry = local_registry(&["X"]);

    x.bind("outer".to_string());
    let outer = ContextSnapshot::capture(Arc::clone(&registry));
    x.bind("inner".to_string());
    let inner = ContextSnapshot::capture(registry);
    x.bind("ambient".to_string());

    outer.restore_on_current_thread().unwrap();
    inner.restore_on_current_thread().unwrap();
    assert_eq!(x.get_str(), Some("inner".to_string()));

    inner.reset_on_current_thread().unwrap();
    assert_eq!(x.get_str(), Some("outer".to_string()));

    outer.reset_on_current_thread().unwrap();
    assert_eq!(x.get_str(), Some("ambient".to_string()));
    x.clear();
}

#[test]
fn test_reset_attempts_every_accessor() {
    let a = Arc::new(RecordingAccessor::new(LocalValueAccessor::new("A")));
    let b = Arc::new(RecordingAccessor::new(LocalValueAccessor::new("B")));
    let c = Arc::new(RecordingAccessor::new(LocalValueAccessor::new("C")));
    let snapshot = ContextSnapshot::capture(recording_registry(&[&a, &b, &c]));

    snapshot.restore_on_current_thread().unwrap();
    a.fail_writes("sealed");
    b.fail_writes("also sealed");

    let err = snapshot.reset_on_current_thread().unwrap_err();

    assert!(matches!(
        err,
        PropagationError::Reset { ref key, source: AccessorError::Rejected { .. } } if key == "A"
    ));
    assert_eq!(a.write_count(), 2);
    assert_eq!(b.write_count(), 2);
    assert_eq!(c.write_count(), 2);
    assert_eq!(open_brackets(), 0);
}

#[test]
fn test_failed_restore_rolls_back() {
    let first = Arc::new(RecordingAccessor::new(LocalValueAccessor::new("first")));
    let second = Arc::new(RecordingAccessor::new(LocalValueAccessor::new("second")));
    let first_local = LocalValueAccessor::new("first");
    first_local.bind("captured".to_string());
    let snapshot = ContextSnapshot::capture(recording_registry(&[&first, &second]));

    first_local.bind("ambient".to_string());
    second.fail_writes("read-only");

    let err = snapshot.restore_on_current_thread().unwrap_err();

    assert!(matches!(err, PropagationError::Restore { ref key, .. } if key == "second"));
    assert_eq!(first_local.get_str(), Some("ambient".to_string()));
    assert_eq!(first.write_count(), 2);
    assert!(!snapshot.is_restored_on_current_thread());
    assert_eq!(open_brackets(), 0);
    first_local.clear();
}

#[test]
fn test_guard_resets_when_work_panics() {
    let x = LocalValueAccessor::new("X");
    x.bind("captured".to_string());
    let snapshot = ContextSnapshot::capture(local_registry(&["X"]));
    x.bind("ambient".to_string());

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _guard = snapshot.restore().unwrap();
        panic!("work failed");
    }));

    assert!(outcome.is_err());
    assert_eq!(x.get_str(), Some("ambient".to_string()));
    assert_eq!(open_brackets(), 0);
    x.clear();
}

#[test]
fn test_restore_again_under_another_snapshot_opens_new_bracket() {
    let x = LocalValueAccessor::new("X");
    let registry = local_registry(&["X"]);

    x.bind("A".to_string());
    let a = ContextSnapshot::capture(Arc::clone(&registry));
    x.bind("B".to_string());
    let b = ContextSnapshot::capture(registry);
    x.bind("ambient".to_string());

    a.restore_on_current_thread().unwrap();
    b.restore_on_current_thread().unwrap();
    a.restore_on_current_thread().unwrap();
    assert_eq!(x.get_str(), Some("A".to_string()));
    assert_eq!(open_brackets(), 3);

    // Still inside B's bracket: the inner reset must hand back B's values.
    a.reset_on_current_thread().unwrap();
    assert_eq!(x.get_str(), Some("B".to_string()));

    b.reset_on_current_thread().unwrap();
    assert_eq!(x.get_str(), Some("A".to_string()));

    a.reset_on_current_thread().unwrap();
    assert_eq!(x.get_str(), Some("ambient".to_string()));
    assert_eq!(open_brackets(), 0);
    x.clear();
}

#[test]
fn test_restore_fails_once_thread_frames_are_gone() {
    use std::cell::RefCell;
    use std::sync::mpsc;

    struct RestoreOnExit {
        snapshot: Arc<ContextSnapshot>,
        report: mpsc::Sender<(Result<(), PropagationError>, Option<String>)>,
    }

    impl Drop for RestoreOnExit {
        fn drop(&mut self) {
            let result = self.snapshot.restore_on_current_thread();
            let after = LocalValueAccessor::new("X").get_str();
            let _ = self.report.send((result, after));
        }
    }

    thread_local! {
        static ON_EXIT: RefCell<Option<RestoreOnExit>> = const { RefCell::new(None) };
    }

    let x = LocalValueAccessor::new("X");
    x.bind("captured".to_string());
    let snapshot = Arc::new(ContextSnapshot::capture(local_registry(&["X"])));
    x.clear();

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        // Thread-local destructors run in reverse order of first use, so the
        // frame stack is gone by the time `ON_EXIT` is dropped while the
        // accessor's storage is still alive.
        LocalValueAccessor::new("X").bind("ambient".to_string());
        ON_EXIT.with(|slot| {
            *slot.borrow_mut() = Some(RestoreOnExit {
                snapshot: Arc::clone(&snapshot),
                report: tx,
            });
        });
        snapshot.scope(|| ()).unwrap();
    })
    .join()
    .unwrap();

    let (result, after) = rx.recv().unwrap();
    assert!(matches!(result, Err(PropagationError::BracketUnavailable { .. })));
    assert_eq!(after, Some("ambient".to_string()));
}
