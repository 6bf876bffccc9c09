//! Lifecycle events.
//!
//! The entry point reports when it captured a request's context and how each
//! operation settled. Events go to the sink configured on the entry point, or
//! to the process-wide sink set with [`set_event_sink`].

mod sink;

#[cfg(test)]
pub use sink::MockEventSink;
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};

use crate::snapshot::ContextSnapshot;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::sync::Arc;

/// Emitted once per request, right after its context snapshot was captured.
pub const CONTEXT_CAPTURED: &str = "context.captured";
/// Emitted when an operation produced a value.
pub const OPERATION_COMPLETED: &str = "operation.completed";
/// Emitted when an operation failed.
pub const OPERATION_FAILED: &str = "operation.failed";

static GLOBAL_EVENT_SINK: RwLock<Option<Arc<dyn EventSink>>> = RwLock::new(None);

/// Sets the process-wide event sink.
pub fn set_event_sink(sink: Arc<dyn EventSink>) {
    *GLOBAL_EVENT_SINK.write() = Some(sink);
}

/// Clears the process-wide event sink.
pub fn clear_event_sink() {
    *GLOBAL_EVENT_SINK.write() = None;
}

/// Gets the process-wide event sink.
///
/// Returns a `NoOpEventSink` if no sink is set.
pub fn get_event_sink() -> Arc<dyn EventSink> {
    GLOBAL_EVENT_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(NoOpEventSink))
}

pub(crate) fn context_captured(snapshot: &ContextSnapshot) -> Value {
    json!({
        "snapshot_id": snapshot.id().to_string(),
        "captured_at": snapshot.captured_at().to_rfc3339(),
        "keys": snapshot.present_keys(),
    })
}

pub(crate) fn operation_completed(operation: &str, alias: &str, duration_ms: f64) -> Value {
    json!({
        "operation": operation,
        "alias": alias,
        "duration_ms": duration_ms,
    })
}

pub(crate) fn operation_failed(
    operation: &str,
    alias: &str,
    duration_ms: f64,
    error: &str,
) -> Value {
    json!({
        "operation": operation,
        "alias": alias,
        "duration_ms": duration_ms,
        "error": error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{local_registry, LocalValueAccessor};

    #[test]
    fn test_global_sink_roundtrip() {
        let sink = Arc::new(CollectingEventSink::new());
        set_event_sink(sink.clone());
        get_event_sink().try_emit(CONTEXT_CAPTURED, None);
        clear_event_sink();
        get_event_sink().try_emit(CONTEXT_CAPTURED, None);

        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_context_captured_lists_present_keys() {
        let locale = LocalValueAccessor::new("locale");
        locale.bind("de".to_string());
        let snapshot = ContextSnapshot::capture(local_registry(&["locale", "tenant"]));
        locale.clear();

        let payload = context_captured(&snapshot);

        assert_eq!(payload["keys"], json!(["locale"]));
        assert_eq!(payload["snapshot_id"], json!(snapshot.id().to_string()));
    }
}
