//! Configuration for the request entry point.

use crate::errors::ThreadscopeError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a request is executed after its context has been captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Offload {
    /// On the task that called `handle`.
    Inline,
    /// On a freshly spawned tokio task, usually another worker thread.
    #[default]
    Worker,
    /// On tokio's blocking pool.
    Blocking,
}

/// Configuration for an [`EntryPoint`](crate::entry::EntryPoint).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPointConfig {
    /// Where requests run after capture.
    #[serde(default)]
    pub offload: Offload,
    /// Maximum number of operations of one request running at once.
    #[serde(default = "default_max_concurrent_operations")]
    pub max_concurrent_operations: usize,
    /// Per-operation timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_timeout_ms: Option<u64>,
    /// Whether lifecycle events are emitted.
    #[serde(default = "default_emit_events")]
    pub emit_events: bool,
}

fn default_max_concurrent_operations() -> usize {
    16
}

fn default_emit_events() -> bool {
    true
}

impl Default for EntryPointConfig {
    fn default() -> Self {
        Self {
            offload: Offload::default(),
            max_concurrent_operations: default_max_concurrent_operations(),
            operation_timeout_ms: None,
            emit_events: default_emit_events(),
        }
    }
}

impl EntryPointConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ThreadscopeError::Config` for malformed or invalid input.
    pub fn from_json(json: &str) -> Result<Self, ThreadscopeError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| ThreadscopeError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the offload mode.
    #[must_use]
    pub const fn with_offload(mut self, offload: Offload) -> Self {
        self.offload = offload;
        self
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub const fn with_max_concurrent_operations(mut self, max: usize) -> Self {
        self.max_concurrent_operations = max;
        self
    }

    /// Sets the per-operation timeout.
    #[must_use]
    pub const fn with_operation_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.operation_timeout_ms = Some(timeout_ms);
        self
    }

    /// Enables or disables events.
    #[must_use]
    pub const fn with_emit_events(mut self, emit: bool) -> Self {
        self.emit_events = emit;
        self
    }

    /// Gets the per-operation timeout as a Duration.
    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ThreadscopeError::Config` if the concurrency limit or timeout
    /// is zero.
    pub fn validate(&self) -> Result<(), ThreadscopeError> {
        if self.max_concurrent_operations == 0 {
            return Err(ThreadscopeError::Config(
                "max_concurrent_operations must be greater than 0".to_string(),
            ));
        }
        if self.operation_timeout_ms == Some(0) {
            return Err(ThreadscopeError::Config(
                "operation_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = EntryPointConfig::default();
        assert_eq!(config.offload, Offload::Worker);
        assert_eq!(config.max_concurrent_operations, 16);
        assert!(config.operation_timeout().is_none());
        assert!(config.emit_events);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config =
            EntryPointConfig::from_json(r#"{"offload": "blocking", "operation_timeout_ms": 250}"#)
                .unwrap();

        assert_eq!(
            config,
            EntryPointConfig::new()
                .with_offload(Offload::Blocking)
                .with_operation_timeout_ms(250)
        );
        assert_eq!(config.operation_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        assert!(matches!(
            EntryPointConfig::from_json(r#"{"max_concurrent_operations": 0}"#),
            Err(ThreadscopeError::Config(_))
        ));
        assert!(matches!(
            EntryPointConfig::from_json(r#"{"offload": "elsewhere"}"#),
            Err(ThreadscopeError::Config(_))
        ));
        assert!(EntryPointConfig::new()
            .with_operation_timeout_ms(0)
            .validate()
            .is_err());
    }
}
