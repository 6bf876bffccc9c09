//! Request and response types.

use crate::carrier::Carrier;
use crate::errors::{InvocationError, ThreadscopeError};
use crate::invocation::Invocation;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A request naming the operations to run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// The operations to run, as siblings.
    #[serde(default)]
    pub operations: Vec<OperationCall>,
}

impl Request {
    /// Creates an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an operation.
    #[must_use]
    pub fn with_operation(mut self, call: OperationCall) -> Self {
        self.operations.push(call);
        self
    }

    /// Parses a request body.
    ///
    /// # Errors
    ///
    /// Returns `ThreadscopeError::Serialization` for malformed bodies.
    pub fn from_json(body: &str) -> Result<Self, ThreadscopeError> {
        Ok(serde_json::from_str(body)?)
    }
}

/// One operation of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationCall {
    /// The registered operation name.
    pub name: String,
    /// The key the result is reported under; defaults to the name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Arguments passed to the unit of work.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl OperationCall {
    /// Creates a call of `name` with no arguments.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: Map::new(),
        }
    }

    /// Sets the response key.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Sets one argument.
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    /// Returns the key this call's result is reported under.
    #[must_use]
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Builds the invocation for this call, tunnelling `carrier` through it.
    #[must_use]
    pub fn to_invocation(&self, carrier: Carrier) -> Invocation {
        Invocation::new(self.name.clone())
            .with_arguments(self.arguments.clone())
            .with_carrier(carrier)
    }
}

/// A failed operation, as reported in the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    /// The error message.
    pub message: String,
    /// The response key of the failed operation.
    pub path: Vec<String>,
    /// Error classification.
    pub classification: String,
}

impl OperationError {
    /// Describes `err` raised by the operation reported under `key`.
    #[must_use]
    pub fn new(key: &str, err: &InvocationError) -> Self {
        let classification = match err {
            InvocationError::Propagation(_) => "PROPAGATION",
            InvocationError::Delegate(_) => "DATA_FETCHING",
            InvocationError::UnknownOperation(_) => "UNKNOWN_OPERATION",
            InvocationError::Timeout { .. } => "TIMEOUT",
            InvocationError::Join { .. } => "INTERNAL",
        };
        Self {
            message: err.to_string(),
            path: vec![key.to_string()],
            classification: classification.to_string(),
        }
    }
}

/// The outcome of a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    /// Results by response key; failed operations map to null.
    pub data: Map<String, Value>,
    /// Errors of failed operations, in request order.
    pub errors: Vec<OperationError>,
}

impl Response {
    /// Returns true if no operation failed.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the result reported under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Renders the response as `{"data": ..., "errors": [...]}`.
    ///
    /// `errors` is left out when nothing failed.
    #[must_use]
    pub fn to_specification(&self) -> Value {
        let mut result = json!({ "data": self.data });
        if !self.errors.is_empty() {
            result["errors"] = json!(self.errors);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_from_json() {
        let request = Request::from_json(
            r#"{"operations": [
                {"name": "greet", "arguments": {"who": "ada"}},
                {"name": "greet", "alias": "again"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(
            request,
            Request::new()
                .with_operation(OperationCall::new("greet").with_argument("who", "ada"))
                .with_operation(OperationCall::new("greet").with_alias("again"))
        );
        assert_eq!(request.operations[1].response_key(), "again");
        assert!(matches!(
            Request::from_json("{"),
            Err(ThreadscopeError::Serialization(_))
        ));
    }

    #[test]
    fn test_to_specification_omits_empty_errors() {
        let mut response = Response::default();
        response.data.insert("a".to_string(), json!(1));
        assert_eq!(response.to_specification(), json!({"data": {"a": 1}}));

        response.data.insert("b".to_string(), Value::Null);
        response.errors.push(OperationError::new(
            "b",
            &InvocationError::UnknownOperation("b".to_string()),
        ));
        assert_eq!(
            response.to_specification(),
            json!({
                "data": {"a": 1, "b": null},
                "errors": [{
                    "message": "operation 'b' is not registered",
                    "path": ["b"],
                    "classification": "UNKNOWN_OPERATION"
                }]
            })
        );
    }
}
