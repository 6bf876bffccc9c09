//! Runs a request's operations as sibling tasks.

use super::request::{OperationCall, OperationError, Request, Response};
use crate::carrier::{spawn_with_carrier, Carrier};
use crate::errors::InvocationError;
use crate::events::{self, EventSink};
use crate::invocation::WorkRegistry;
use crate::observability::SpanTimer;
use futures::future::join_all;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

#[derive(Clone)]
pub(crate) struct Executor {
    pub(crate) works: Arc<WorkRegistry>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) max_concurrent: usize,
    pub(crate) timeout: Option<Duration>,
}

impl Executor {
    /// Runs every operation of `request` with `carrier` attached and collects
    /// the results in request order.
    pub(crate) async fn execute(self, carrier: Carrier, request: Request) -> Response {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        let handles: Vec<_> = request
            .operations
            .iter()
            .cloned()
            .map(|call| {
                let executor = self.clone();
                let semaphore = Arc::clone(&semaphore);
                let carrier = carrier.clone();
                spawn_with_carrier(carrier.clone(), async move {
                    // The semaphore is never closed.
                    let _permit = semaphore.acquire_owned().await.ok();
                    executor.run_operation(&call, carrier).await
                })
            })
            .collect();

        let mut response = Response::default();
        for (call, joined) in request.operations.iter().zip(join_all(handles).await) {
            let key = call.response_key();
            let result = joined.unwrap_or_else(|err| {
                Err(InvocationError::Join {
                    operation: call.name.clone(),
                    message: err.to_string(),
                })
            });
            match result {
                Ok(value) => {
                    response.data.insert(key.to_string(), value);
                }
                Err(err) => {
                    response.errors.push(OperationError::new(key, &err));
                    response.data.insert(key.to_string(), Value::Null);
                }
            }
        }
        response
    }

    async fn run_operation(
        &self,
        call: &OperationCall,
        carrier: Carrier,
    ) -> Result<Value, InvocationError> {
        let key = call.response_key();
        let timer = SpanTimer::start(&call.name);

        let result = match self.works.invoke(&call.to_invocation(carrier)) {
            Ok(outcome) => {
                let settled = async { outcome.resolve().await.map_err(InvocationError::from_deferred) };
                match self.timeout {
                    Some(limit) => with_timeout(&call.name, limit, settled).await,
                    None => settled.await,
                }
            }
            Err(err) => Err(err),
        };

        let duration_ms = timer.finish();
        match &result {
            Ok(_) => {
                debug!(operation = %call.name, alias = key, duration_ms, "Operation completed");
                self.sink.try_emit(
                    events::OPERATION_COMPLETED,
                    Some(events::operation_completed(&call.name, key, duration_ms)),
                );
            }
            Err(err) => {
                warn!(operation = %call.name, alias = key, error = %err, "Operation failed");
                self.sink.try_emit(
                    events::OPERATION_FAILED,
                    Some(events::operation_failed(
                        &call.name,
                        key,
                        duration_ms,
                        &err.to_string(),
                    )),
                );
            }
        }
        result
    }
}

async fn with_timeout<T, F>(operation: &str, limit: Duration, future: F) -> Result<T, InvocationError>
where
    F: Future<Output = Result<T, InvocationError>>,
{
    tokio::time::timeout(limit, future)
        .await
        .unwrap_or_else(|_| {
            Err(InvocationError::Timeout {
                operation: operation.to_string(),
                timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_maps_elapsed() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, InvocationError>(1)
        };
        let err = with_timeout("slow", Duration::from_millis(10), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::Timeout { timeout_ms: 10, .. }));

        let fast = with_timeout("fast", Duration::from_millis(200), async { Ok(2) }).await;
        assert_eq!(fast.unwrap(), 2);
    }
}
