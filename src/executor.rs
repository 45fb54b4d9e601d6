use std::any::Any;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::SecondsFormat;
use tokio::task::JoinError;
use tokio::time::Sleep;
use tracing::{info, info_span, warn, Instrument};

use crate::error::{ProbeError, Result};
use crate::traits::{Connector, DatabaseDriver};
use crate::types::{
    timestamp_now, AttemptRecord, BatchRequest, BatchResponse, Identity, QueryOutput, QuerySpec,
    Timestamp,
};

/// Ceiling for a whole batch, measured from the moment it is received.
pub const DEFAULT_GLOBAL_TIMEOUT: Duration = Duration::from_secs(14);

/// Runs a batch of queries over one freshly acquired connection handle and
/// reports every attempt as an [`AttemptRecord`].
///
/// The batch stops at the first failed attempt. All queries share a single
/// deadline; a query still outstanding when it elapses is abandoned, not
/// cancelled, and reported as failed.
pub struct BatchExecutor {
    connector: Arc<dyn Connector>,
    identity: Identity,
    global_timeout: Duration,
}

impl BatchExecutor {
    pub fn new(connector: Arc<dyn Connector>, exitnode: impl Into<String>) -> Self {
        let identity = Identity::new(exitnode, connector.driver_name());
        Self {
            connector,
            identity,
            global_timeout: DEFAULT_GLOBAL_TIMEOUT,
        }
    }

    pub fn with_global_timeout(mut self, timeout: Duration) -> Self {
        self.global_timeout = timeout;
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn global_timeout(&self) -> Duration {
        self.global_timeout
    }

    /// Execute the batch. Failures are reported in the records, never returned.
    pub async fn run(&self, request: BatchRequest) -> BatchResponse {
        let span = info_span!("batch", queries = request.queries.len());
        self.run_batch(request).instrument(span).await
    }

    async fn run_batch(&self, request: BatchRequest) -> BatchResponse {
        let invoked_at = timestamp_now();
        let deadline = tokio::time::sleep(self.global_timeout);
        tokio::pin!(deadline);

        let mut records = Vec::with_capacity(request.queries.len() + 1);
        let mut has_failed = false;

        let driver = match self.acquire(&request.connstr) {
            Ok(driver) => Some(driver),
            Err(record) => {
                records.push(record);
                has_failed = true;
                None
            }
        };

        for spec in &request.queries {
            if has_failed {
                break;
            }
            let Some(driver) = driver.as_ref() else {
                break;
            };

            let record = self
                .attempt_query(driver, &request.connstr, spec, invoked_at, deadline.as_mut())
                .await;
            has_failed = record.is_failed;
            records.push(record);
        }

        BatchResponse::new(self.identity.driver_name.clone(), records)
    }

    /// Construct the connection handle, or the single record reporting why not.
    fn acquire(&self, addr: &str) -> std::result::Result<Arc<dyn DatabaseDriver>, AttemptRecord> {
        let started_at = timestamp_now();
        self.connector.connect(addr).map_err(|e| {
            let diagnostic = e.diagnostic();
            warn!(error = %diagnostic, "connect failed");
            AttemptRecord::connect_failed(&self.identity, addr, started_at, diagnostic)
        })
    }

    async fn attempt_query(
        &self,
        driver: &Arc<dyn DatabaseDriver>,
        addr: &str,
        spec: &QuerySpec,
        invoked_at: Timestamp,
        deadline: Pin<&mut Sleep>,
    ) -> AttemptRecord {
        let started_at = timestamp_now();
        let request = match serialize_request(spec) {
            Ok(request) => request,
            Err(e) => {
                let diagnostic = e.diagnostic();
                warn!(error = %diagnostic, "query not run");
                return AttemptRecord::query_failed(
                    &self.identity,
                    addr,
                    String::new(),
                    started_at,
                    diagnostic,
                );
            }
        };

        info!(query = %spec.query, connstr = %addr, "running query");
        let outcome = race_deadline(driver, spec, invoked_at, deadline).await;
        let finished_at = timestamp_now();

        match outcome.and_then(|output| serialize_output(&output)) {
            Ok(response) => AttemptRecord::query_succeeded(
                &self.identity,
                addr,
                request,
                started_at,
                finished_at,
                response,
            ),
            Err(e) => {
                let diagnostic = e.diagnostic();
                warn!(error = %diagnostic, "query failed");
                AttemptRecord::query_failed(&self.identity, addr, request, started_at, diagnostic)
            }
        }
    }
}

/// Run the query on its own task and wait for whichever comes first: the
/// query's result or the batch deadline. A query that loses is left running
/// and its result is discarded.
async fn race_deadline(
    driver: &Arc<dyn DatabaseDriver>,
    spec: &QuerySpec,
    invoked_at: Timestamp,
    deadline: Pin<&mut Sleep>,
) -> Result<QueryOutput> {
    let task = {
        let driver = Arc::clone(driver);
        let sql = spec.query.clone();
        let params = spec.params.clone();
        tokio::spawn(async move { driver.query(&sql, params.as_deref()).await })
    };

    tokio::select! {
        joined = task => joined.unwrap_or_else(|e| Err(ProbeError::TaskAborted(join_error_message(e)))),
        () = deadline => Err(ProbeError::GlobalTimeout {
            invoked_at: invoked_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }),
    }
}

fn serialize_request(spec: &QuerySpec) -> Result<String> {
    serde_json::to_string(spec).map_err(|source| ProbeError::Serialization {
        what: "query request",
        source,
    })
}

fn serialize_output(output: &QueryOutput) -> Result<String> {
    serde_json::to_string(output).map_err(|source| ProbeError::Serialization {
        what: "query result",
        source,
    })
}

pub(crate) fn join_error_message(err: JoinError) -> String {
    if err.is_panic() {
        format!("driver panicked: {}", panic_message(err.into_panic().as_ref()))
    } else {
        err.to_string()
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SqlValue;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(payload.as_ref()), "owned boom");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }

    #[test]
    fn test_serialize_request_keeps_params_marker() {
        let with_params = QuerySpec::new("SELECT $1", vec![SqlValue::Int64(1)]);
        assert_eq!(
            serialize_request(&with_params).unwrap(),
            r#"{"query":"SELECT $1","params":[1]}"#
        );

        let without = QuerySpec::without_params("SELECT 1");
        assert_eq!(
            serialize_request(&without).unwrap(),
            r#"{"query":"SELECT 1","params":null}"#
        );
    }

    #[tokio::test]
    async fn test_join_error_from_panicking_task() {
        let err = tokio::spawn(async { panic!("driver exploded") })
            .await
            .unwrap_err();
        assert_eq!(join_error_message(err), "driver panicked: driver exploded");
    }
}
