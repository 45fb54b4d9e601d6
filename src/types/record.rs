use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Wall-clock timestamp carried in attempt records.
pub type Timestamp = DateTime<Utc>;

/// Current time, truncated to the millisecond precision records report.
pub fn timestamp_now() -> Timestamp {
    Utc::now().trunc_subsecs(3)
}

/// Duration between two timestamps in nanoseconds, at millisecond resolution.
pub fn duration_ns(started_at: Timestamp, finished_at: Timestamp) -> i64 {
    let millis = finished_at.timestamp_millis() - started_at.timestamp_millis();
    millis.max(0).saturating_mul(1_000_000)
}

/// Static identifiers of the running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub exitnode: String,
    pub driver_name: String,
}

impl Identity {
    pub fn new(exitnode: impl Into<String>, driver_name: impl Into<String>) -> Self {
        Self {
            exitnode: exitnode.into(),
            driver_name: driver_name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptKind {
    Db,
    UnhandledException,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptMethod {
    Connect,
    Query,
    Catch,
}

/// Uniform report of one attempted operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub exitnode: String,
    pub kind: AttemptKind,
    pub addr: String,
    pub driver: String,
    pub method: AttemptMethod,
    pub request: String,
    pub response: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
    pub is_failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ns: Option<i64>,
}

impl AttemptRecord {
    fn db(identity: &Identity, addr: &str, method: AttemptMethod, request: String) -> Self {
        Self {
            exitnode: identity.exitnode.clone(),
            kind: AttemptKind::Db,
            addr: addr.to_string(),
            driver: identity.driver_name.clone(),
            method,
            request,
            response: String::new(),
            error: String::new(),
            started_at: None,
            finished_at: None,
            is_failed: false,
            duration_ns: None,
        }
    }

    /// Record for a connection handle that could not be constructed.
    pub fn connect_failed(
        identity: &Identity,
        addr: &str,
        started_at: Timestamp,
        error: String,
    ) -> Self {
        Self {
            started_at: Some(started_at),
            error,
            is_failed: true,
            ..Self::db(identity, addr, AttemptMethod::Connect, String::new())
        }
    }

    pub fn query_succeeded(
        identity: &Identity,
        addr: &str,
        request: String,
        started_at: Timestamp,
        finished_at: Timestamp,
        response: String,
    ) -> Self {
        Self {
            response,
            started_at: Some(started_at),
            finished_at: Some(finished_at),
            duration_ns: Some(duration_ns(started_at, finished_at)),
            ..Self::db(identity, addr, AttemptMethod::Query, request)
        }
    }

    pub fn query_failed(
        identity: &Identity,
        addr: &str,
        request: String,
        started_at: Timestamp,
        error: String,
    ) -> Self {
        Self {
            error,
            started_at: Some(started_at),
            is_failed: true,
            ..Self::db(identity, addr, AttemptMethod::Query, request)
        }
    }

    /// The top-level fallback record for a failure nothing else captured.
    pub fn unhandled(identity: &Identity, error: String) -> Self {
        Self {
            exitnode: identity.exitnode.clone(),
            kind: AttemptKind::UnhandledException,
            addr: "unknown".to_string(),
            driver: identity.driver_name.clone(),
            method: AttemptMethod::Catch,
            request: String::new(),
            response: String::new(),
            error,
            started_at: None,
            finished_at: None,
            is_failed: true,
            duration_ns: None,
        }
    }
}

/// The output of one probe invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub driver_name: String,
    pub queries: Vec<AttemptRecord>,
}

impl BatchResponse {
    pub fn new(driver_name: impl Into<String>, queries: Vec<AttemptRecord>) -> Self {
        Self {
            driver_name: driver_name.into(),
            queries,
        }
    }

    /// Returns true if any recorded attempt failed.
    pub fn has_failure(&self) -> bool {
        self.queries.iter().any(|record| record.is_failed)
    }
}
