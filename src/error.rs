use std::error::Error as StdError;
use std::fmt::Write as _;

use thiserror::Error;

/// Boxed error raised by a driver implementation.
pub type DriverError = Box<dyn StdError + Send + Sync>;

/// Error type for pgprobe operations
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(#[source] DriverError),

    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] DriverError),

    #[error("Query failed: {0}")]
    QueryFailed(#[source] DriverError),

    #[error("global timeout exceeded, function was invoked at {invoked_at}")]
    GlobalTimeout { invoked_at: String },

    #[error("Query task aborted: {0}")]
    TaskAborted(String),

    #[error("Failed to serialize {what}: {source}")]
    Serialization {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ProbeError {
    /// Renders the full diagnostic reported back to the caller: the message,
    /// every error in the source chain, then the structured `Debug` form.
    pub fn diagnostic(&self) -> String {
        let mut out = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            let _ = write!(out, "\n    caused by: {err}");
            source = err.source();
        }
        let _ = write!(out, "\n{self:?}");
        out
    }
}

/// Result type alias for pgprobe operations
pub type Result<T> = std::result::Result<T, ProbeError>;
