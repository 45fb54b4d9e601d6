use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{QueryOutput, SqlValue};

/// Trait for database driver implementations.
/// Drivers are responsible for:
/// - Establishing the network connection (lazily, on first use)
/// - Encoding SqlValue parameters for the wire
/// - Executing queries and converting results to QueryOutput
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Execute a SQL query.
    /// `params` is `None` when the caller supplied no parameter list at all,
    /// which drivers must keep distinct from an empty list.
    async fn query(&self, sql: &str, params: Option<&[SqlValue]>) -> Result<QueryOutput>;

    /// Release the handle.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Builds driver handles from connection strings.
pub trait Connector: Send + Sync {
    /// Identifier of the driver implementation, reported as `driverName`.
    fn driver_name(&self) -> &str;

    /// Validate the connection string and construct a handle.
    /// Must not perform network I/O.
    fn connect(&self, connection_string: &str) -> Result<Arc<dyn DatabaseDriver>>;
}
