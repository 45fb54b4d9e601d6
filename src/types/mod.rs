mod output;
mod record;
mod request;
mod sql_value;

pub use output::{FieldDescription, QueryOutput};
pub use record::{
    duration_ns, timestamp_now, AttemptKind, AttemptMethod, AttemptRecord, BatchResponse,
    Identity, Timestamp,
};
pub use request::{BatchRequest, QuerySpec};
pub use sql_value::SqlValue;
