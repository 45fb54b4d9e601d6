mod pg_cell;
mod postgres;

pub use self::in_memory_test::{
    InMemoryTestConnector, InMemoryTestDriver, InMemoryTestResponseBuilder, RecordedQuery,
    ScriptedOutcome, IN_MEMORY_DRIVER_NAME,
};
pub use self::postgres::{command_tag, PostgresConnector, PostgresDriver, DRIVER_NAME};
