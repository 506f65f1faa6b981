//! Sinks that persist a [`UnifiedRecordBatch`](harvest_core::UnifiedRecordBatch).

pub mod flat;
pub mod sql;
pub mod sqlite;

pub use flat::FlatFileSink;
pub use sql::{Connection, Connector, SqlSink, SqlValue};
pub use sqlite::{SqliteConnection, SqliteConnector};

use harvest_core::{Result, UnifiedRecordBatch};

/// A persistence backend for extracted batches.
pub trait Sink {
    /// Write one batch. Sinks are independent: a failure here does not undo
    /// what another sink already wrote.
    fn persist(&mut self, batch: &UnifiedRecordBatch) -> Result<()>;
}
