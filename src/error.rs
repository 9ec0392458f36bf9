//! Error types for the benchmark harness.

use thiserror::Error;

/// Errors that can occur during a benchmark run.
///
/// Each variant maps to a distinct failure stage so that the binary can
/// derive its exit code from the first fatal error encountered.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Bad flags, unparseable value template or scan specs, unknown backend.
    #[error("configuration error: {0}")]
    Config(String),

    /// Container pull/start/probe, initial connection, or schema creation failure.
    #[error("setup error: {0}")]
    Setup(String),

    /// Per-operation failure during a phase.
    #[error("backend error: {0}")]
    Backend(String),

    /// Returned by `read` when the key is absent.
    #[error("key not found: {0}")]
    NotFound(String),

    /// Teardown failure; logged, never aborts the run.
    #[error("teardown error: {0}")]
    Teardown(String),

    /// Engine-initiated cancellation (interrupt signal or phase abort).
    #[error("operation cancelled")]
    Cancelled,
}

impl BenchError {
    /// Process exit code for this error when it is the run's fatal outcome.
    ///
    /// An interrupt-cancelled run still exits 0 as long as teardown
    /// succeeded; partial results are not a failure of the harness.
    pub fn exit_code(&self) -> i32 {
        match self {
            BenchError::Config(_) => 1,
            BenchError::Setup(_) => 2,
            BenchError::Backend(_) | BenchError::NotFound(_) => 3,
            BenchError::Teardown(_) => 0,
            BenchError::Cancelled => 0,
        }
    }

    /// Attach the sample index at which an operation failed.
    pub fn at_sample(self, index: usize) -> Self {
        match self {
            BenchError::Backend(msg) => {
                BenchError::Backend(format!("sample {index}: {msg}"))
            }
            BenchError::NotFound(msg) => {
                BenchError::NotFound(format!("sample {index}: {msg}"))
            }
            other => other,
        }
    }
}

impl From<serde_json::Error> for BenchError {
    fn from(err: serde_json::Error) -> Self {
        BenchError::Backend(format!("JSON encoding: {err}"))
    }
}

impl From<mysql_async::Error> for BenchError {
    fn from(err: mysql_async::Error) -> Self {
        BenchError::Backend(format!("MySQL: {err}"))
    }
}

impl From<tokio_postgres::Error> for BenchError {
    fn from(err: tokio_postgres::Error) -> Self {
        BenchError::Backend(format!("PostgreSQL: {err}"))
    }
}

impl From<mongodb::error::Error> for BenchError {
    fn from(err: mongodb::error::Error) -> Self {
        BenchError::Backend(format!("MongoDB: {err}"))
    }
}

impl From<neo4rs::Error> for BenchError {
    fn from(err: neo4rs::Error) -> Self {
        BenchError::Backend(format!("Neo4j: {err}"))
    }
}

impl From<redis::RedisError> for BenchError {
    fn from(err: redis::RedisError) -> Self {
        BenchError::Backend(format!("Redis: {err}"))
    }
}

impl From<rusqlite::Error> for BenchError {
    fn from(err: rusqlite::Error) -> Self {
        BenchError::Backend(format!("SQLite: {err}"))
    }
}

impl From<heed::Error> for BenchError {
    fn from(err: heed::Error) -> Self {
        BenchError::Backend(format!("LMDB: {err}"))
    }
}

impl From<redb::Error> for BenchError {
    fn from(err: redb::Error) -> Self {
        BenchError::Backend(format!("redb: {err}"))
    }
}

impl From<redb::TransactionError> for BenchError {
    fn from(err: redb::TransactionError) -> Self {
        redb::Error::from(err).into()
    }
}

impl From<redb::TableError> for BenchError {
    fn from(err: redb::TableError) -> Self {
        redb::Error::from(err).into()
    }
}

impl From<redb::StorageError> for BenchError {
    fn from(err: redb::StorageError) -> Self {
        redb::Error::from(err).into()
    }
}

impl From<redb::CommitError> for BenchError {
    fn from(err: redb::CommitError) -> Self {
        redb::Error::from(err).into()
    }
}

impl From<rocksdb::Error> for BenchError {
    fn from(err: rocksdb::Error) -> Self {
        BenchError::Backend(format!("RocksDB: {err}"))
    }
}

impl From<surrealdb::Error> for BenchError {
    fn from(err: surrealdb::Error) -> Self {
        BenchError::Backend(format!("SurrealDB: {err}"))
    }
}
