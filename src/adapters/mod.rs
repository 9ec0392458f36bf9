//! Backend adapters.
//!
//! Every data store is driven through the [`Adapter`] contract: the runner
//! never knows whether it is talking to a remote server, an embedded file,
//! or an in-memory map. Each adapter owns its resources exclusively,
//! including any container it elects to start.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{Config, ScanSpec};
use crate::error::BenchError;

pub mod dry;
pub mod lmdb;
pub mod map;
pub mod mongodb;
pub mod mysql;
pub mod neo4j;
pub mod postgres;
pub mod redb;
pub mod redis;
pub mod rocksdb;
pub mod sqlite;
pub mod surrealdb;

/// Connection pool sizing shared by the networked adapters: enough headroom
/// for `clients x threads` concurrent calls.
pub(crate) const POOL_MAX_CONNECTIONS: usize = 100;
pub(crate) const POOL_IDLE_CONNECTIONS: usize = 20;

/// Deadline for a managed container's readiness probe.
pub(crate) const HEALTH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(90);

/// The operation contract every backend implements.
///
/// `initialize` completes before any operation is issued; `cleanup` runs
/// exactly once per run even on fatal error and must be idempotent.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Stable adapter label used in results and file names.
    fn name(&self) -> &'static str;

    /// Establish connections, start a managed container if needed, and
    /// create schema objects.
    async fn initialize(&self) -> Result<(), BenchError>;

    /// Release connections and tear down any managed container.
    async fn cleanup(&self) -> Result<(), BenchError>;

    /// Insert a new record under a unique key.
    async fn create(&self, key: &str, doc: &Value) -> Result<(), BenchError>;

    /// Fetch the record for a key; `NotFound` when absent.
    async fn read(&self, key: &str) -> Result<Value, BenchError>;

    /// Replace the record for an existing key.
    async fn update(&self, key: &str, doc: &Value) -> Result<(), BenchError>;

    /// Remove the record for a key.
    async fn delete(&self, key: &str) -> Result<(), BenchError>;

    /// Execute a scan and return the observed row count.
    async fn scan(&self, spec: &ScanSpec) -> Result<usize, BenchError>;
}

/// Backend identifiers accepted by the factory.
pub const KNOWN_BACKENDS: &[&str] = &[
    "dry",
    "map",
    "mysql",
    "postgres",
    "sqlite",
    "mongodb",
    "neo4j",
    "redis",
    "keydb",
    "dragonfly",
    "lmdb",
    "redb",
    "rocksdb",
    "surrealdb",
];

/// Construct the adapter for the configured backend.
///
/// Construction is cheap; all I/O waits for `initialize`.
pub fn new_adapter(config: &Config) -> Result<Arc<dyn Adapter>, BenchError> {
    let adapter: Arc<dyn Adapter> = match config.database.as_str() {
        "dry" => Arc::new(dry::DryAdapter::new()),
        "map" => Arc::new(map::MapAdapter::new()),
        "mysql" => Arc::new(mysql::MysqlAdapter::new(config)),
        "postgres" => Arc::new(postgres::PostgresAdapter::new(config)),
        "sqlite" => Arc::new(sqlite::SqliteAdapter::new()),
        "mongodb" => Arc::new(mongodb::MongodbAdapter::new(config)),
        "neo4j" => Arc::new(neo4j::Neo4jAdapter::new(config)),
        "redis" => Arc::new(redis::RedisAdapter::new(config, redis::Flavor::Redis)),
        "keydb" => Arc::new(redis::RedisAdapter::new(config, redis::Flavor::KeyDb)),
        "dragonfly" => Arc::new(redis::RedisAdapter::new(config, redis::Flavor::Dragonfly)),
        "lmdb" => Arc::new(lmdb::LmdbAdapter::new()),
        "redb" => Arc::new(redb::RedbAdapter::new()),
        "rocksdb" => Arc::new(rocksdb::RocksdbAdapter::new()),
        "surrealdb" => Arc::new(surrealdb::SurrealdbAdapter::new(config)),
        other => {
            return Err(BenchError::Config(format!(
                "unknown backend '{other}', expected one of: {}",
                KNOWN_BACKENDS.join(", ")
            )))
        }
    };
    Ok(adapter)
}

/// Top-level `text` field projected into a typed column by schema-ful
/// adapters.
pub(crate) fn doc_text(doc: &Value) -> Option<String> {
    doc.get("text").and_then(Value::as_str).map(str::to_string)
}

/// Top-level `integer` field projected into a typed column by schema-ful
/// adapters.
pub(crate) fn doc_integer(doc: &Value) -> Option<i64> {
    doc.get("integer").and_then(Value::as_i64)
}

/// Count the rows of an iterator after applying a scan's offset and limit.
pub(crate) fn count_window<I>(iter: I, spec: &ScanSpec) -> usize
where
    I: Iterator,
{
    let skipped = iter.skip(spec.start);
    if spec.limit > 0 {
        skipped.take(spec.limit).count()
    } else {
        skipped.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KeyType, Projection};

    fn test_config(database: &str) -> Config {
        Config {
            database: database.into(),
            name: None,
            endpoint: None,
            image: None,
            privileged: false,
            samples: 10,
            clients: 1,
            threads: 1,
            key_type: KeyType::Integer,
            value: crate::config::DEFAULT_VALUE_TEMPLATE.into(),
            random: false,
            scans: vec![],
            pid: None,
            seed: None,
            phase_timeout: None,
        }
    }

    fn scan(start: usize, limit: usize) -> ScanSpec {
        ScanSpec {
            name: "s".into(),
            samples: None,
            projection: Projection::Full,
            start,
            limit,
            expect: 0,
        }
    }

    #[test]
    fn test_factory_accepts_every_known_backend() {
        for backend in KNOWN_BACKENDS {
            let adapter = new_adapter(&test_config(backend)).unwrap();
            assert!(!adapter.name().is_empty());
        }
    }

    #[test]
    fn test_factory_rejects_unknown_backend() {
        let err = new_adapter(&test_config("flatfile")).unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
        assert!(err.to_string().contains("flatfile"));
    }

    #[test]
    fn test_count_window() {
        let items = 0..100;
        assert_eq!(count_window(items.clone(), &scan(0, 0)), 100);
        assert_eq!(count_window(items.clone(), &scan(30, 0)), 70);
        assert_eq!(count_window(items.clone(), &scan(0, 10)), 10);
        assert_eq!(count_window(items.clone(), &scan(95, 10)), 5);
        assert_eq!(count_window(items.clone(), &scan(100, 10)), 0);
        assert_eq!(count_window(items, &scan(200, 0)), 0);
    }

    #[test]
    fn test_doc_field_projection() {
        let doc = serde_json::json!({"text": "hello", "integer": 42, "extra": true});
        assert_eq!(doc_text(&doc).as_deref(), Some("hello"));
        assert_eq!(doc_integer(&doc), Some(42));

        let doc = serde_json::json!({"other": 1});
        assert_eq!(doc_text(&doc), None);
        assert_eq!(doc_integer(&doc), None);
    }
}
