//! SQLite adapter (embedded).
//!
//! Uses a bundled SQLite database in a temporary directory. The connection
//! is guarded by a mutex; operations are short and synchronous.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde_json::Value;
use tempfile::TempDir;

use crate::adapters::{doc_integer, doc_text, Adapter};
use crate::config::{Projection, ScanSpec};
use crate::error::BenchError;

struct SqliteState {
    conn: Connection,
    // Holds the database file alive for the duration of the run.
    _dir: TempDir,
}

pub struct SqliteAdapter {
    state: Mutex<Option<SqliteState>>,
}

impl SqliteAdapter {
    pub fn new() -> Self {
        SqliteAdapter {
            state: Mutex::new(None),
        }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, BenchError>,
    ) -> Result<T, BenchError> {
        let guard = self.state.lock();
        let state = guard
            .as_ref()
            .ok_or_else(|| BenchError::Backend("SQLite adapter not initialized".into()))?;
        f(&state.conn)
    }
}

impl Default for SqliteAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for SqliteAdapter {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn initialize(&self) -> Result<(), BenchError> {
        let dir = TempDir::new()
            .map_err(|e| BenchError::Setup(format!("failed to create SQLite directory: {e}")))?;
        let conn = Connection::open(dir.path().join("bench.db"))
            .map_err(|e| BenchError::Setup(format!("failed to open SQLite database: {e}")))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| BenchError::Setup(format!("failed to set journal mode: {e}")))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS bench (
                id TEXT PRIMARY KEY,
                text_val TEXT,
                integer_val INTEGER,
                data TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| BenchError::Setup(format!("failed to create SQLite table: {e}")))?;

        *self.state.lock() = Some(SqliteState { conn, _dir: dir });
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), BenchError> {
        // Dropping the state closes the connection and removes the tempdir.
        self.state.lock().take();
        Ok(())
    }

    async fn create(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        let data = serde_json::to_string(doc)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO bench (id, text_val, integer_val, data) VALUES (?1, ?2, ?3, ?4)",
                params![key, doc_text(doc), doc_integer(doc), data],
            )?;
            Ok(())
        })
    }

    async fn read(&self, key: &str) -> Result<Value, BenchError> {
        let data = self.with_conn(|conn| {
            conn.query_row(
                "SELECT data FROM bench WHERE id = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => BenchError::NotFound(key.to_string()),
                other => other.into(),
            })
        })?;
        Ok(serde_json::from_str(&data)?)
    }

    async fn update(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        let data = serde_json::to_string(doc)?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE bench SET text_val = ?2, integer_val = ?3, data = ?4 WHERE id = ?1",
                params![key, doc_text(doc), doc_integer(doc), data],
            )?;
            if changed == 0 {
                return Err(BenchError::NotFound(key.to_string()));
            }
            Ok(())
        })
    }

    async fn delete(&self, key: &str) -> Result<(), BenchError> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM bench WHERE id = ?1", params![key])?;
            if changed == 0 {
                return Err(BenchError::NotFound(key.to_string()));
            }
            Ok(())
        })
    }

    async fn scan(&self, spec: &ScanSpec) -> Result<usize, BenchError> {
        // SQLite accepts LIMIT -1 as "no limit", which keeps OFFSET usable
        // when only a start offset is configured.
        let limit = if spec.limit > 0 {
            spec.limit as i64
        } else {
            -1
        };
        let start = spec.start as i64;
        self.with_conn(|conn| match spec.projection {
            Projection::Count => {
                let sql = format!(
                    "SELECT COUNT(*) FROM (SELECT 1 FROM bench LIMIT {limit} OFFSET {start})"
                );
                let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
                Ok(count as usize)
            }
            Projection::Id | Projection::Full => {
                let column = match spec.projection {
                    Projection::Id => "id",
                    _ => "*",
                };
                let sql =
                    format!("SELECT {column} FROM bench LIMIT {limit} OFFSET {start}");
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query([])?;
                let mut count = 0;
                while rows.next()?.is_some() {
                    count += 1;
                }
                Ok(count)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_crud_round_trip() {
        let adapter = SqliteAdapter::new();
        adapter.initialize().await.unwrap();

        let doc = serde_json::json!({"text": "hello", "integer": 42, "nested": {"a": [1, 2]}});
        adapter.create("k1", &doc).await.unwrap();
        assert_eq!(adapter.read("k1").await.unwrap(), doc);

        let updated = serde_json::json!({"text": "bye", "integer": 1});
        adapter.update("k1", &updated).await.unwrap();
        assert_eq!(adapter.read("k1").await.unwrap(), updated);

        adapter.delete("k1").await.unwrap();
        assert!(matches!(
            adapter.read("k1").await,
            Err(BenchError::NotFound(_))
        ));

        adapter.cleanup().await.unwrap();
        adapter.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_scan_windows() {
        let adapter = SqliteAdapter::new();
        adapter.initialize().await.unwrap();
        for i in 0..50 {
            adapter
                .create(&format!("k{i:03}"), &serde_json::json!({"i": i}))
                .await
                .unwrap();
        }

        for projection in [Projection::Full, Projection::Id, Projection::Count] {
            for (start, limit) in [(0, 0), (10, 0), (0, 5), (48, 5), (50, 5)] {
                let spec = ScanSpec {
                    name: "s".into(),
                    samples: None,
                    projection,
                    start,
                    limit,
                    expect: 0,
                };
                assert_eq!(
                    adapter.scan(&spec).await.unwrap(),
                    spec.expected_window(50),
                    "projection {projection:?} start {start} limit {limit}"
                );
            }
        }
        adapter.cleanup().await.unwrap();
    }
}
