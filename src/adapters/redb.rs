//! redb adapter (embedded).
//!
//! Documents are stored as JSON bytes in a single table of a redb database
//! file kept in a temporary directory.

use async_trait::async_trait;
use parking_lot::RwLock;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde_json::Value;
use tempfile::TempDir;

use crate::adapters::{count_window, Adapter};
use crate::config::{Projection, ScanSpec};
use crate::error::BenchError;

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("bench");

struct RedbState {
    db: Database,
    _dir: TempDir,
}

pub struct RedbAdapter {
    state: RwLock<Option<RedbState>>,
}

impl RedbAdapter {
    pub fn new() -> Self {
        RedbAdapter {
            state: RwLock::new(None),
        }
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&RedbState) -> Result<T, BenchError>,
    ) -> Result<T, BenchError> {
        let guard = self.state.read();
        let state = guard
            .as_ref()
            .ok_or_else(|| BenchError::Backend("redb adapter not initialized".into()))?;
        f(state)
    }
}

impl Default for RedbAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for RedbAdapter {
    fn name(&self) -> &'static str {
        "redb"
    }

    async fn initialize(&self) -> Result<(), BenchError> {
        let dir = TempDir::new()
            .map_err(|e| BenchError::Setup(format!("failed to create redb directory: {e}")))?;
        let db = Database::create(dir.path().join("bench.redb"))
            .map_err(|e| BenchError::Setup(format!("failed to create redb database: {e}")))?;

        // Create the table up front so empty scans see it.
        let wtxn = db
            .begin_write()
            .map_err(|e| BenchError::Setup(format!("failed to open redb transaction: {e}")))?;
        wtxn.open_table(TABLE)
            .map_err(|e| BenchError::Setup(format!("failed to open redb table: {e}")))?;
        wtxn.commit()
            .map_err(|e| BenchError::Setup(format!("failed to commit redb transaction: {e}")))?;

        *self.state.write() = Some(RedbState { db, _dir: dir });
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), BenchError> {
        self.state.write().take();
        Ok(())
    }

    async fn create(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        let data = serde_json::to_vec(doc)?;
        self.with_state(|state| {
            let wtxn = state.db.begin_write()?;
            {
                let mut table = wtxn.open_table(TABLE)?;
                table.insert(key, data.as_slice())?;
            }
            wtxn.commit()?;
            Ok(())
        })
    }

    async fn read(&self, key: &str) -> Result<Value, BenchError> {
        self.with_state(|state| {
            let rtxn = state.db.begin_read()?;
            let table = rtxn.open_table(TABLE)?;
            let guard = table
                .get(key)?
                .ok_or_else(|| BenchError::NotFound(key.to_string()))?;
            Ok(serde_json::from_slice(guard.value())?)
        })
    }

    async fn update(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        let data = serde_json::to_vec(doc)?;
        self.with_state(|state| {
            let wtxn = state.db.begin_write()?;
            {
                let mut table = wtxn.open_table(TABLE)?;
                if table.insert(key, data.as_slice())?.is_none() {
                    return Err(BenchError::NotFound(key.to_string()));
                }
            }
            wtxn.commit()?;
            Ok(())
        })
    }

    async fn delete(&self, key: &str) -> Result<(), BenchError> {
        self.with_state(|state| {
            let wtxn = state.db.begin_write()?;
            let existed = {
                let mut table = wtxn.open_table(TABLE)?;
                let existed = table.remove(key)?.is_some();
                existed
            };
            wtxn.commit()?;
            if !existed {
                return Err(BenchError::NotFound(key.to_string()));
            }
            Ok(())
        })
    }

    async fn scan(&self, spec: &ScanSpec) -> Result<usize, BenchError> {
        self.with_state(|state| {
            let rtxn = state.db.begin_read()?;
            let table = rtxn.open_table(TABLE)?;
            match spec.projection {
                Projection::Count => {
                    let total = table.len()? as usize;
                    Ok(spec.expected_window(total))
                }
                Projection::Id | Projection::Full => Ok(count_window(table.iter()?, spec)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_crud_round_trip() {
        let adapter = RedbAdapter::new();
        adapter.initialize().await.unwrap();

        let doc = serde_json::json!({"text": "hello", "integer": 42});
        adapter.create("k1", &doc).await.unwrap();
        assert_eq!(adapter.read("k1").await.unwrap(), doc);

        let updated = serde_json::json!({"text": "bye"});
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
        let adapter = RedbAdapter::new();
        adapter.initialize().await.unwrap();
        for i in 0..40 {
            adapter
                .create(&format!("k{i:03}"), &serde_json::json!({"i": i}))
                .await
                .unwrap();
        }

        for projection in [Projection::Full, Projection::Id, Projection::Count] {
            for (start, limit) in [(0, 0), (10, 0), (0, 5), (38, 5), (40, 5)] {
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
                    spec.expected_window(40),
                    "projection {projection:?} start {start} limit {limit}"
                );
            }
        }
        adapter.cleanup().await.unwrap();
    }
}
