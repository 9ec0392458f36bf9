//! RocksDB adapter (embedded).
//!
//! Documents are stored as JSON bytes keyed directly by the sample key in a
//! database opened under a temporary directory. RocksDB has no exact native
//! count, so every projection counts by iteration.

use async_trait::async_trait;
use parking_lot::RwLock;
use rocksdb::{IteratorMode, DB};
use serde_json::Value;
use tempfile::TempDir;

use crate::adapters::{count_window, Adapter};
use crate::config::ScanSpec;
use crate::error::BenchError;

struct RocksdbState {
    db: DB,
    _dir: TempDir,
}

pub struct RocksdbAdapter {
    state: RwLock<Option<RocksdbState>>,
}

impl RocksdbAdapter {
    pub fn new() -> Self {
        RocksdbAdapter {
            state: RwLock::new(None),
        }
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&RocksdbState) -> Result<T, BenchError>,
    ) -> Result<T, BenchError> {
        let guard = self.state.read();
        let state = guard
            .as_ref()
            .ok_or_else(|| BenchError::Backend("RocksDB adapter not initialized".into()))?;
        f(state)
    }
}

impl Default for RocksdbAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for RocksdbAdapter {
    fn name(&self) -> &'static str {
        "rocksdb"
    }

    async fn initialize(&self) -> Result<(), BenchError> {
        let dir = TempDir::new()
            .map_err(|e| BenchError::Setup(format!("failed to create RocksDB directory: {e}")))?;
        let db = DB::open_default(dir.path())
            .map_err(|e| BenchError::Setup(format!("failed to open RocksDB: {e}")))?;

        *self.state.write() = Some(RocksdbState { db, _dir: dir });
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), BenchError> {
        self.state.write().take();
        Ok(())
    }

    async fn create(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        let data = serde_json::to_vec(doc)?;
        self.with_state(|state| {
            state.db.put(key.as_bytes(), &data)?;
            Ok(())
        })
    }

    async fn read(&self, key: &str) -> Result<Value, BenchError> {
        self.with_state(|state| {
            let bytes = state
                .db
                .get(key.as_bytes())?
                .ok_or_else(|| BenchError::NotFound(key.to_string()))?;
            Ok(serde_json::from_slice(&bytes)?)
        })
    }

    async fn update(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        let data = serde_json::to_vec(doc)?;
        self.with_state(|state| {
            if state.db.get(key.as_bytes())?.is_none() {
                return Err(BenchError::NotFound(key.to_string()));
            }
            state.db.put(key.as_bytes(), &data)?;
            Ok(())
        })
    }

    async fn delete(&self, key: &str) -> Result<(), BenchError> {
        self.with_state(|state| {
            if state.db.get(key.as_bytes())?.is_none() {
                return Err(BenchError::NotFound(key.to_string()));
            }
            state.db.delete(key.as_bytes())?;
            Ok(())
        })
    }

    async fn scan(&self, spec: &ScanSpec) -> Result<usize, BenchError> {
        self.with_state(|state| {
            Ok(count_window(state.db.iterator(IteratorMode::Start), spec))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Projection;

    #[tokio::test]
    async fn test_crud_round_trip() {
        let adapter = RocksdbAdapter::new();
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
        let adapter = RocksdbAdapter::new();
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
