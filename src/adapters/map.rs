//! In-process concurrent map adapter.
//!
//! The baseline backend: a sharded concurrent hash map with no I/O, used to
//! measure the harness floor and in the integration tests.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::adapters::{count_window, Adapter};
use crate::config::{Projection, ScanSpec};
use crate::error::BenchError;

pub struct MapAdapter {
    store: DashMap<String, Value>,
}

impl MapAdapter {
    pub fn new() -> Self {
        MapAdapter {
            store: DashMap::new(),
        }
    }
}

impl Default for MapAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for MapAdapter {
    fn name(&self) -> &'static str {
        "map"
    }

    async fn initialize(&self) -> Result<(), BenchError> {
        self.store.clear();
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), BenchError> {
        self.store.clear();
        Ok(())
    }

    async fn create(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        if self
            .store
            .insert(key.to_string(), doc.clone())
            .is_some()
        {
            return Err(BenchError::Backend(format!("duplicate key '{key}'")));
        }
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Value, BenchError> {
        self.store
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BenchError::NotFound(key.to_string()))
    }

    async fn update(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        match self.store.get_mut(key) {
            Some(mut entry) => {
                *entry.value_mut() = doc.clone();
                Ok(())
            }
            None => Err(BenchError::NotFound(key.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), BenchError> {
        self.store
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| BenchError::NotFound(key.to_string()))
    }

    async fn scan(&self, spec: &ScanSpec) -> Result<usize, BenchError> {
        match spec.projection {
            Projection::Count => Ok(spec.expected_window(self.store.len())),
            Projection::Id | Projection::Full => {
                Ok(count_window(self.store.iter(), spec))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(projection: Projection, start: usize, limit: usize) -> ScanSpec {
        ScanSpec {
            name: "s".into(),
            samples: None,
            projection,
            start,
            limit,
            expect: 0,
        }
    }

    #[tokio::test]
    async fn test_create_read_round_trip() {
        let adapter = MapAdapter::new();
        adapter.initialize().await.unwrap();

        let doc = serde_json::json!({"text": "abc", "integer": 7});
        adapter.create("1", &doc).await.unwrap();
        assert_eq!(adapter.read("1").await.unwrap(), doc);
    }

    #[tokio::test]
    async fn test_duplicate_create_fails() {
        let adapter = MapAdapter::new();
        adapter.create("1", &serde_json::json!({})).await.unwrap();
        let err = adapter.create("1", &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, BenchError::Backend(_)));
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let adapter = MapAdapter::new();
        assert!(matches!(
            adapter.read("nope").await,
            Err(BenchError::NotFound(_))
        ));
        assert!(matches!(
            adapter.update("nope", &serde_json::json!({})).await,
            Err(BenchError::NotFound(_))
        ));
        assert!(matches!(
            adapter.delete("nope").await,
            Err(BenchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_replaces_document() {
        let adapter = MapAdapter::new();
        adapter.create("1", &serde_json::json!({"v": 1})).await.unwrap();
        adapter.update("1", &serde_json::json!({"v": 2})).await.unwrap();
        assert_eq!(adapter.read("1").await.unwrap(), serde_json::json!({"v": 2}));
    }

    #[tokio::test]
    async fn test_scan_projections_agree_on_counts() {
        let adapter = MapAdapter::new();
        for i in 0..100 {
            adapter
                .create(&i.to_string(), &serde_json::json!({"i": i}))
                .await
                .unwrap();
        }

        for projection in [Projection::Full, Projection::Id, Projection::Count] {
            for (start, limit) in [(0, 0), (0, 10), (50, 0), (50, 10), (100, 10), (200, 0)] {
                let spec = scan(projection, start, limit);
                let expected = spec.expected_window(100);
                assert_eq!(
                    adapter.scan(&spec).await.unwrap(),
                    expected,
                    "projection {projection:?} start {start} limit {limit}"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let adapter = MapAdapter::new();
        adapter.create("1", &serde_json::json!({})).await.unwrap();
        adapter.cleanup().await.unwrap();
        adapter.cleanup().await.unwrap();
        assert!(matches!(
            adapter.read("1").await,
            Err(BenchError::NotFound(_))
        ));
    }
}
