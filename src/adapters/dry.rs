//! No-op adapter for engine sanity runs.
//!
//! Every operation succeeds without touching any store, so a dry run
//! measures the harness itself: generators, worker scheduling, and timing.

use async_trait::async_trait;
use serde_json::Value;

use crate::adapters::Adapter;
use crate::config::ScanSpec;
use crate::error::BenchError;

pub struct DryAdapter;

impl DryAdapter {
    pub fn new() -> Self {
        DryAdapter
    }
}

impl Default for DryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for DryAdapter {
    fn name(&self) -> &'static str {
        "dry"
    }

    async fn initialize(&self) -> Result<(), BenchError> {
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), BenchError> {
        Ok(())
    }

    async fn create(&self, _key: &str, _doc: &Value) -> Result<(), BenchError> {
        Ok(())
    }

    async fn read(&self, _key: &str) -> Result<Value, BenchError> {
        Ok(Value::Object(Default::default()))
    }

    async fn update(&self, _key: &str, _doc: &Value) -> Result<(), BenchError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), BenchError> {
        Ok(())
    }

    async fn scan(&self, _spec: &ScanSpec) -> Result<usize, BenchError> {
        Ok(0)
    }
}
