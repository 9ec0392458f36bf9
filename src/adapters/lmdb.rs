//! LMDB adapter (embedded, via heed).
//!
//! Documents are stored as JSON bytes under their key in a single unnamed
//! database. The memory-map size is configurable through the
//! `CRUD_BENCH_LMDB_MAP_SIZE` environment variable (bytes).

use async_trait::async_trait;
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use parking_lot::RwLock;
use serde_json::Value;
use tempfile::TempDir;

use crate::adapters::{count_window, Adapter};
use crate::config::{Projection, ScanSpec};
use crate::error::BenchError;

/// Environment variable overriding the LMDB map size in bytes.
pub const MAP_SIZE_ENV: &str = "CRUD_BENCH_LMDB_MAP_SIZE";

const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;

struct LmdbState {
    env: Env,
    db: Database<Str, Bytes>,
    _dir: TempDir,
}

pub struct LmdbAdapter {
    state: RwLock<Option<LmdbState>>,
}

impl LmdbAdapter {
    pub fn new() -> Self {
        LmdbAdapter {
            state: RwLock::new(None),
        }
    }

    fn map_size() -> usize {
        std::env::var(MAP_SIZE_ENV)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_MAP_SIZE)
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&LmdbState) -> Result<T, BenchError>,
    ) -> Result<T, BenchError> {
        let guard = self.state.read();
        let state = guard
            .as_ref()
            .ok_or_else(|| BenchError::Backend("LMDB adapter not initialized".into()))?;
        f(state)
    }
}

impl Default for LmdbAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for LmdbAdapter {
    fn name(&self) -> &'static str {
        "lmdb"
    }

    async fn initialize(&self) -> Result<(), BenchError> {
        let dir = TempDir::new()
            .map_err(|e| BenchError::Setup(format!("failed to create LMDB directory: {e}")))?;
        // Safety: the environment path is a fresh private tempdir, opened
        // exactly once by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(Self::map_size())
                .max_dbs(1)
                .open(dir.path())
        }
        .map_err(|e| BenchError::Setup(format!("failed to open LMDB environment: {e}")))?;
        let mut wtxn = env
            .write_txn()
            .map_err(|e| BenchError::Setup(format!("failed to open LMDB transaction: {e}")))?;
        let db = env
            .create_database(&mut wtxn, None)
            .map_err(|e| BenchError::Setup(format!("failed to create LMDB database: {e}")))?;
        wtxn.commit()
            .map_err(|e| BenchError::Setup(format!("failed to commit LMDB transaction: {e}")))?;

        *self.state.write() = Some(LmdbState { env, db, _dir: dir });
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), BenchError> {
        self.state.write().take();
        Ok(())
    }

    async fn create(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        let data = serde_json::to_vec(doc)?;
        self.with_state(|state| {
            let mut wtxn = state.env.write_txn()?;
            state.db.put(&mut wtxn, key, &data)?;
            wtxn.commit()?;
            Ok(())
        })
    }

    async fn read(&self, key: &str) -> Result<Value, BenchError> {
        self.with_state(|state| {
            let rtxn = state.env.read_txn()?;
            let bytes = state
                .db
                .get(&rtxn, key)?
                .ok_or_else(|| BenchError::NotFound(key.to_string()))?;
            Ok(serde_json::from_slice(bytes)?)
        })
    }

    async fn update(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        let data = serde_json::to_vec(doc)?;
        self.with_state(|state| {
            let mut wtxn = state.env.write_txn()?;
            if state.db.get(&wtxn, key)?.is_none() {
                return Err(BenchError::NotFound(key.to_string()));
            }
            state.db.put(&mut wtxn, key, &data)?;
            wtxn.commit()?;
            Ok(())
        })
    }

    async fn delete(&self, key: &str) -> Result<(), BenchError> {
        self.with_state(|state| {
            let mut wtxn = state.env.write_txn()?;
            let existed = state.db.delete(&mut wtxn, key)?;
            wtxn.commit()?;
            if !existed {
                return Err(BenchError::NotFound(key.to_string()));
            }
            Ok(())
        })
    }

    async fn scan(&self, spec: &ScanSpec) -> Result<usize, BenchError> {
        self.with_state(|state| {
            let rtxn = state.env.read_txn()?;
            match spec.projection {
                Projection::Count => {
                    let total = state.db.len(&rtxn)? as usize;
                    Ok(spec.expected_window(total))
                }
                Projection::Id | Projection::Full => {
                    Ok(count_window(state.db.iter(&rtxn)?, spec))
                }
            }
        })
    }
}
