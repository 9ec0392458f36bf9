//! Redis-protocol adapter.
//!
//! Drives Redis itself plus the protocol-compatible KeyDB and Dragonfly
//! servers; the flavor only changes the adapter label and the default
//! container image. Documents are stored as JSON strings under their key.

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde_json::Value;

use crate::adapters::{Adapter, HEALTH_TIMEOUT};
use crate::config::{Config, Projection, ScanSpec};
use crate::docker::{self, Container, ContainerSpec};
use crate::error::BenchError;

const PORT: u16 = 6379;

/// Which redis-compatible server this adapter fronts.
#[derive(Clone, Copy, Debug)]
pub enum Flavor {
    Redis,
    KeyDb,
    Dragonfly,
}

impl Flavor {
    fn label(&self) -> &'static str {
        match self {
            Flavor::Redis => "redis",
            Flavor::KeyDb => "keydb",
            Flavor::Dragonfly => "dragonfly",
        }
    }

    fn default_image(&self) -> &'static str {
        match self {
            Flavor::Redis => "redis:7",
            Flavor::KeyDb => "eqalpha/keydb",
            Flavor::Dragonfly => "docker.dragonflydb.io/dragonflydb/dragonfly",
        }
    }
}

struct RedisState {
    conn: MultiplexedConnection,
    container: Option<Container>,
}

pub struct RedisAdapter {
    flavor: Flavor,
    endpoint: Option<String>,
    image: String,
    privileged: bool,
    state: RwLock<Option<RedisState>>,
}

impl RedisAdapter {
    pub fn new(config: &Config, flavor: Flavor) -> Self {
        RedisAdapter {
            flavor,
            endpoint: config.endpoint.clone(),
            image: config
                .image
                .clone()
                .unwrap_or_else(|| flavor.default_image().into()),
            privileged: config.privileged,
            state: RwLock::new(None),
        }
    }

    fn conn(&self) -> Result<MultiplexedConnection, BenchError> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or_else(|| {
            BenchError::Backend(format!("{} adapter not initialized", self.flavor.label()))
        })?;
        Ok(state.conn.clone())
    }

    fn default_url() -> String {
        format!("redis://127.0.0.1:{PORT}")
    }
}

async fn probe(url: &str) -> anyhow::Result<()> {
    let client = redis::Client::open(url)?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(())
}

#[async_trait]
impl Adapter for RedisAdapter {
    fn name(&self) -> &'static str {
        self.flavor.label()
    }

    async fn initialize(&self) -> Result<(), BenchError> {
        let (url, container) = match &self.endpoint {
            Some(endpoint) => (endpoint.clone(), None),
            None => {
                let spec =
                    ContainerSpec::new(&self.image, docker::container_name(self.flavor.label()))
                        .port(PORT, PORT)
                        .privileged(self.privileged);
                let container = docker::start(&spec)?;
                let probe_url = Self::default_url();
                container
                    .wait_healthy(HEALTH_TIMEOUT, move || {
                        let url = probe_url.clone();
                        async move { probe(&url).await }
                    })
                    .await?;
                (Self::default_url(), Some(container))
            }
        };

        let client = redis::Client::open(url.as_str())
            .map_err(|e| BenchError::Setup(format!("invalid Redis endpoint: {e}")))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BenchError::Setup(format!("failed to connect to Redis: {e}")))?;

        // The whole logical database is the working set; start empty.
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(|e| BenchError::Setup(format!("failed to flush Redis database: {e}")))?;

        *self.state.write() = Some(RedisState { conn, container });
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), BenchError> {
        let state = self.state.write().take();
        if let Some(state) = state {
            drop(state.conn);
            if let Some(container) = state.container {
                container.stop();
            }
        }
        Ok(())
    }

    async fn create(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        let data = serde_json::to_string(doc)?;
        let mut conn = self.conn()?;
        let stored: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(data)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        if stored.is_none() {
            return Err(BenchError::Backend(format!("duplicate key '{key}'")));
        }
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Value, BenchError> {
        let mut conn = self.conn()?;
        let data: Option<String> = conn.get(key).await?;
        let data = data.ok_or_else(|| BenchError::NotFound(key.to_string()))?;
        Ok(serde_json::from_str(&data)?)
    }

    async fn update(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        let data = serde_json::to_string(doc)?;
        let mut conn = self.conn()?;
        let stored: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(data)
            .arg("XX")
            .query_async(&mut conn)
            .await?;
        if stored.is_none() {
            return Err(BenchError::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BenchError> {
        let mut conn = self.conn()?;
        let removed: i64 = conn.del(key).await?;
        if removed == 0 {
            return Err(BenchError::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn scan(&self, spec: &ScanSpec) -> Result<usize, BenchError> {
        let mut conn = self.conn()?;
        match spec.projection {
            Projection::Count => {
                let total: i64 = redis::cmd("DBSIZE").query_async(&mut conn).await?;
                Ok(spec.expected_window(total as usize))
            }
            Projection::Id => {
                let mut seen = 0usize;
                let mut count = 0usize;
                let mut iter: redis::AsyncIter<String> = conn.scan().await?;
                while let Some(_key) = iter.next_item().await {
                    seen += 1;
                    if seen <= spec.start {
                        continue;
                    }
                    count += 1;
                    if spec.limit > 0 && count == spec.limit {
                        break;
                    }
                }
                Ok(count)
            }
            Projection::Full => {
                // A second connection fetches values while the first drives
                // the key cursor.
                let mut getter = self.conn()?;
                let mut seen = 0usize;
                let mut count = 0usize;
                let mut iter: redis::AsyncIter<String> = conn.scan().await?;
                while let Some(key) = iter.next_item().await {
                    seen += 1;
                    if seen <= spec.start {
                        continue;
                    }
                    let _: Option<String> = getter.get(&key).await?;
                    count += 1;
                    if spec.limit > 0 && count == spec.limit {
                        break;
                    }
                }
                Ok(count)
            }
        }
    }
}
