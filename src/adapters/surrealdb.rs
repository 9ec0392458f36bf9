//! SurrealDB adapter.
//!
//! Connects to a user-supplied endpoint or starts a SurrealDB server
//! container backed by the in-memory engine. Records live in the `bench`
//! table keyed by `type::thing('bench', $id)`.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

use crate::adapters::{Adapter, HEALTH_TIMEOUT};
use crate::config::{Config, Projection, ScanSpec};
use crate::docker::{self, Container, ContainerSpec};
use crate::error::BenchError;

const DEFAULT_IMAGE: &str = "surrealdb/surrealdb:latest";
const USERNAME: &str = "root";
const PASSWORD: &str = "root";
const PORT: u16 = 8000;
const NAMESPACE: &str = "bench";
const DATABASE: &str = "bench";

struct SurrealdbState {
    db: Surreal<Any>,
    container: Option<Container>,
}

pub struct SurrealdbAdapter {
    endpoint: Option<String>,
    image: String,
    privileged: bool,
    state: RwLock<Option<SurrealdbState>>,
}

impl SurrealdbAdapter {
    pub fn new(config: &Config) -> Self {
        SurrealdbAdapter {
            endpoint: config.endpoint.clone(),
            image: config.image.clone().unwrap_or_else(|| DEFAULT_IMAGE.into()),
            privileged: config.privileged,
            state: RwLock::new(None),
        }
    }

    fn db(&self) -> Result<Surreal<Any>, BenchError> {
        let guard = self.state.read();
        let state = guard
            .as_ref()
            .ok_or_else(|| BenchError::Backend("SurrealDB adapter not initialized".into()))?;
        Ok(state.db.clone())
    }

    fn default_endpoint() -> String {
        format!("ws://127.0.0.1:{PORT}")
    }
}

async fn connect(endpoint: &str) -> anyhow::Result<Surreal<Any>> {
    let endpoint = endpoint
        .replace("http://", "ws://")
        .replace("https://", "wss://");
    let db = surrealdb::engine::any::connect(endpoint).await?;
    db.signin(Root {
        username: USERNAME,
        password: PASSWORD,
    })
    .await?;
    db.use_ns(NAMESPACE).use_db(DATABASE).await?;
    Ok(db)
}

#[async_trait]
impl Adapter for SurrealdbAdapter {
    fn name(&self) -> &'static str {
        "surrealdb"
    }

    async fn initialize(&self) -> Result<(), BenchError> {
        let (endpoint, container) = match &self.endpoint {
            Some(endpoint) => (endpoint.clone(), None),
            None => {
                let spec = ContainerSpec::new(&self.image, docker::container_name("surrealdb"))
                    .port(PORT, PORT)
                    .privileged(self.privileged)
                    .cmd(&["start", "--user", USERNAME, "--pass", PASSWORD, "memory"]);
                let container = docker::start(&spec)?;
                let probe_endpoint = Self::default_endpoint();
                container
                    .wait_healthy(HEALTH_TIMEOUT, move || {
                        let endpoint = probe_endpoint.clone();
                        async move {
                            connect(&endpoint).await?;
                            Ok(())
                        }
                    })
                    .await?;
                (Self::default_endpoint(), Some(container))
            }
        };

        let db = connect(&endpoint)
            .await
            .map_err(|e| BenchError::Setup(format!("failed to connect to SurrealDB: {e}")))?;

        db.query("DELETE bench")
            .await
            .map_err(|e| BenchError::Setup(format!("failed to reset SurrealDB table: {e}")))?
            .check()
            .map_err(|e| BenchError::Setup(format!("failed to reset SurrealDB table: {e}")))?;

        *self.state.write() = Some(SurrealdbState { db, container });
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), BenchError> {
        let state = self.state.write().take();
        if let Some(state) = state {
            drop(state.db);
            if let Some(container) = state.container {
                container.stop();
            }
        }
        Ok(())
    }

    async fn create(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        self.db()?
            .query("CREATE type::thing('bench', $id) CONTENT $data RETURN NONE")
            .bind(("id", key.to_string()))
            .bind(("data", doc.clone()))
            .await?
            .check()?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Value, BenchError> {
        let mut response = self
            .db()?
            .query("SELECT * OMIT id FROM type::thing('bench', $id)")
            .bind(("id", key.to_string()))
            .await?
            .check()?;
        let rows: Vec<Value> = response.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BenchError::NotFound(key.to_string()))
    }

    async fn update(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        let mut response = self
            .db()?
            .query("UPDATE type::thing('bench', $id) CONTENT $data RETURN VALUE meta::id(id)")
            .bind(("id", key.to_string()))
            .bind(("data", doc.clone()))
            .await?
            .check()?;
        let updated: Vec<Value> = response.take(0)?;
        if updated.is_empty() {
            return Err(BenchError::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BenchError> {
        let mut response = self
            .db()?
            .query("DELETE type::thing('bench', $id) RETURN BEFORE")
            .bind(("id", key.to_string()))
            .await?
            .check()?;
        let deleted: Vec<Value> = response.take(0)?;
        if deleted.is_empty() {
            return Err(BenchError::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn scan(&self, spec: &ScanSpec) -> Result<usize, BenchError> {
        let window = match (spec.limit > 0, spec.start > 0) {
            (true, true) => format!("LIMIT {} START {}", spec.limit, spec.start),
            (true, false) => format!("LIMIT {}", spec.limit),
            (false, true) => format!("START {}", spec.start),
            (false, false) => String::new(),
        };

        let db = self.db()?;
        match spec.projection {
            Projection::Count => {
                let sql = format!(
                    "SELECT count() FROM (SELECT 1 FROM bench {window}) GROUP ALL"
                );
                let mut response = db.query(sql).await?.check()?;
                let rows: Vec<Value> = response.take(0)?;
                let count = rows
                    .first()
                    .and_then(|row| row.get("count"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                Ok(count as usize)
            }
            Projection::Id | Projection::Full => {
                let selection = match spec.projection {
                    Projection::Id => "VALUE meta::id(id)",
                    _ => "*",
                };
                let sql = format!("SELECT {selection} FROM bench {window}");
                let mut response = db.query(sql).await?.check()?;
                let rows: Vec<Value> = response.take(0)?;
                Ok(rows.len())
            }
        }
    }
}
