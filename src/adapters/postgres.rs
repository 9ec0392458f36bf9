//! PostgreSQL adapter.
//!
//! Connects to a user-supplied endpoint or starts a `postgres:16` container.
//! A single pipelined client serves all workers; tokio-postgres multiplexes
//! concurrent queries over one connection.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};
use tracing::debug;

use crate::adapters::{doc_integer, doc_text, Adapter, HEALTH_TIMEOUT};
use crate::config::{Config, Projection, ScanSpec};
use crate::docker::{self, Container, ContainerSpec};
use crate::error::BenchError;

const DEFAULT_IMAGE: &str = "postgres:16";
const PASSWORD: &str = "crudbench";
const DATABASE: &str = "bench";
const PORT: u16 = 5432;

struct PostgresState {
    client: Arc<Client>,
    connection: JoinHandle<()>,
    container: Option<Container>,
}

pub struct PostgresAdapter {
    endpoint: Option<String>,
    image: String,
    privileged: bool,
    state: parking_lot::RwLock<Option<PostgresState>>,
}

impl PostgresAdapter {
    pub fn new(config: &Config) -> Self {
        PostgresAdapter {
            endpoint: config.endpoint.clone(),
            image: config.image.clone().unwrap_or_else(|| DEFAULT_IMAGE.into()),
            privileged: config.privileged,
            state: parking_lot::RwLock::new(None),
        }
    }

    fn client(&self) -> Result<Arc<Client>, BenchError> {
        let guard = self.state.read();
        let state = guard
            .as_ref()
            .ok_or_else(|| BenchError::Backend("PostgreSQL adapter not initialized".into()))?;
        Ok(state.client.clone())
    }

    fn conn_string() -> String {
        format!("host=127.0.0.1 port={PORT} user=postgres password={PASSWORD} dbname={DATABASE}")
    }
}

async fn probe(conn_string: &str) -> anyhow::Result<()> {
    let (client, connection) = tokio_postgres::connect(conn_string, NoTls).await?;
    let driver = tokio::spawn(async move {
        let _ = connection.await;
    });
    client.simple_query("SELECT 1").await?;
    drop(client);
    driver.abort();
    Ok(())
}

#[async_trait]
impl Adapter for PostgresAdapter {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn initialize(&self) -> Result<(), BenchError> {
        let (conn_string, container) = match &self.endpoint {
            Some(endpoint) => (endpoint.clone(), None),
            None => {
                let spec = ContainerSpec::new(&self.image, docker::container_name("postgres"))
                    .port(PORT, PORT)
                    .env("POSTGRES_PASSWORD", PASSWORD)
                    .env("POSTGRES_DB", DATABASE)
                    .privileged(self.privileged);
                let container = docker::start(&spec)?;
                let probe_string = Self::conn_string();
                container
                    .wait_healthy(HEALTH_TIMEOUT, move || {
                        let conn = probe_string.clone();
                        async move { probe(&conn).await }
                    })
                    .await?;
                (Self::conn_string(), Some(container))
            }
        };

        let (client, connection) = tokio_postgres::connect(&conn_string, NoTls)
            .await
            .map_err(|e| BenchError::Setup(format!("failed to connect to PostgreSQL: {e}")))?;
        // Drive the connection until the client drops.
        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("PostgreSQL connection closed: {e}");
            }
        });

        client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS bench (
                    id TEXT PRIMARY KEY,
                    text_val TEXT,
                    integer_val BIGINT,
                    data JSONB NOT NULL
                )",
            )
            .await
            .map_err(|e| BenchError::Setup(format!("failed to create PostgreSQL table: {e}")))?;

        *self.state.write() = Some(PostgresState {
            client: Arc::new(client),
            connection,
            container,
        });
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), BenchError> {
        let state = self.state.write().take();
        if let Some(state) = state {
            drop(state.client);
            state.connection.abort();
            if let Some(container) = state.container {
                container.stop();
            }
        }
        Ok(())
    }

    async fn create(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        self.client()?
            .execute(
                "INSERT INTO bench (id, text_val, integer_val, data) VALUES ($1, $2, $3, $4)",
                &[&key, &doc_text(doc), &doc_integer(doc), doc],
            )
            .await?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Value, BenchError> {
        let row = self
            .client()?
            .query_opt("SELECT data FROM bench WHERE id = $1", &[&key])
            .await?
            .ok_or_else(|| BenchError::NotFound(key.to_string()))?;
        Ok(row.get::<_, Value>(0))
    }

    async fn update(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        let changed = self
            .client()?
            .execute(
                "UPDATE bench SET text_val = $2, integer_val = $3, data = $4 WHERE id = $1",
                &[&key, &doc_text(doc), &doc_integer(doc), doc],
            )
            .await?;
        if changed == 0 {
            return Err(BenchError::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BenchError> {
        let changed = self
            .client()?
            .execute("DELETE FROM bench WHERE id = $1", &[&key])
            .await?;
        if changed == 0 {
            return Err(BenchError::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn scan(&self, spec: &ScanSpec) -> Result<usize, BenchError> {
        let limit = if spec.limit > 0 {
            spec.limit.to_string()
        } else {
            "ALL".to_string()
        };
        let start = spec.start;
        let client = self.client()?;

        match spec.projection {
            Projection::Count => {
                let sql = format!(
                    "SELECT COUNT(*) FROM (SELECT 1 FROM bench LIMIT {limit} OFFSET {start}) AS scanned"
                );
                let row = client.query_one(&sql, &[]).await?;
                Ok(row.get::<_, i64>(0) as usize)
            }
            Projection::Id | Projection::Full => {
                let column = match spec.projection {
                    Projection::Id => "id",
                    _ => "*",
                };
                let sql =
                    format!("SELECT {column} FROM bench LIMIT {limit} OFFSET {start}");
                let rows = client.query(&sql, &[]).await?;
                Ok(rows.len())
            }
        }
    }
}
