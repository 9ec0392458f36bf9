//! Neo4j adapter.
//!
//! Connects to a user-supplied bolt endpoint or starts a `neo4j:5`
//! container. Each sample is one `Bench` node carrying the key, the
//! projected fields, and the full document as a JSON string property.

use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph};
use parking_lot::RwLock;
use serde_json::Value;

use crate::adapters::{
    doc_integer, doc_text, Adapter, HEALTH_TIMEOUT, POOL_MAX_CONNECTIONS,
};
use crate::config::{Config, Projection, ScanSpec};
use crate::docker::{self, Container, ContainerSpec};
use crate::error::BenchError;

const DEFAULT_IMAGE: &str = "neo4j:5";
const USERNAME: &str = "neo4j";
const PASSWORD: &str = "crudbench";
const BOLT_PORT: u16 = 7687;

struct Neo4jState {
    graph: Graph,
    container: Option<Container>,
}

pub struct Neo4jAdapter {
    endpoint: Option<String>,
    image: String,
    privileged: bool,
    state: RwLock<Option<Neo4jState>>,
}

impl Neo4jAdapter {
    pub fn new(config: &Config) -> Self {
        Neo4jAdapter {
            endpoint: config.endpoint.clone(),
            image: config.image.clone().unwrap_or_else(|| DEFAULT_IMAGE.into()),
            privileged: config.privileged,
            state: RwLock::new(None),
        }
    }

    fn graph(&self) -> Result<Graph, BenchError> {
        let guard = self.state.read();
        let state = guard
            .as_ref()
            .ok_or_else(|| BenchError::Backend("Neo4j adapter not initialized".into()))?;
        Ok(state.graph.clone())
    }

    fn default_uri() -> String {
        format!("bolt://127.0.0.1:{BOLT_PORT}")
    }
}

async fn connect(uri: &str) -> anyhow::Result<Graph> {
    let config = ConfigBuilder::default()
        .uri(uri)
        .user(USERNAME)
        .password(PASSWORD)
        .max_connections(POOL_MAX_CONNECTIONS)
        .build()?;
    let graph = Graph::connect(config).await?;
    Ok(graph)
}

async fn probe(uri: &str) -> anyhow::Result<()> {
    let graph = connect(uri).await?;
    graph.run(query("RETURN 1")).await?;
    Ok(())
}

#[async_trait]
impl Adapter for Neo4jAdapter {
    fn name(&self) -> &'static str {
        "neo4j"
    }

    async fn initialize(&self) -> Result<(), BenchError> {
        let (uri, container) = match &self.endpoint {
            Some(endpoint) => (endpoint.clone(), None),
            None => {
                let spec = ContainerSpec::new(&self.image, docker::container_name("neo4j"))
                    .port(BOLT_PORT, BOLT_PORT)
                    .env("NEO4J_AUTH", format!("{USERNAME}/{PASSWORD}"))
                    .privileged(self.privileged);
                let container = docker::start(&spec)?;
                let probe_uri = Self::default_uri();
                container
                    .wait_healthy(HEALTH_TIMEOUT, move || {
                        let uri = probe_uri.clone();
                        async move { probe(&uri).await }
                    })
                    .await?;
                (Self::default_uri(), Some(container))
            }
        };

        let graph = connect(&uri)
            .await
            .map_err(|e| BenchError::Setup(format!("failed to connect to Neo4j: {e}")))?;

        // Unique key constraint doubles as the lookup index, and a clean
        // label keeps scans honest across runs against external endpoints.
        graph
            .run(query(
                "CREATE CONSTRAINT bench_id IF NOT EXISTS \
                 FOR (r:Bench) REQUIRE r.id IS UNIQUE",
            ))
            .await
            .map_err(|e| BenchError::Setup(format!("failed to create Neo4j constraint: {e}")))?;
        graph
            .run(query("MATCH (r:Bench) DETACH DELETE r"))
            .await
            .map_err(|e| BenchError::Setup(format!("failed to reset Neo4j nodes: {e}")))?;

        *self.state.write() = Some(Neo4jState { graph, container });
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), BenchError> {
        let state = self.state.write().take();
        if let Some(state) = state {
            drop(state.graph);
            if let Some(container) = state.container {
                container.stop();
            }
        }
        Ok(())
    }

    async fn create(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        let data = serde_json::to_string(doc)?;
        self.graph()?
            .run(
                query(
                    "CREATE (r:Bench {id: $id, text_val: $text, integer_val: $int, data: $data})",
                )
                .param("id", key)
                .param("text", doc_text(doc).unwrap_or_default())
                .param("int", doc_integer(doc).unwrap_or_default())
                .param("data", data),
            )
            .await?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Value, BenchError> {
        let mut result = self
            .graph()?
            .execute(query("MATCH (r:Bench {id: $id}) RETURN r.data AS data").param("id", key))
            .await?;
        let row = result
            .next()
            .await?
            .ok_or_else(|| BenchError::NotFound(key.to_string()))?;
        let data: String = row
            .get("data")
            .map_err(|e| BenchError::Backend(format!("Neo4j row decoding: {e}")))?;
        Ok(serde_json::from_str(&data)?)
    }

    async fn update(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        let data = serde_json::to_string(doc)?;
        let mut result = self
            .graph()?
            .execute(
                query(
                    "MATCH (r:Bench {id: $id}) \
                     SET r.text_val = $text, r.integer_val = $int, r.data = $data \
                     RETURN count(r) AS updated",
                )
                .param("id", key)
                .param("text", doc_text(doc).unwrap_or_default())
                .param("int", doc_integer(doc).unwrap_or_default())
                .param("data", data),
            )
            .await?;
        let updated: i64 = match result.next().await? {
            Some(row) => row
                .get("updated")
                .map_err(|e| BenchError::Backend(format!("Neo4j row decoding: {e}")))?,
            None => 0,
        };
        if updated == 0 {
            return Err(BenchError::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BenchError> {
        let mut result = self
            .graph()?
            .execute(
                query(
                    "MATCH (r:Bench {id: $id}) \
                     WITH r, count(r) AS found DETACH DELETE r \
                     RETURN found",
                )
                .param("id", key),
            )
            .await?;
        if result.next().await?.is_none() {
            return Err(BenchError::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn scan(&self, spec: &ScanSpec) -> Result<usize, BenchError> {
        let graph = self.graph()?;
        let start = spec.start;
        let window = match (spec.start > 0, spec.limit > 0) {
            (true, true) => format!("SKIP {start} LIMIT {}", spec.limit),
            (true, false) => format!("SKIP {start}"),
            (false, true) => format!("LIMIT {}", spec.limit),
            (false, false) => String::new(),
        };

        match spec.projection {
            Projection::Count => {
                let cypher =
                    format!("MATCH (r:Bench) WITH r {window} RETURN count(r) AS count");
                let mut result = graph.execute(query(&cypher)).await?;
                let count: i64 = match result.next().await? {
                    Some(row) => row
                        .get("count")
                        .map_err(|e| BenchError::Backend(format!("Neo4j row decoding: {e}")))?,
                    None => 0,
                };
                Ok(count as usize)
            }
            Projection::Id | Projection::Full => {
                let selection = match spec.projection {
                    Projection::Id => "r.id",
                    _ => "r",
                };
                let cypher = format!("MATCH (r:Bench) RETURN {selection} {window}");
                let mut result = graph.execute(query(&cypher)).await?;
                let mut count = 0;
                while result.next().await?.is_some() {
                    count += 1;
                }
                Ok(count)
            }
        }
    }
}
