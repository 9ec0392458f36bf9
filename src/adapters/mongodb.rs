//! MongoDB adapter.
//!
//! Connects to a user-supplied endpoint or starts a `mongo:7` container.
//! Each sample is one document in a single collection with `_id` set to the
//! sample key.

use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use parking_lot::RwLock;
use serde_json::Value;
use std::time::Duration;

use crate::adapters::{Adapter, HEALTH_TIMEOUT, POOL_IDLE_CONNECTIONS, POOL_MAX_CONNECTIONS};
use crate::config::{Config, Projection, ScanSpec};
use crate::docker::{self, Container, ContainerSpec};
use crate::error::BenchError;

const DEFAULT_IMAGE: &str = "mongo:7";
const DATABASE: &str = "bench";
const COLLECTION: &str = "bench";
const PORT: u16 = 27017;

struct MongodbState {
    client: Client,
    container: Option<Container>,
}

pub struct MongodbAdapter {
    endpoint: Option<String>,
    image: String,
    privileged: bool,
    state: RwLock<Option<MongodbState>>,
}

impl MongodbAdapter {
    pub fn new(config: &Config) -> Self {
        MongodbAdapter {
            endpoint: config.endpoint.clone(),
            image: config.image.clone().unwrap_or_else(|| DEFAULT_IMAGE.into()),
            privileged: config.privileged,
            state: RwLock::new(None),
        }
    }

    fn collection(&self) -> Result<Collection<Document>, BenchError> {
        let guard = self.state.read();
        let state = guard
            .as_ref()
            .ok_or_else(|| BenchError::Backend("MongoDB adapter not initialized".into()))?;
        Ok(state.client.database(DATABASE).collection(COLLECTION))
    }

    fn default_uri() -> String {
        format!("mongodb://127.0.0.1:{PORT}")
    }
}

async fn probe(uri: &str) -> anyhow::Result<()> {
    let mut options = ClientOptions::parse(uri).await?;
    options.connect_timeout = Some(Duration::from_secs(5));
    options.server_selection_timeout = Some(Duration::from_secs(5));
    let client = Client::with_options(options)?;
    client
        .database(DATABASE)
        .run_command(doc! { "ping": 1 })
        .await?;
    Ok(())
}

/// Convert a rendered document into BSON, installing the sample key as the
/// document identity.
fn to_bson_document(key: &str, doc: &Value) -> Result<Document, BenchError> {
    let bson = mongodb::bson::to_bson(doc)
        .map_err(|e| BenchError::Backend(format!("BSON encoding: {e}")))?;
    let mut document = match bson {
        Bson::Document(document) => document,
        other => doc! { "value": other },
    };
    document.insert("_id", key);
    Ok(document)
}

/// Convert a stored document back to JSON, dropping the `_id` identity.
fn from_bson_document(mut document: Document) -> Result<Value, BenchError> {
    document.remove("_id");
    serde_json::to_value(&document)
        .map_err(|e| BenchError::Backend(format!("BSON decoding: {e}")))
}

#[async_trait]
impl Adapter for MongodbAdapter {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    async fn initialize(&self) -> Result<(), BenchError> {
        let (uri, container) = match &self.endpoint {
            Some(endpoint) => (endpoint.clone(), None),
            None => {
                let spec = ContainerSpec::new(&self.image, docker::container_name("mongodb"))
                    .port(PORT, PORT)
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

        let mut options = ClientOptions::parse(&uri)
            .await
            .map_err(|e| BenchError::Setup(format!("invalid MongoDB endpoint: {e}")))?;
        options.connect_timeout = Some(Duration::from_secs(10));
        options.server_selection_timeout = Some(Duration::from_secs(10));
        options.max_pool_size = Some(POOL_MAX_CONNECTIONS as u32);
        options.min_pool_size = Some(POOL_IDLE_CONNECTIONS as u32);
        let client = Client::with_options(options)
            .map_err(|e| BenchError::Setup(format!("failed to create MongoDB client: {e}")))?;

        // Start from an empty collection.
        client
            .database(DATABASE)
            .collection::<Document>(COLLECTION)
            .drop()
            .await
            .map_err(|e| BenchError::Setup(format!("failed to reset MongoDB collection: {e}")))?;

        *self.state.write() = Some(MongodbState { client, container });
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), BenchError> {
        let state = self.state.write().take();
        if let Some(state) = state {
            drop(state.client);
            if let Some(container) = state.container {
                container.stop();
            }
        }
        Ok(())
    }

    async fn create(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        let document = to_bson_document(key, doc)?;
        self.collection()?.insert_one(document).await?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Value, BenchError> {
        let document = self
            .collection()?
            .find_one(doc! { "_id": key })
            .await?
            .ok_or_else(|| BenchError::NotFound(key.to_string()))?;
        from_bson_document(document)
    }

    async fn update(&self, key: &str, doc: &Value) -> Result<(), BenchError> {
        let document = to_bson_document(key, doc)?;
        let result = self
            .collection()?
            .replace_one(doc! { "_id": key }, document)
            .await?;
        if result.matched_count == 0 {
            return Err(BenchError::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BenchError> {
        let result = self.collection()?.delete_one(doc! { "_id": key }).await?;
        if result.deleted_count == 0 {
            return Err(BenchError::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn scan(&self, spec: &ScanSpec) -> Result<usize, BenchError> {
        let collection = self.collection()?;
        match spec.projection {
            Projection::Count => {
                let mut count = collection.count_documents(doc! {});
                if spec.start > 0 {
                    count = count.skip(spec.start as u64);
                }
                if spec.limit > 0 {
                    count = count.limit(spec.limit as u64);
                }
                Ok(count.await? as usize)
            }
            Projection::Id | Projection::Full => {
                let mut find = collection.find(doc! {});
                if let Projection::Id = spec.projection {
                    find = find.projection(doc! { "_id": 1 });
                }
                if spec.start > 0 {
                    find = find.skip(spec.start as u64);
                }
                if spec.limit > 0 {
                    find = find.limit(spec.limit as i64);
                }
                let mut cursor = find.await?;
                let mut count = 0;
                while cursor.advance().await? {
                    count += 1;
                }
                Ok(count)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bson_round_trip_preserves_document() {
        let doc = serde_json::json!({
            "text": "hello world",
            "integer": 42,
            "nested": {"flag": true, "list": [1, 2, 3]}
        });
        let document = to_bson_document("k1", &doc).unwrap();
        assert_eq!(document.get_str("_id").unwrap(), "k1");
        assert_eq!(from_bson_document(document).unwrap(), doc);
    }

    #[test]
    fn test_non_object_values_are_wrapped() {
        let doc = serde_json::json!("bare string");
        let document = to_bson_document("k1", &doc).unwrap();
        assert_eq!(document.get_str("value").unwrap(), "bare string");
    }
}
