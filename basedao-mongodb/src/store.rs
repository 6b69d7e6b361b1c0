use std::collections::BTreeMap;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection, Database,
    options::{ClientOptions, FindOptions},
};
use tracing::{debug, warn};

use basedao_core::{
    backend::{BulkWriteResult, StoreBackend, StoreBackendBuilder, WriteModel},
    error::{DaoError, DaoResult},
    pipeline::Pipeline,
    query::{Expr, FindQuery},
};

use crate::{
    config::MongoConfig,
    query::{render_filter, render_pipeline, render_projection, render_sort},
};

fn backend_error(e: mongodb::error::Error) -> DaoError {
    DaoError::Backend(e.to_string())
}

/// Reads an integer reply field regardless of its numeric width.
fn reply_count(reply: &Document, key: &str) -> u64 {
    match reply.get(key) {
        Some(Bson::Int32(n)) => *n as u64,
        Some(Bson::Int64(n)) => *n as u64,
        Some(Bson::Double(n)) => *n as u64,
        _ => 0,
    }
}

/// One `#<index>: <message>` line per entry of the reply's `writeErrors`.
fn write_errors(reply: &Document) -> Vec<String> {
    reply
        .get_array("writeErrors")
        .map(|errors| {
            errors
                .iter()
                .filter_map(Bson::as_document)
                .map(|error| {
                    format!(
                        "#{}: {}",
                        reply_count(error, "index"),
                        error.get_str("errmsg").unwrap_or("unknown error")
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn database(&self) -> Database {
        self.client.database(&self.database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.database().collection(collection_name)
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn find(&self, collection: &str, query: FindQuery) -> DaoResult<Vec<Document>> {
        let mut options = FindOptions::default();

        if let Some(limit) = query.limit {
            options.limit = Some(limit as i64);
        }
        if let Some(skip) = query.skip {
            options.skip = Some(skip as u64);
        }
        if !query.sort.is_empty() {
            options.sort = Some(render_sort(&query.sort));
        }
        if !query.projection.is_empty() {
            options.projection = Some(render_projection(&query.projection));
        }

        self.get_collection(collection)
            .find(render_filter(query.filter.as_ref())?)
            .with_options(options)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DaoResult<u64> {
        self.get_collection(collection)
            .count_documents(render_filter(filter)?)
            .await
            .map_err(backend_error)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DaoResult<Bson> {
        Ok(self
            .get_collection(collection)
            .insert_one(document)
            .await
            .map_err(backend_error)?
            .inserted_id)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DaoResult<u64> {
        Ok(self
            .get_collection(collection)
            .insert_many(documents)
            .ordered(false)
            .await
            .map_err(backend_error)?
            .inserted_ids
            .len() as u64)
    }

    async fn update_many(&self, collection: &str, filter: &Expr, patch: Document) -> DaoResult<u64> {
        Ok(self
            .get_collection(collection)
            .update_many(render_filter(Some(filter))?, doc! { "$set": patch })
            .await
            .map_err(backend_error)?
            .modified_count)
    }

    async fn delete_many(&self, collection: &str, filter: &Expr) -> DaoResult<u64> {
        Ok(self
            .get_collection(collection)
            .delete_many(render_filter(Some(filter))?)
            .await
            .map_err(backend_error)?
            .deleted_count)
    }

    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> DaoResult<Vec<Document>> {
        let stages = render_pipeline(pipeline)?;
        debug!(collection, pipeline = ?stages, "aggregate");

        self.get_collection(collection)
            .aggregate(stages)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    /// Issues one unordered `update` command carrying every model.
    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<WriteModel>,
    ) -> DaoResult<BulkWriteResult> {
        let updates = models
            .iter()
            .map(|model| match model {
                WriteModel::UpdateOne { filter, update, upsert } => Ok(doc! {
                    "q": render_filter(Some(filter))?,
                    "u": { "$set": update.clone() },
                    "upsert": *upsert,
                    "multi": false,
                }),
            })
            .collect::<DaoResult<Vec<Document>>>()?;

        let reply = self
            .database()
            .run_command(doc! {
                "update": collection,
                "updates": updates,
                "ordered": false,
            })
            .await
            .map_err(backend_error)?;

        let upserted_ids: BTreeMap<usize, Bson> = reply
            .get_array("upserted")
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Bson::as_document)
                    .filter_map(|entry| {
                        let index = reply_count(entry, "index") as usize;
                        entry.get("_id").map(|id| (index, id.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let upserted_count = upserted_ids.len() as u64;
        let result = BulkWriteResult {
            matched_count: reply_count(&reply, "n").saturating_sub(upserted_count),
            modified_count: reply_count(&reply, "nModified"),
            upserted_count,
            upserted_ids,
        };

        let errors = write_errors(&reply);
        if !errors.is_empty() {
            warn!(collection, failed = errors.len(), "bulk write partially failed");
            return Err(DaoError::PartialBulkWrite {
                collection: collection.to_string(),
                result,
                errors,
            });
        }

        Ok(result)
    }

    async fn shutdown(self) -> DaoResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    config: MongoConfig,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self { config: MongoConfig::new(dsn, database) }
    }

    pub fn from_config(config: MongoConfig) -> Self {
        Self { config }
    }

    /// Replaces the client tuning, keeping the connection string and database.
    pub fn with_config(mut self, config: MongoConfig) -> Self {
        self.config = MongoConfig {
            uri: self.config.uri,
            database: self.config.database,
            ..config
        };
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DaoResult<Self::Backend> {
        let mut options = ClientOptions::parse(&self.config.uri)
            .await
            .map_err(|e| DaoError::Initialization(e.to_string()))?;
        self.config.apply(&mut options);

        Ok(MongoDbStore::new(
            Client::with_options(options).map_err(|e| DaoError::Initialization(e.to_string()))?,
            self.config.database,
        ))
    }
}
