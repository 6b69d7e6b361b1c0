//! In-memory storage implementation for the DAO.
//!
//! This module provides a simple in-memory backend that keeps each collection as a vector of
//! BSON documents in insertion order, guarded by an async-aware read-write lock.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use tracing::{debug, warn};

use basedao_core::{
    backend::{BulkWriteResult, StoreBackend, StoreBackendBuilder, WriteModel},
    error::{DaoError, DaoResult},
    pipeline::Pipeline,
    query::{Expr, FieldOp, FindQuery},
};

use crate::{
    evaluator::{Comparable, DocumentEvaluator, sort_documents},
    executor::{StoreMap, execute},
    projection::{project, set_path},
};

/// Thread-safe in-memory document storage backend.
///
/// This struct implements the [`StoreBackend`] trait with the same observable semantics the
/// DAO relies on from a document database: dotted-path filters, multi-key sorts,
/// projections, merge-patch updates, unordered bulk writes and lookup pipelines.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing it to be
/// safely shared across async tasks. Multiple clones of the same instance share the same
/// underlying data.
///
/// # Performance
///
/// Queries scan all documents in a collection (no indexing). It is meant for development
/// and tests.
///
/// # Example
///
/// ```ignore
/// use basedao_memory::InMemoryStore;
/// use basedao::backend::StoreBackend;
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///     let id = store.insert_one("users", doc! { "name": "Alice" }).await?;
///     assert_eq!(store.count("users", None).await?, 1);
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self { store: Arc::new(RwLock::new(StoreMap::new())) }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Names of the collections that have received at least one document.
    pub async fn collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.store.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Assigns an identity when the document has none, returning it.
fn ensure_id(document: &mut Document) -> Bson {
    match document.get("_id") {
        Some(id) => id.clone(),
        None => {
            let id = Bson::ObjectId(ObjectId::new());
            document.insert("_id", id.clone());
            id
        }
    }
}

fn contains_id(documents: &[Document], id: &Bson) -> bool {
    let id = Comparable::from(id);
    documents
        .iter()
        .filter_map(|document| document.get("_id"))
        .any(|existing| Comparable::from(existing) == id)
}

fn insert(documents: &mut Vec<Document>, collection: &str, mut document: Document) -> DaoResult<Bson> {
    let id = ensure_id(&mut document);
    if contains_id(documents, &id) {
        return Err(DaoError::DuplicateKey(id.to_string(), collection.to_string()));
    }
    documents.push(document);

    Ok(id)
}

/// Sets every field of `patch` on `document`. Returns whether anything changed.
fn apply_patch(document: &mut Document, patch: &Document) -> DaoResult<bool> {
    if let Some(id) = patch.get("_id") {
        if document.get("_id") != Some(id) {
            return Err(DaoError::Backend(
                "the _id field is immutable and cannot be updated".into(),
            ));
        }
    }

    let before = document.clone();
    for (field, value) in patch {
        set_path(document, field, value.clone());
    }

    Ok(*document != before)
}

/// The document an upsert starts from: the equality terms of its filter.
fn upsert_seed(filter: &Expr, seed: &mut Document) {
    match filter {
        Expr::And(exprs) => exprs.iter().for_each(|expr| upsert_seed(expr, seed)),
        Expr::Field { field, op: FieldOp::Eq, value } => set_path(seed, field, value.clone()),
        _ => {}
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn find(&self, collection: &str, query: FindQuery) -> DaoResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(vec![]);
        };

        let mut matched = Vec::new();
        for document in documents {
            if DocumentEvaluator::matches(document, query.filter.as_ref())? {
                matched.push(document.clone());
            }
        }
        drop(store);

        sort_documents(&mut matched, &query.sort);

        matched
            .into_iter()
            .skip(query.skip.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|document| project(document, &query.projection))
            .collect()
    }

    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DaoResult<u64> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(0);
        };

        let mut count = 0;
        for document in documents {
            if DocumentEvaluator::matches(document, filter)? {
                count += 1;
            }
        }

        Ok(count)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DaoResult<Bson> {
        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        insert(documents, collection, document)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DaoResult<u64> {
        let mut store = self.store.write().await;
        let existing = store.entry(collection.to_string()).or_default();

        let mut inserted = 0;
        let mut first_error = None;
        for document in documents {
            match insert(existing, collection, document) {
                Ok(_) => inserted += 1,
                Err(err) => {
                    warn!(collection, error = %err, "insert skipped");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(inserted),
        }
    }

    async fn update_many(&self, collection: &str, filter: &Expr, patch: Document) -> DaoResult<u64> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(0);
        };

        let mut modified = 0;
        for document in documents.iter_mut() {
            if DocumentEvaluator::new(document).evaluate(filter)? && apply_patch(document, &patch)? {
                modified += 1;
            }
        }

        Ok(modified)
    }

    async fn delete_many(&self, collection: &str, filter: &Expr) -> DaoResult<u64> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(0);
        };

        let mut kept = Vec::with_capacity(documents.len());
        let mut deleted = 0;
        for document in documents.drain(..) {
            // Keep the document if evaluation fails so a bad filter never deletes.
            match DocumentEvaluator::new(&document).evaluate(filter) {
                Ok(true) => deleted += 1,
                _ => kept.push(document),
            }
        }
        *documents = kept;

        Ok(deleted)
    }

    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> DaoResult<Vec<Document>> {
        let store = self.store.read().await;
        let documents = store.get(collection).cloned().unwrap_or_default();

        debug!(collection, stages = pipeline.len(), "executing pipeline");
        execute(&store, documents, pipeline.stages())
    }

    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<WriteModel>,
    ) -> DaoResult<BulkWriteResult> {
        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        let mut result = BulkWriteResult::default();
        let mut errors = Vec::new();

        for (index, model) in models.into_iter().enumerate() {
            let WriteModel::UpdateOne { filter, update, upsert } = model;

            let mut position = None;
            for (i, document) in documents.iter().enumerate() {
                if DocumentEvaluator::new(document).evaluate(&filter)? {
                    position = Some(i);
                    break;
                }
            }

            let outcome = match position {
                Some(i) => apply_patch(&mut documents[i], &update).map(|changed| {
                    result.matched_count += 1;
                    if changed {
                        result.modified_count += 1;
                    }
                }),
                None if upsert => {
                    let mut seed = Document::new();
                    upsert_seed(&filter, &mut seed);
                    apply_patch(&mut seed, &update)
                        .and_then(|_| insert(documents, collection, seed))
                        .map(|id| {
                            result.upserted_count += 1;
                            result.upserted_ids.insert(index, id);
                        })
                }
                None => Ok(()),
            };

            if let Err(err) = outcome {
                errors.push(format!("#{index}: {err}"));
            }
        }

        match errors.is_empty() {
            true => Ok(result),
            false => Err(DaoError::PartialBulkWrite {
                collection: collection.to_string(),
                result,
                errors,
            }),
        }
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use basedao_memory::InMemoryStore;
/// use basedao::backend::StoreBackendBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemoryStore::builder().build().await.unwrap();
/// }
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    seed: Vec<(String, Vec<Document>)>,
}

impl InMemoryStoreBuilder {
    /// Preloads `collection` with `documents`, assigning identities where missing.
    pub fn with_documents(mut self, collection: impl Into<String>, documents: Vec<Document>) -> Self {
        self.seed.push((collection.into(), documents));
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds the store. Fails if a seeded collection repeats an identity.
    async fn build(self) -> DaoResult<Self::Backend> {
        let store = InMemoryStore::new();
        for (collection, documents) in self.seed {
            store.insert_many(&collection, documents).await?;
        }

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedao_core::query::{Filter, Projection, SortSpec};
    use bson::doc;

    async fn seeded() -> InMemoryStore {
        InMemoryStore::builder()
            .with_documents(
                "users",
                vec![
                    doc! { "_id": "a", "name": "Ann", "age": 31 },
                    doc! { "_id": "b", "name": "Bob", "age": 25 },
                    doc! { "_id": "c", "name": "Cid", "age": 40 },
                ],
            )
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn find_sorts_then_windows_then_projects() {
        let store = seeded().await;
        let query = FindQuery::builder()
            .filter(Filter::gt("age", 20))
            .sort(SortSpec::new().desc("age"))
            .projection(Projection::new().include("name").exclude("_id"))
            .skip(1)
            .limit(1)
            .build();

        assert_eq!(store.find("users", query).await.unwrap(), vec![doc! { "name": "Ann" }]);
    }

    #[tokio::test]
    async fn unknown_collections_read_empty() {
        let store = InMemoryStore::new();

        assert!(store.find("nope", FindQuery::new()).await.unwrap().is_empty());
        assert_eq!(store.count("nope", None).await.unwrap(), 0);
        assert!(store.collections().await.is_empty());
    }

    #[tokio::test]
    async fn insert_assigns_object_ids_and_rejects_duplicates() {
        let store = InMemoryStore::new();

        let id = store.insert_one("t", doc! { "x": 1 }).await.unwrap();
        assert!(matches!(id, Bson::ObjectId(_)));

        let err = store
            .insert_many("t", vec![doc! { "_id": "k" }, doc! { "_id": "k" }, doc! { "y": 2 }])
            .await
            .unwrap_err();
        assert!(matches!(err, DaoError::DuplicateKey(_, _)));
        assert_eq!(store.count("t", None).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn update_counts_only_changed_documents() {
        let store = seeded().await;

        let modified = store
            .update_many("users", &Filter::gte("age", 31), doc! { "age": 40 })
            .await
            .unwrap();
        assert_eq!(modified, 1);

        let err = store
            .update_many("users", &Filter::eq("_id", "a"), doc! { "_id": "z" })
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn bulk_write_updates_first_match_and_upserts() {
        let store = seeded().await;
        let models = vec![
            WriteModel::UpdateOne {
                filter: Filter::eq("name", "Ann"),
                update: doc! { "age": 32 },
                upsert: true,
            },
            WriteModel::UpdateOne {
                filter: Filter::eq("name", "Dee"),
                update: doc! { "age": 19 },
                upsert: true,
            },
            WriteModel::UpdateOne {
                filter: Filter::eq("name", "Eve"),
                update: doc! { "age": 50 },
                upsert: false,
            },
        ];

        let result = store.bulk_write("users", models).await.unwrap();

        assert_eq!(result.matched_count, 1);
        assert_eq!(result.modified_count, 1);
        assert_eq!(result.upserted_count, 1);
        assert!(result.upserted_ids.contains_key(&1));

        let dee = store
            .find("users", FindQuery::builder().filter(Filter::eq("name", "Dee")).build())
            .await
            .unwrap();
        assert_eq!(dee[0].get_i32("age").unwrap(), 19);
    }

    #[tokio::test]
    async fn partial_bulk_write_keeps_applied_counts() {
        let store = seeded().await;
        let models = vec![
            WriteModel::UpdateOne {
                filter: Filter::eq("name", "Ann"),
                update: doc! { "_id": "replaced" },
                upsert: false,
            },
            WriteModel::UpdateOne {
                filter: Filter::eq("name", "Dee"),
                update: doc! { "age": 19 },
                upsert: true,
            },
        ];

        let err = store.bulk_write("users", models).await.unwrap_err();

        let DaoError::PartialBulkWrite { result, errors, .. } = err else {
            panic!("unexpected error {err}");
        };
        assert_eq!(result.upserted_count, 1);
        assert!(result.upserted_ids.contains_key(&1));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("#0"));
    }

    #[tokio::test]
    async fn delete_removes_matches_only() {
        let store = seeded().await;

        assert_eq!(store.delete_many("users", &Filter::lt("age", 35)).await.unwrap(), 2);
        assert_eq!(store.count("users", None).await.unwrap(), 1);
    }
}
