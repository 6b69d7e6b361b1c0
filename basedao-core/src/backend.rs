//! Storage backend abstraction for the DAO.
//!
//! The [`StoreBackend`] trait is the document-store collaborator the DAO talks to. It is
//! intentionally close to what a document database driver exposes per collection: find with
//! sort/skip/limit/projection, count, single and bulk inserts, merge-patch updates, deletes,
//! aggregation pipelines and unordered bulk writes.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`DynStoreBackend`]: An object-safe twin for runtime backend selection
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use basedao::backend::StoreBackend;
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//! let id = backend.insert_one("users", doc! { "name": "Alice" }).await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use std::{any::Any, collections::BTreeMap, fmt::Debug, sync::Arc};

use crate::{
    error::DaoResult,
    pipeline::Pipeline,
    query::{Expr, FindQuery},
};

/// One entry of an unordered bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    /// Applies `update` as a merge patch to the first document matching `filter`,
    /// inserting one when nothing matches and `upsert` is set.
    UpdateOne {
        filter: Expr,
        update: Document,
        upsert: bool,
    },
}

/// Outcome of a bulk write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteResult {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_count: u64,
    /// Identities of upserted documents keyed by their position in the request.
    pub upserted_ids: BTreeMap<usize, Bson>,
}

/// Abstract interface for document stores.
///
/// # Thread Safety
///
/// Implementations must be thread-safe: the DAO issues concurrent reads against one
/// backend while scanning in chunks.
///
/// # Error Handling
///
/// Operations return [`DaoResult<T>`](crate::error::DaoResult). Driver failures map to
/// [`DaoError::Backend`](crate::error::DaoError::Backend).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Returns documents matching `query`, applying sort, then skip and limit, then projection.
    async fn find(&self, collection: &str, query: FindQuery) -> DaoResult<Vec<Document>>;

    /// Counts documents matching `filter` (all documents when `None`).
    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DaoResult<u64>;

    /// Inserts one document and returns its identity, assigning one when `_id` is absent.
    async fn insert_one(&self, collection: &str, document: Document) -> DaoResult<Bson>;

    /// Inserts documents without ordering guarantees and returns how many were written.
    ///
    /// Documents that fail (for example on a duplicate identity) do not prevent the others
    /// from being written; the call then reports an error.
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DaoResult<u64>;

    /// Merges `patch` into every document matching `filter`, returning how many changed.
    async fn update_many(&self, collection: &str, filter: &Expr, patch: Document) -> DaoResult<u64>;

    /// Deletes every document matching `filter`, returning how many were removed.
    async fn delete_many(&self, collection: &str, filter: &Expr) -> DaoResult<u64>;

    /// Runs an aggregation pipeline over the collection.
    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> DaoResult<Vec<Document>>;

    /// Applies write models without ordering guarantees. Entries that succeed are kept even
    /// when others fail, in which case the error is
    /// [`DaoError::PartialBulkWrite`](crate::error::DaoError::PartialBulkWrite).
    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<WriteModel>,
    ) -> DaoResult<BulkWriteResult>;

    /// Releases backend resources. The default implementation is a no-op.
    async fn shutdown(self) -> DaoResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for Arc<B>
where
    B: StoreBackend,
{
    async fn find(&self, collection: &str, query: FindQuery) -> DaoResult<Vec<Document>> {
        StoreBackend::find(&**self, collection, query).await
    }

    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DaoResult<u64> {
        StoreBackend::count(&**self, collection, filter).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DaoResult<Bson> {
        StoreBackend::insert_one(&**self, collection, document).await
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DaoResult<u64> {
        StoreBackend::insert_many(&**self, collection, documents).await
    }

    async fn update_many(&self, collection: &str, filter: &Expr, patch: Document) -> DaoResult<u64> {
        StoreBackend::update_many(&**self, collection, filter, patch)
            .await
    }

    async fn delete_many(&self, collection: &str, filter: &Expr) -> DaoResult<u64> {
        StoreBackend::delete_many(&**self, collection, filter).await
    }

    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> DaoResult<Vec<Document>> {
        StoreBackend::aggregate(&**self, collection, pipeline).await
    }

    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<WriteModel>,
    ) -> DaoResult<BulkWriteResult> {
        StoreBackend::bulk_write(&**self, collection, models).await
    }
}

#[async_trait]
pub trait DynStoreBackend: Send + Sync + Debug {
    async fn find(&self, collection: &str, query: FindQuery) -> DaoResult<Vec<Document>>;
    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DaoResult<u64>;
    async fn insert_one(&self, collection: &str, document: Document) -> DaoResult<Bson>;
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DaoResult<u64>;
    async fn update_many(&self, collection: &str, filter: &Expr, patch: Document) -> DaoResult<u64>;
    async fn delete_many(&self, collection: &str, filter: &Expr) -> DaoResult<u64>;
    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> DaoResult<Vec<Document>>;
    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<WriteModel>,
    ) -> DaoResult<BulkWriteResult>;
    async fn shutdown_boxed(self: Box<Self>) -> DaoResult<()>;

    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
impl<B: StoreBackend + Send + Sync + 'static> DynStoreBackend for B {
    async fn find(&self, collection: &str, query: FindQuery) -> DaoResult<Vec<Document>> {
        StoreBackend::find(self, collection, query).await
    }

    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DaoResult<u64> {
        StoreBackend::count(self, collection, filter).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DaoResult<Bson> {
        StoreBackend::insert_one(self, collection, document).await
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DaoResult<u64> {
        StoreBackend::insert_many(self, collection, documents).await
    }

    async fn update_many(&self, collection: &str, filter: &Expr, patch: Document) -> DaoResult<u64> {
        StoreBackend::update_many(self, collection, filter, patch).await
    }

    async fn delete_many(&self, collection: &str, filter: &Expr) -> DaoResult<u64> {
        StoreBackend::delete_many(self, collection, filter).await
    }

    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> DaoResult<Vec<Document>> {
        StoreBackend::aggregate(self, collection, pipeline).await
    }

    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<WriteModel>,
    ) -> DaoResult<BulkWriteResult> {
        StoreBackend::bulk_write(self, collection, models).await
    }

    async fn shutdown_boxed(self: Box<Self>) -> DaoResult<()> {
        StoreBackend::shutdown(*self).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Lets a boxed, runtime-selected backend drive a [`Dao`](crate::dao::Dao).
#[async_trait]
impl StoreBackend for Box<dyn DynStoreBackend> {
    async fn find(&self, collection: &str, query: FindQuery) -> DaoResult<Vec<Document>> {
        DynStoreBackend::find(&**self, collection, query).await
    }

    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DaoResult<u64> {
        DynStoreBackend::count(&**self, collection, filter).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DaoResult<Bson> {
        DynStoreBackend::insert_one(&**self, collection, document).await
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DaoResult<u64> {
        DynStoreBackend::insert_many(&**self, collection, documents).await
    }

    async fn update_many(&self, collection: &str, filter: &Expr, patch: Document) -> DaoResult<u64> {
        DynStoreBackend::update_many(&**self, collection, filter, patch)
            .await
    }

    async fn delete_many(&self, collection: &str, filter: &Expr) -> DaoResult<u64> {
        DynStoreBackend::delete_many(&**self, collection, filter).await
    }

    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> DaoResult<Vec<Document>> {
        DynStoreBackend::aggregate(&**self, collection, pipeline).await
    }

    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<WriteModel>,
    ) -> DaoResult<BulkWriteResult> {
        DynStoreBackend::bulk_write(&**self, collection, models).await
    }

    async fn shutdown(self) -> DaoResult<()> {
        DynStoreBackend::shutdown_boxed(self).await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DaoResult<Self::Backend>;
}
