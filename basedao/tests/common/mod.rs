#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use basedao::{
    bson::{Bson, Document, doc},
    memory::InMemoryStore,
    prelude::*,
};

/// Wraps an in-memory store and records the window of every find.
#[derive(Debug, Clone, Default)]
pub struct RecordingStore {
    inner: InMemoryStore,
    finds: Arc<Mutex<Vec<(Option<usize>, Option<usize>)>>>,
    counts: Arc<Mutex<usize>>,
}

impl RecordingStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self { inner, ..Default::default() }
    }

    /// `(skip, limit)` of each find, sorted by skip. Concurrent chunks may be issued in
    /// any order.
    pub fn finds(&self) -> Vec<(Option<usize>, Option<usize>)> {
        let mut finds = self.finds.lock().unwrap().clone();
        finds.sort();
        finds
    }

    pub fn counts(&self) -> usize {
        *self.counts.lock().unwrap()
    }
}

#[async_trait]
impl StoreBackend for RecordingStore {
    async fn find(&self, collection: &str, query: FindQuery) -> DaoResult<Vec<Document>> {
        self.finds.lock().unwrap().push((query.skip, query.limit));
        StoreBackend::find(&self.inner, collection, query).await
    }

    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DaoResult<u64> {
        *self.counts.lock().unwrap() += 1;
        StoreBackend::count(&self.inner, collection, filter).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DaoResult<Bson> {
        StoreBackend::insert_one(&self.inner, collection, document).await
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DaoResult<u64> {
        StoreBackend::insert_many(&self.inner, collection, documents).await
    }

    async fn update_many(&self, collection: &str, filter: &Expr, patch: Document) -> DaoResult<u64> {
        StoreBackend::update_many(&self.inner, collection, filter, patch).await
    }

    async fn delete_many(&self, collection: &str, filter: &Expr) -> DaoResult<u64> {
        StoreBackend::delete_many(&self.inner, collection, filter).await
    }

    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> DaoResult<Vec<Document>> {
        StoreBackend::aggregate(&self.inner, collection, pipeline).await
    }

    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<WriteModel>,
    ) -> DaoResult<BulkWriteResult> {
        StoreBackend::bulk_write(&self.inner, collection, models).await
    }
}

/// Fails every find whose window starts at `fail_at`.
#[derive(Debug, Clone, Default)]
pub struct FailingStore {
    pub inner: InMemoryStore,
    pub fail_at: usize,
}

#[async_trait]
impl StoreBackend for FailingStore {
    async fn find(&self, collection: &str, query: FindQuery) -> DaoResult<Vec<Document>> {
        if query.skip == Some(self.fail_at) {
            return Err(DaoError::Backend("connection reset".into()));
        }
        StoreBackend::find(&self.inner, collection, query).await
    }

    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DaoResult<u64> {
        StoreBackend::count(&self.inner, collection, filter).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DaoResult<Bson> {
        StoreBackend::insert_one(&self.inner, collection, document).await
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DaoResult<u64> {
        StoreBackend::insert_many(&self.inner, collection, documents).await
    }

    async fn update_many(&self, collection: &str, filter: &Expr, patch: Document) -> DaoResult<u64> {
        StoreBackend::update_many(&self.inner, collection, filter, patch).await
    }

    async fn delete_many(&self, collection: &str, filter: &Expr) -> DaoResult<u64> {
        StoreBackend::delete_many(&self.inner, collection, filter).await
    }

    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> DaoResult<Vec<Document>> {
        StoreBackend::aggregate(&self.inner, collection, pipeline).await
    }

    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<WriteModel>,
    ) -> DaoResult<BulkWriteResult> {
        StoreBackend::bulk_write(&self.inner, collection, models).await
    }
}

/// Tracks how many finds are running at once. Each find yields a few times before reading
/// so that concurrent fetches overlap.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyStore {
    inner: InMemoryStore,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self { inner, ..Default::default() }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreBackend for ConcurrencyStore {
    async fn find(&self, collection: &str, query: FindQuery) -> DaoResult<Vec<Document>> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        let rows = StoreBackend::find(&self.inner, collection, query).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        rows
    }

    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DaoResult<u64> {
        StoreBackend::count(&self.inner, collection, filter).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DaoResult<Bson> {
        StoreBackend::insert_one(&self.inner, collection, document).await
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DaoResult<u64> {
        StoreBackend::insert_many(&self.inner, collection, documents).await
    }

    async fn update_many(&self, collection: &str, filter: &Expr, patch: Document) -> DaoResult<u64> {
        StoreBackend::update_many(&self.inner, collection, filter, patch).await
    }

    async fn delete_many(&self, collection: &str, filter: &Expr) -> DaoResult<u64> {
        StoreBackend::delete_many(&self.inner, collection, filter).await
    }

    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> DaoResult<Vec<Document>> {
        StoreBackend::aggregate(&self.inner, collection, pipeline).await
    }

    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<WriteModel>,
    ) -> DaoResult<BulkWriteResult> {
        StoreBackend::bulk_write(&self.inner, collection, models).await
    }
}

/// `n` orders with sequential `seq`, alternating status and amount `seq * 10`.
pub fn orders(n: i32) -> Vec<Document> {
    (0..n)
        .map(|seq| {
            doc! {
                "_id": format!("o{seq:05}"),
                "seq": seq,
                "userId": format!("u{}", seq % 10),
                "status": if seq % 2 == 0 { "paid" } else { "open" },
                "amount": seq * 10,
            }
        })
        .collect()
}

pub async fn store_with_orders(n: i32) -> InMemoryStore {
    InMemoryStore::builder()
        .with_documents("orders", orders(n))
        .build()
        .await
        .unwrap()
}
