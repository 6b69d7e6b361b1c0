//! The data access object.
//!
//! [`Dao`] wraps one injected [`StoreBackend`] and exposes the operations business handlers
//! call: CRUD, aggregates, paginated reads, joined reads and chunked scans. Every operation
//! returns a [`DaoResult`] and logs its own failures, so callers only need to branch on the
//! error when they care about it.
//!
//! Operations are spread over several `impl` blocks by concern; this module holds the type,
//! the paginated `select` and the single-row finders.

use std::fmt::Display;

use bson::{Bson, Document, oid::ObjectId};
use tracing::{error, warn};

use crate::{
    backend::StoreBackend,
    config::DaoConfig,
    error::{DaoError, DaoResult},
    page::{PageRequest, PageResult, PageSize},
    pipeline::Pipeline,
    query::{Expr, Filter, FindQuery, Projection, SortSpec},
};

/// A paginated read against one collection.
///
/// # Example
///
/// ```ignore
/// use basedao::{dao::SelectQuery, page::PageRequest, query::{Filter, SortSpec}};
///
/// let query = SelectQuery::new()
///     .filter(Filter::gte("amount", 100))
///     .sort(SortSpec::new().desc("_add_time"))
///     .page(PageRequest::new(2, 50).with_total());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    /// `None` (or an empty expression) reads every document.
    pub filter: Option<Expr>,
    pub sort: SortSpec,
    pub projection: Projection,
    /// `None` reads the first page at the configured default page size.
    pub page: Option<PageRequest>,
}

impl SelectQuery {
    pub fn new() -> Self {
        SelectQuery::default()
    }

    pub fn filter(mut self, filter: impl Into<Option<Expr>>) -> Self {
        self.filter = Expr::non_empty(filter.into());
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.page = Some(page);
        self
    }

    pub(crate) fn validate(&self) -> DaoResult<()> {
        self.filter.as_ref().map_or(Ok(()), Expr::validate)
    }
}

/// Generic data access over the collections of one store.
///
/// # Example
///
/// ```ignore
/// use basedao::{dao::Dao, query::Filter};
///
/// let dao = Dao::new(backend);
/// dao.add("users", doc! { "name": "Alice" }, false).await?;
/// let alice = dao.find_by_where("users", Filter::eq("name", "Alice"), None, None).await?;
/// ```
#[derive(Debug)]
pub struct Dao<B: StoreBackend> {
    pub(crate) backend: B,
    pub(crate) config: DaoConfig,
}

impl<B: StoreBackend> Dao<B> {
    pub fn new(backend: B) -> Self {
        Dao::with_config(backend, DaoConfig::default())
    }

    pub fn with_config(backend: B, config: DaoConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &DaoConfig {
        &self.config
    }

    /// Releases the backend.
    pub async fn shutdown(self) -> DaoResult<()> {
        self.backend.shutdown().await
    }

    /// Reads one page of `collection`.
    ///
    /// Sort, skip, limit and projection travel in a single find. When the page asks for a
    /// total, a count over the same filter follows and `has_more` is derived from it;
    /// otherwise `total` is `0` and `has_more` is `false`.
    pub async fn select(
        &self,
        collection: &str,
        query: SelectQuery,
    ) -> DaoResult<PageResult<Document>> {
        async {
            query.validate()?;

            let page = self.resolve_page(query.page);
            let window = page.window();
            let mut find = FindQuery::builder()
                .filter(query.filter.clone())
                .sort(query.sort)
                .projection(query.projection)
                .skip(window.skip);
            if let Some(limit) = window.limit {
                find = find.limit(limit);
            }

            let rows = self.backend.find(collection, find.build()).await?;
            let mut result = PageResult::builder(rows, &page);

            if page.want_total() {
                let total = self.backend.count(collection, query.filter.as_ref()).await?;
                result = result.with_total(total).with_has_more(page.has_more(total));
            }

            Ok(result.build())
        }
        .await
        .inspect_err(|e| log_failure("select", collection, e))
    }

    /// Returns the first document matching `filter` after sorting, if any.
    pub async fn find_by_where(
        &self,
        collection: &str,
        filter: Expr,
        sort: Option<SortSpec>,
        projection: Option<Projection>,
    ) -> DaoResult<Option<Document>> {
        async {
            let filter = self.require_predicate("find_by_where", collection, filter)?;
            let query = FindQuery::builder()
                .filter(filter)
                .sort(sort.unwrap_or_default())
                .projection(projection.unwrap_or_default())
                .limit(1)
                .build();

            Ok(self.backend.find(collection, query).await?.into_iter().next())
        }
        .await
        .inspect_err(|e| log_failure("find_by_where", collection, e))
    }

    /// Returns every document matching `filter`, possibly none.
    pub async fn find_list_by_where(
        &self,
        collection: &str,
        filter: Expr,
        sort: Option<SortSpec>,
        projection: Option<Projection>,
    ) -> DaoResult<Vec<Document>> {
        async {
            let filter = self.require_predicate("find_list_by_where", collection, filter)?;
            let query = FindQuery::builder()
                .filter(filter)
                .sort(sort.unwrap_or_default())
                .projection(projection.unwrap_or_default())
                .build();

            self.backend.find(collection, query).await
        }
        .await
        .inspect_err(|e| log_failure("find_list_by_where", collection, e))
    }

    /// Looks a document up by identity.
    ///
    /// Identities written through [`adds`](Dao::adds) are strings while store-assigned ones
    /// are object ids, so an id that parses as an object id matches either form.
    pub async fn find_by_id(
        &self,
        collection: &str,
        id: &str,
        projection: Option<Projection>,
    ) -> DaoResult<Option<Document>> {
        let filter = match ObjectId::parse_str(id) {
            Ok(oid) => Filter::any_of("_id", [Bson::ObjectId(oid), Bson::String(id.to_string())]),
            Err(_) => Filter::eq("_id", id),
        };

        self.find_by_where(collection, filter, None, projection).await
    }

    /// Runs a caller-assembled pipeline unchanged.
    pub async fn aggregate(
        &self,
        collection: &str,
        pipeline: Pipeline,
    ) -> DaoResult<Vec<Document>> {
        self.backend
            .aggregate(collection, &pipeline)
            .await
            .inspect_err(|e| log_failure("aggregate", collection, e))
    }

    /// Fills in the configured page size when the page is omitted or sized zero.
    pub(crate) fn resolve_page(&self, page: Option<PageRequest>) -> PageRequest {
        page.unwrap_or_else(|| PageRequest::new(1, PageSize::Limited(0)))
            .with_default_size(self.config.default_page_size)
    }

    /// Validates `filter` and rejects it when it constrains nothing.
    pub(crate) fn require_predicate(
        &self,
        op: &'static str,
        collection: &str,
        filter: Expr,
    ) -> DaoResult<Expr> {
        if filter.is_empty() {
            warn!(op, collection, "rejected operation with an empty where condition");
            return Err(DaoError::EmptyPredicate(op));
        }
        filter.validate()?;

        Ok(filter)
    }
}

pub(crate) fn log_failure(op: &str, collection: &str, err: &impl Display) {
    error!(op, collection, error = %err, "operation failed");
}
