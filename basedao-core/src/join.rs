//! Joined reads.
//!
//! [`Dao::selects`] pages the main collection first and only then attaches rows from other
//! collections, so the number of lookups is bounded by the page size. Post-join filters run
//! over the joined page; they can shrink it without another pagination pass, which makes
//! `total` and `has_more` approximate whenever a post filter is present.

use bson::{Bson, Document};
use tracing::debug;

use crate::{
    backend::StoreBackend,
    dao::{Dao, log_failure},
    error::DaoResult,
    page::{PageRequest, PageResult},
    pipeline::{Lookup, Pipeline, Stage},
    query::{Expr, Projection, SortSpec, validate_field_name},
};

const TOTAL: &str = "total";

/// Attaches rows of another collection under `alias`.
///
/// Rows of `from` whose `foreign_key` equals the main row's `local_key` are filtered, sorted,
/// projected and capped by the join's own settings. A `limit` of one collapses the alias to
/// a single document, or `null` when nothing matched.
///
/// # Example
///
/// ```ignore
/// use basedao::join::ForeignJoin;
///
/// let vip = ForeignJoin::new("vip", "userId", "userId", "vipInfo").limit(1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignJoin {
    pub from: String,
    pub local_key: String,
    pub foreign_key: String,
    pub alias: String,
    pub limit: Option<usize>,
    pub filter: Option<Expr>,
    pub sort: SortSpec,
    pub projection: Projection,
}

impl ForeignJoin {
    pub fn new(
        from: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        ForeignJoin {
            from: from.into(),
            local_key: local_key.into(),
            foreign_key: foreign_key.into(),
            alias: alias.into(),
            limit: None,
            filter: None,
            sort: SortSpec::new(),
            projection: Projection::new(),
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
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

    /// Whether the alias holds one document instead of an array.
    pub fn is_single(&self) -> bool {
        self.limit == Some(1)
    }

    fn validate(&self) -> DaoResult<()> {
        for name in [&self.from, &self.local_key, &self.foreign_key, &self.alias] {
            validate_field_name(name)?;
        }

        self.filter.as_ref().map_or(Ok(()), Expr::validate)
    }

    fn lookup(&self) -> Lookup {
        let mut pipeline = Pipeline::new()
            .filter(self.filter.as_ref())
            .sort(&self.sort)
            .project(&self.projection);
        if let Some(limit) = self.limit {
            pipeline = pipeline.push(Stage::Limit(limit));
        }

        Lookup {
            from: self.from.clone(),
            local_field: self.local_key.clone(),
            foreign_field: self.foreign_key.clone(),
            alias: self.alias.clone(),
            pipeline: pipeline.into_stages(),
        }
    }
}

/// A paginated read of one collection with joined rows attached.
#[derive(Debug, Clone, Default)]
pub struct JoinQuery {
    pub filter: Option<Expr>,
    pub sort: SortSpec,
    /// Applied last, after post-join filtering and sorting.
    pub projection: Projection,
    pub page: Option<PageRequest>,
    pub joins: Vec<ForeignJoin>,
    /// Filters the joined page; may reference aliased fields with dotted paths.
    pub post_filter: Option<Expr>,
    pub post_sort: SortSpec,
}

impl JoinQuery {
    pub fn new() -> Self {
        JoinQuery::default()
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

    pub fn join(mut self, join: ForeignJoin) -> Self {
        self.joins.push(join);
        self
    }

    pub fn post_filter(mut self, filter: impl Into<Option<Expr>>) -> Self {
        self.post_filter = Expr::non_empty(filter.into());
        self
    }

    pub fn post_sort(mut self, sort: SortSpec) -> Self {
        self.post_sort = sort;
        self
    }

    fn validate(&self) -> DaoResult<()> {
        for filter in [&self.filter, &self.post_filter].into_iter().flatten() {
            filter.validate()?;
        }

        self.joins.iter().try_for_each(ForeignJoin::validate)
    }
}

/// Replaces single-row aliases' arrays with their first element or `null`.
fn collapse_single_joins(rows: &mut [Document], joins: &[ForeignJoin]) {
    for join in joins.iter().filter(|j| j.is_single()) {
        for row in rows.iter_mut() {
            if let Some(Bson::Array(matches)) = row.get_mut(&join.alias) {
                let first = std::mem::take(matches).into_iter().next().unwrap_or(Bson::Null);
                row.insert(join.alias.clone(), first);
            }
        }
    }
}

fn read_total(rows: &[Document]) -> u64 {
    match rows.first().and_then(|row| row.get(TOTAL)) {
        Some(Bson::Int32(n)) => *n as u64,
        Some(Bson::Int64(n)) => *n as u64,
        Some(Bson::Double(n)) => *n as u64,
        _ => 0,
    }
}

impl<B: StoreBackend> Dao<B> {
    /// Reads one page of `collection` and attaches joined rows.
    ///
    /// Stages run in this order: match, sort, page window, one lookup per join, post filter,
    /// post sort, projection. When a total is requested it is counted over the match and
    /// sort stages alone.
    pub async fn selects(
        &self,
        collection: &str,
        query: JoinQuery,
    ) -> DaoResult<PageResult<Document>> {
        async {
            query.validate()?;

            let page = self.resolve_page(query.page);
            let window = page.window();

            let matched = Pipeline::new().filter(query.filter.as_ref()).sort(&query.sort);

            let mut pipeline = matched.clone();
            if window.skip > 0 {
                pipeline = pipeline.push(Stage::Skip(window.skip));
            }
            if let Some(limit) = window.limit {
                pipeline = pipeline.push(Stage::Limit(limit));
            }
            for join in &query.joins {
                pipeline = pipeline.push(Stage::Lookup(join.lookup()));
            }
            let pipeline = pipeline
                .filter(query.post_filter.as_ref())
                .sort(&query.post_sort)
                .project(&query.projection);

            debug!(collection, ?pipeline, "joined select");
            let mut rows = self.backend.aggregate(collection, &pipeline).await?;
            collapse_single_joins(&mut rows, &query.joins);

            let mut result = PageResult::builder(rows, &page);
            if page.want_total() {
                let counted = matched.push(Stage::Count(TOTAL.to_string()));
                let total = read_total(&self.backend.aggregate(collection, &counted).await?);
                result = result.with_total(total).with_has_more(page.has_more(total));
            }

            Ok(result.build())
        }
        .await
        .inspect_err(|e| log_failure("selects", collection, e))
    }
}
