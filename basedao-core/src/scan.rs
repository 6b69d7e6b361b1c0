use bson::Document;
use futures::{StreamExt, TryStreamExt, stream};
use tracing::debug;

use crate::{
    backend::StoreBackend,
    dao::{Dao, SelectQuery, log_failure},
    error::DaoResult,
    page::{PageResult, Window},
    query::FindQuery,
};

impl<B: StoreBackend> Dao<B> {
    /// Reads a page in fixed-size chunks.
    ///
    /// A single unbounded fetch is never issued: the page window is split into contiguous
    /// sub-windows of at most [`chunk_size`](crate::config::DaoConfig::chunk_size) rows,
    /// fetched with at most
    /// [`max_concurrent_chunks`](crate::config::DaoConfig::max_concurrent_chunks) in flight
    /// and concatenated in window order.
    ///
    /// An unbounded page (size `-1`) always counts first so the scan knows where to stop.
    /// If any chunk fails the whole scan fails; partial rows are never returned. Without a
    /// count, `total` is the number of rows read.
    pub async fn select_all(
        &self,
        collection: &str,
        query: SelectQuery,
    ) -> DaoResult<PageResult<Document>> {
        async {
            query.validate()?;

            let page = self.resolve_page(query.page);
            let total = match page.want_total() {
                true => Some(self.backend.count(collection, query.filter.as_ref()).await?),
                false => None,
            };

            let windows = page.chunks(total, self.config.chunk_size);
            debug!(collection, ?total, chunks = windows.len(), "chunked scan");

            let fetch = |window: Window| {
                let mut find = FindQuery::builder()
                    .filter(query.filter.clone())
                    .sort(query.sort.clone())
                    .projection(query.projection.clone())
                    .skip(window.skip);
                if let Some(limit) = window.limit {
                    find = find.limit(limit);
                }

                self.backend.find(collection, find.build())
            };

            let chunks: Vec<Vec<Document>> = stream::iter(windows)
                .map(fetch)
                .buffered(self.config.max_concurrent_chunks.max(1))
                .try_collect()
                .await?;
            let rows: Vec<Document> = chunks.into_iter().flatten().collect();

            let result = match total {
                Some(total) => PageResult::builder(rows, &page)
                    .with_total(total)
                    .with_has_more(page.has_more(total)),
                None => {
                    let read = rows.len() as u64;
                    PageResult::builder(rows, &page).with_total(read)
                }
            };

            Ok(result.build())
        }
        .await
        .inspect_err(|e| log_failure("select_all", collection, e))
    }
}
