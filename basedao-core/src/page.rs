//! Pagination requests, result envelopes and scan windows.
//!
//! Pages are 1-indexed. A page size of `-1` (any negative size) is the "unbounded" sentinel:
//! it selects every matching row and always computes a total. A size of `0` takes the DAO's
//! configured default.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// How many rows one page holds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(from = "i64", into = "i64")]
pub enum PageSize {
    Limited(usize),
    Unbounded,
}

impl PageSize {
    pub fn limit(&self) -> Option<usize> {
        match self {
            PageSize::Limited(size) => Some(*size),
            PageSize::Unbounded => None,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, PageSize::Unbounded)
    }
}

impl From<i64> for PageSize {
    /// Negative sizes are unbounded. Zero stays zero and is later replaced by the DAO's
    /// configured default.
    fn from(size: i64) -> Self {
        match size {
            s if s < 0 => PageSize::Unbounded,
            s => PageSize::Limited(s as usize),
        }
    }
}

impl From<i32> for PageSize {
    fn from(size: i32) -> Self {
        PageSize::from(size as i64)
    }
}

impl From<PageSize> for i64 {
    fn from(size: PageSize) -> Self {
        match size {
            PageSize::Limited(size) => size as i64,
            PageSize::Unbounded => -1,
        }
    }
}

impl Default for PageSize {
    fn default() -> Self {
        PageSize::Limited(DEFAULT_PAGE_SIZE)
    }
}

/// Which page to read and whether to count the full match set.
///
/// # Example
///
/// ```ignore
/// use basedao::page::PageRequest;
///
/// let page = PageRequest::new(3, 20).with_total();
/// assert_eq!(page.offset(), 40);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase", from = "RawPageRequest")]
pub struct PageRequest {
    page_index: usize,
    page_size: PageSize,
    want_total: bool,
}

/// Wire form of a [`PageRequest`]. Decoding goes through [`PageRequest::new`] so the index
/// is clamped and the unbounded sentinel still forces a total.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawPageRequest {
    page_index: usize,
    page_size: PageSize,
    want_total: bool,
}

impl Default for RawPageRequest {
    fn default() -> Self {
        RawPageRequest { page_index: 1, page_size: PageSize::default(), want_total: false }
    }
}

impl From<RawPageRequest> for PageRequest {
    fn from(raw: RawPageRequest) -> Self {
        let page = PageRequest::new(raw.page_index, raw.page_size);
        match raw.want_total {
            true => page.with_total(),
            false => page,
        }
    }
}

impl PageRequest {
    /// Creates a request for `page_index` (clamped to at least 1) of `page_size` rows.
    /// The unbounded sentinel resets the index to 1 and turns counting on.
    pub fn new(page_index: usize, page_size: impl Into<PageSize>) -> Self {
        let page_size = page_size.into();

        match page_size {
            PageSize::Unbounded => PageRequest { page_index: 1, page_size, want_total: true },
            PageSize::Limited(_) => PageRequest {
                page_index: page_index.max(1),
                page_size,
                want_total: false,
            },
        }
    }

    /// Every matching row, counted.
    pub fn unbounded() -> Self {
        PageRequest::new(1, PageSize::Unbounded)
    }

    /// Replaces a zero page size with `page_size`.
    pub fn with_default_size(mut self, page_size: usize) -> Self {
        if self.page_size == PageSize::Limited(0) {
            self.page_size = PageSize::Limited(page_size);
        }
        self
    }

    /// Requests a total count alongside the rows.
    pub fn with_total(mut self) -> Self {
        self.want_total = true;
        self
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn want_total(&self) -> bool {
        self.want_total
    }

    /// Number of rows before this page.
    pub fn offset(&self) -> usize {
        match self.page_size {
            PageSize::Limited(size) => self.page_index.saturating_sub(1).saturating_mul(size),
            PageSize::Unbounded => 0,
        }
    }

    pub fn window(&self) -> Window {
        Window { skip: self.offset(), limit: self.page_size.limit() }
    }

    /// Whether rows exist past this page, given the total match count.
    pub fn has_more(&self, total: u64) -> bool {
        match self.page_size {
            PageSize::Limited(size) => {
                let end = self.page_index.saturating_mul(size) as u64;
                total > end
            }
            PageSize::Unbounded => false,
        }
    }

    /// The contiguous sub-windows covering this page, each at most `chunk_size` rows.
    ///
    /// With a known `total`, the page is clamped to the rows that exist. Without one, a
    /// bounded page is covered in full and an unbounded page cannot be planned (it always
    /// carries a total).
    pub fn chunks(&self, total: Option<u64>, chunk_size: usize) -> Vec<Window> {
        let chunk_size = chunk_size.max(1);
        let offset = self.offset();
        let available = total.map(|t| (t as usize).saturating_sub(offset));

        let rows = match (self.page_size.limit(), available) {
            (Some(size), Some(available)) => size.min(available),
            (Some(size), None) => size,
            (None, Some(available)) => available,
            (None, None) => 0,
        };

        (0..rows)
            .step_by(chunk_size)
            .map(|start| Window {
                skip: offset + start,
                limit: Some(chunk_size.min(rows - start)),
            })
            .collect()
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest::new(1, PageSize::default())
    }
}

/// A `skip`/`limit` pair. `limit: None` reads to the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub skip: usize,
    pub limit: Option<usize>,
}

/// The uniform envelope returned by paginated reads.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T> {
    pub rows: Vec<T>,
    pub has_more: bool,
    pub total: u64,
    pub page_index: usize,
    pub page_size: PageSize,
}

impl<T> PageResult<T> {
    pub fn builder(rows: Vec<T>, request: &PageRequest) -> PageResultBuilder<T> {
        PageResultBuilder::new(rows, request)
    }

    /// Converts every row, failing on the first conversion error.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<PageResult<U>, E> {
        Ok(PageResult {
            rows: self.rows.into_iter().map(f).collect::<Result<Vec<U>, E>>()?,
            has_more: self.has_more,
            total: self.total,
            page_index: self.page_index,
            page_size: self.page_size,
        })
    }
}

pub struct PageResultBuilder<T> {
    rows: Vec<T>,
    has_more: bool,
    total: u64,
    page_index: usize,
    page_size: PageSize,
}

impl<T> PageResultBuilder<T> {
    pub fn new(rows: Vec<T>, request: &PageRequest) -> Self {
        Self {
            rows,
            has_more: false,
            total: 0,
            page_index: request.page_index(),
            page_size: request.page_size(),
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = total;
        self
    }

    pub fn with_has_more(mut self, has_more: bool) -> Self {
        self.has_more = has_more;
        self
    }

    pub fn build(self) -> PageResult<T> {
        PageResult {
            rows: self.rows,
            has_more: self.has_more,
            total: self.total,
            page_index: self.page_index,
            page_size: self.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_forces_total_and_first_page() {
        let page = PageRequest::new(7, -1);

        assert_eq!(page.page_size(), PageSize::Unbounded);
        assert_eq!(page.page_index(), 1);
        assert!(page.want_total());
        assert_eq!(page.window(), Window { skip: 0, limit: None });
    }

    #[test]
    fn zero_values_fall_back_to_defaults() {
        let page = PageRequest::new(0, 0);

        assert_eq!(page.page_index(), 1);
        assert_eq!(page.page_size(), PageSize::Limited(0));
        assert!(!page.want_total());

        let page = page.with_default_size(25);
        assert_eq!(page.page_size(), PageSize::Limited(25));
        assert_eq!(PageRequest::new(1, 5).with_default_size(25).page_size(), PageSize::Limited(5));
    }

    #[test]
    fn decoding_keeps_page_invariants() {
        let page: PageRequest =
            serde_json::from_str(r#"{ "pageIndex": 3, "pageSize": -1, "wantTotal": false }"#).unwrap();
        assert_eq!(page, PageRequest::unbounded());
        assert!(page.want_total());

        let page: PageRequest =
            serde_json::from_str(r#"{ "pageIndex": 0, "pageSize": 2, "wantTotal": true }"#).unwrap();
        assert_eq!(page.page_index(), 1);
        assert_eq!(page.offset(), 0);
        assert!(page.want_total());

        let page: PageRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(page, PageRequest::default());
    }

    #[test]
    fn huge_pages_saturate_instead_of_overflowing() {
        let page = PageRequest::new(usize::MAX, i64::MAX);

        assert_eq!(page.offset(), usize::MAX);
        assert!(!page.has_more(u64::MAX - 1));
    }

    #[test]
    fn has_more_compares_total_with_page_end() {
        let page = PageRequest::new(2, 10);

        assert!(page.has_more(21));
        assert!(!page.has_more(20));
        assert!(!PageRequest::unbounded().has_more(1_000));
    }

    #[test]
    fn unbounded_scan_splits_into_thousand_row_chunks() {
        let chunks = PageRequest::unbounded().chunks(Some(2500), 1000);

        assert_eq!(
            chunks,
            vec![
                Window { skip: 0, limit: Some(1000) },
                Window { skip: 1000, limit: Some(1000) },
                Window { skip: 2000, limit: Some(500) },
            ]
        );
    }

    #[test]
    fn bounded_scan_is_clamped_to_existing_rows() {
        let page = PageRequest::new(2, 1500);

        assert_eq!(
            page.chunks(Some(2000), 1000),
            vec![Window { skip: 1500, limit: Some(500) }]
        );
        assert_eq!(
            page.chunks(None, 1000),
            vec![
                Window { skip: 1500, limit: Some(1000) },
                Window { skip: 2500, limit: Some(500) },
            ]
        );
        assert!(page.chunks(Some(1200), 1000).is_empty());
    }

    #[test]
    fn page_result_serializes_camel_case_with_sentinel() {
        let result = PageResult::<i32>::builder(vec![1], &PageRequest::unbounded())
            .with_total(1)
            .build();
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["pageSize"], -1);
        assert_eq!(json["hasMore"], false);
        assert_eq!(json["pageIndex"], 1);
    }
}
