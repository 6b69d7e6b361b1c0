//! Convenient re-exports of commonly used types from basedao.
//!
//! ```ignore
//! use basedao::prelude::*;
//! ```
//!
//! This provides access to:
//! - The DAO and its query descriptors
//! - Store backends and builders
//! - Predicates, sorts and projections
//! - Pagination types
//! - Error types

pub use basedao_core::{
    backend::{BulkWriteResult, DynStoreBackend, StoreBackend, StoreBackendBuilder, WriteModel},
    config::DaoConfig,
    dao::{Dao, SelectQuery},
    error::{DaoError, DaoResult, ErrorKind},
    join::{ForeignJoin, JoinQuery},
    page::{PageRequest, PageResult, PageSize},
    pipeline::{Accumulator, Group, Pipeline, Stage},
    query::{Expr, FieldOp, Filter, FindQuery, Projection, QueryVisitor, Sort, SortDirection, SortSpec},
};
