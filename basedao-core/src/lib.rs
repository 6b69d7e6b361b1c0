//! A generic data access layer over schemaless document collections.
//!
//! This crate is the core of the basedao project and provides:
//!
//! - **Store backend abstraction** ([`backend`]) - The document-store collaborator the DAO drives
//! - **Query descriptors** ([`query`]) - Typed predicates, sort specifications and projections
//! - **Pipelines** ([`pipeline`]) - Aggregation stages assembled for aggregates and joins
//! - **Pagination** ([`page`]) - Page requests, scan windows and the uniform result envelope
//! - **The DAO** ([`dao`]) - CRUD, aggregates, joined reads and chunked scans
//! - **Configuration** ([`config`]) - Scan and formatting knobs
//! - **Error handling** ([`error`]) - Typed errors and result types
//!
//! # Example
//!
//! ```ignore
//! use basedao::{dao::{Dao, SelectQuery}, page::PageRequest, query::Filter};
//!
//! let dao = Dao::new(backend);
//! let page = dao
//!     .select(
//!         "orders",
//!         SelectQuery::new()
//!             .filter(Filter::eq("status", "paid"))
//!             .page(PageRequest::new(1, 20).with_total()),
//!     )
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as basedao_core;

pub mod backend;
pub mod config;
pub mod dao;
pub mod error;
pub mod join;
pub mod page;
pub mod pipeline;
pub mod query;

mod aggregate;
mod crud;
mod scan;
