//! In-memory document storage backend for basedao.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for development
//! and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Document-database semantics** - Dotted paths, array matching, multi-key sorts and projections
//! - **Pipelines** - Match, sort, window, projection, lookup, group and count stages
//! - **Unordered bulk writes** - Per-entry upserts that keep going past failures
//!
//! # Quick Start
//!
//! ```ignore
//! use basedao::{dao::Dao, memory::InMemoryStore, query::Filter};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let dao = Dao::new(backend);
//!
//!     dao.add("users", doc! { "name": "Alice" }, false).await?;
//!     assert_eq!(dao.count("users", Filter::eq("name", "Alice")).await?, 1);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as basedao_memory;

pub mod evaluator;
pub mod executor;
pub mod projection;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
