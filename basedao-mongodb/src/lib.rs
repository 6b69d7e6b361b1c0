//! MongoDB backend implementation for basedao.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait. Predicates,
//! sorts, projections and pipelines are rendered into MongoDB's native syntax and executed by
//! the server.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! basedao = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! The connection string and database come from the builder or from a [`MongoConfig`],
//! which also carries pool and timeout tuning. [`MongoConfig::from_env`] reads
//! `MONGODB_URI`, `MONGODB_DB_NAME` and the `MONGODB_*` tuning variables.
//!
//! # Example
//!
//! ```ignore
//! use basedao::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as basedao_mongodb;

pub mod config;
pub mod query;
pub mod store;

pub use config::MongoConfig;
pub use store::{MongoDbStore, MongoDbStoreBuilder};
