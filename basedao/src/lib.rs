//! Main basedao crate providing generic data access over document stores.
//!
//! This crate is the primary entry point for users of basedao. It re-exports the core types
//! from the sub-crates and provides access to the storage backends.
//!
//! # Features
//!
//! - **Typed predicates** - Filters, sorts and projections validated before they reach the store
//! - **CRUD and aggregates** - Timestamped inserts, guarded deletes and updates, sum/avg/max/min/count
//! - **Pagination** - Page envelopes with totals, and chunked scans for large pages
//! - **Joins** - Page-then-join reads across collections with post-join filtering
//! - **Multiple backends** - In-memory and MongoDB, selectable at runtime
//!
//! # Quick Start
//!
//! ```ignore
//! use basedao::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> DaoResult<()> {
//!     let dao = Dao::new(InMemoryStore::builder().build().await?);
//!
//!     dao.adds("orders", vec![doc! { "amount": 10 }, doc! { "amount": 32 }], false).await?;
//!
//!     let page = dao
//!         .select(
//!             "orders",
//!             SelectQuery::new()
//!                 .filter(Filter::gte("amount", 20))
//!                 .page(PageRequest::new(1, 10).with_total()),
//!         )
//!         .await?;
//!     println!("{} of {} rows", page.rows.len(), page.total);
//!
//!     dao.shutdown().await
//! }
//! ```
//!
//! # Runtime Backend Selection
//!
//! [`open`] picks a backend from a connection string and returns a DAO over a boxed
//! [`DynStoreBackend`](backend::DynStoreBackend):
//!
//! ```ignore
//! let dao = basedao::open("memory:", "shop", DaoConfig::default()).await?;
//! let dao = basedao::open("mongodb://127.0.0.1:27017", "shop", DaoConfig::from_env()?).await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - `mongodb` - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use basedao_core::{backend, config, dao, error, join, page, pipeline, query};

// Re-export BSON types for convenience
pub use bson;

use basedao_core::{
    backend::{DynStoreBackend, StoreBackendBuilder},
    config::DaoConfig,
    dao::Dao,
    error::{DaoError, DaoResult},
};

/// In-memory storage backend implementations.
pub mod memory {
    pub use basedao_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use basedao_mongodb::{MongoConfig, MongoDbStore, MongoDbStoreBuilder};
}

/// Opens a DAO over the backend named by `dsn`.
///
/// `memory:` selects a fresh in-memory store. `mongodb://` and `mongodb+srv://` connection
/// strings select MongoDB, using `database`, when the `mongodb` feature is enabled; pool,
/// timeout and retry tuning then come from the environment (see `MongoConfig::from_env`).
pub async fn open(
    dsn: &str,
    database: &str,
    config: DaoConfig,
) -> DaoResult<Dao<Box<dyn DynStoreBackend>>> {
    let config = config.validated()?;

    let scheme = dsn.split_once(':').map(|(scheme, _)| scheme);
    let backend: Box<dyn DynStoreBackend> = match scheme {
        Some("memory") => Box::new(memory::InMemoryStore::builder().build().await?),
        Some("mongodb" | "mongodb+srv") => open_mongodb(dsn, database).await?,
        _ => {
            return Err(DaoError::Configuration(format!("unsupported connection string '{dsn}'")));
        }
    };

    tracing::info!(scheme = ?scheme, database, "opened data access backend");
    Ok(Dao::with_config(backend, config))
}

/// Connects to `dsn`, taking client tuning from the `MONGODB_*` environment variables.
#[cfg(feature = "mongodb")]
async fn open_mongodb(dsn: &str, database: &str) -> DaoResult<Box<dyn DynStoreBackend>> {
    let config = mongodb::MongoConfig {
        uri: dsn.to_string(),
        database: database.to_string(),
        ..mongodb::MongoConfig::from_env()?
    };

    Ok(Box::new(mongodb::MongoDbStoreBuilder::from_config(config).build().await?))
}

#[cfg(not(feature = "mongodb"))]
async fn open_mongodb(dsn: &str, _database: &str) -> DaoResult<Box<dyn DynStoreBackend>> {
    Err(DaoError::Configuration(format!(
        "'{dsn}' needs the mongodb feature, which this build does not enable"
    )))
}
