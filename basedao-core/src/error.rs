//! Error types and result types for DAO operations.
//!
//! Every public [`Dao`](crate::dao::Dao) operation returns [`DaoResult<T>`]. Failures are
//! logged at the operation boundary and surfaced as a [`DaoError`] instead of a magic
//! sentinel value, so handlers can branch on [`DaoError::kind`].

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::backend::BulkWriteResult;

/// Broad classification of a [`DaoError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request was rejected before any store call was issued.
    Validation,
    /// The store (or its configuration) failed while serving the request.
    Store,
}

/// Represents all possible errors that can occur when calling the DAO.
#[derive(Error, Debug)]
pub enum DaoError {
    /// A destructive or single-row operation was given an empty predicate.
    /// The argument is the operation name.
    #[error("{0} requires a non-empty where condition")]
    EmptyPredicate(&'static str),
    /// A descriptor failed validation at the API boundary.
    #[error("Validation error: {0}")]
    Validation(String),
    /// A pipeline stage could not be built or executed.
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during backend initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A configuration value could not be read or parsed.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A document with the given identity already exists in the collection.
    /// The first argument is the identity, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DuplicateKey(String, String),
    /// Some entries of an unordered bulk write failed. `result` counts the entries that
    /// were applied; they are not rolled back.
    #[error("bulk write to {collection} failed for {} of its entries: {}", .errors.len(), .errors.join("; "))]
    PartialBulkWrite {
        collection: String,
        result: BulkWriteResult,
        errors: Vec<String>,
    },
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DaoError {
    /// Returns whether this error was raised before touching the store.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DaoError::EmptyPredicate(_) | DaoError::Validation(_) | DaoError::InvalidPipeline(_) => {
                ErrorKind::Validation
            }
            DaoError::Serialization(_)
            | DaoError::Initialization(_)
            | DaoError::Configuration(_)
            | DaoError::DuplicateKey(_, _)
            | DaoError::PartialBulkWrite { .. }
            | DaoError::Backend(_) => ErrorKind::Store,
        }
    }
}

/// A specialized `Result` type for DAO operations.
pub type DaoResult<T> = Result<T, DaoError>;

impl From<BsonError> for DaoError {
    fn from(err: BsonError) -> Self {
        DaoError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DaoError {
    fn from(err: SerdeJsonError) -> Self {
        DaoError::Serialization(err.to_string())
    }
}
