use std::fmt::Write;

use bson::{Bson, Document};
use chrono::Local;
use tracing::debug;

use crate::{
    backend::{BulkWriteResult, StoreBackend, WriteModel},
    dao::{Dao, log_failure},
    error::{DaoError, DaoResult},
    query::{Expr, Filter, validate_field_name},
};

pub(crate) const ADD_TIME: &str = "_add_time";
pub(crate) const ADD_TIME_STR: &str = "_add_time_str";

/// The pair of insertion timestamps shared by one write.
#[derive(Debug, Clone)]
struct Stamp {
    millis: i64,
    formatted: String,
}

impl Stamp {
    fn now(time_format: &str) -> DaoResult<Self> {
        let now = Local::now();
        let mut formatted = String::new();
        write!(formatted, "{}", now.format(time_format)).map_err(|_| {
            DaoError::Configuration(format!("invalid time format '{time_format}'"))
        })?;

        Ok(Stamp { millis: now.timestamp_millis(), formatted })
    }

    /// Stamps `document` unless it already carries an insertion time.
    fn apply(&self, document: &mut Document) {
        if document.contains_key(ADD_TIME) {
            return;
        }
        document.insert(ADD_TIME, Bson::Int64(self.millis));
        document.insert(ADD_TIME_STR, self.formatted.clone());
    }
}

/// The string form of a caller-supplied identity.
fn normalize_id(id: Bson) -> Bson {
    match id {
        Bson::String(_) => id,
        Bson::ObjectId(oid) => Bson::String(oid.to_hex()),
        Bson::Int32(n) => Bson::String(n.to_string()),
        Bson::Int64(n) => Bson::String(n.to_string()),
        Bson::Double(n) if n.fract() == 0.0 && n.is_finite() => Bson::String(format!("{n:.0}")),
        other => Bson::String(other.to_string()),
    }
}

impl<B: StoreBackend> Dao<B> {
    /// Inserts one document and returns its identity.
    ///
    /// The document gains `_add_time` (epoch milliseconds) and `_add_time_str` (local time
    /// in the configured format) unless `suppress_timestamp` is set or it already has an
    /// `_add_time`.
    pub async fn add(
        &self,
        collection: &str,
        mut document: Document,
        suppress_timestamp: bool,
    ) -> DaoResult<Bson> {
        async {
            if !suppress_timestamp {
                Stamp::now(&self.config.time_format)?.apply(&mut document);
            }

            self.backend.insert_one(collection, document).await
        }
        .await
        .inspect_err(|e| log_failure("add", collection, e))
    }

    /// Inserts a batch without ordering guarantees and returns how many were written.
    ///
    /// All documents of the batch share one timestamp pair. Supplied `_id`s are stored in
    /// their string form.
    pub async fn adds(
        &self,
        collection: &str,
        documents: Vec<Document>,
        suppress_timestamp: bool,
    ) -> DaoResult<u64> {
        if documents.is_empty() {
            return Ok(0);
        }

        async {
            let stamp = match suppress_timestamp {
                true => None,
                false => Some(Stamp::now(&self.config.time_format)?),
            };

            let documents = documents
                .into_iter()
                .map(|mut document| {
                    if let Some(id) = document.remove("_id") {
                        document.insert("_id", normalize_id(id));
                    }
                    if let Some(stamp) = &stamp {
                        stamp.apply(&mut document);
                    }
                    document
                })
                .collect();

            self.backend.insert_many(collection, documents).await
        }
        .await
        .inspect_err(|e| log_failure("adds", collection, e))
    }

    /// Deletes every document matching `filter`. An empty filter is rejected.
    pub async fn del(&self, collection: &str, filter: Expr) -> DaoResult<u64> {
        async {
            let filter = self.require_predicate("del", collection, filter)?;
            self.backend.delete_many(collection, &filter).await
        }
        .await
        .inspect_err(|e| log_failure("del", collection, e))
    }

    /// Sets the fields of `patch` on every document matching `filter` and returns how many
    /// changed. An empty filter or an empty patch is rejected.
    pub async fn update(&self, collection: &str, filter: Expr, patch: Document) -> DaoResult<u64> {
        async {
            let filter = self.require_predicate("update", collection, filter)?;
            validate_patch(&patch)?;

            self.backend.update_many(collection, &filter, patch).await
        }
        .await
        .inspect_err(|e| log_failure("update", collection, e))
    }

    /// Upserts documents keyed by `match_field` in one unordered bulk write.
    ///
    /// Each document becomes an update of the first row whose `match_field` equals the
    /// document's, with `_id` stripped from the patch. Entries that succeed are kept even
    /// when others fail; the [`DaoError::PartialBulkWrite`] then carries their counts.
    pub async fn update_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        match_field: &str,
        upsert: bool,
    ) -> DaoResult<BulkWriteResult> {
        async {
            validate_field_name(match_field)?;

            let models = documents
                .into_iter()
                .enumerate()
                .map(|(index, mut document)| {
                    let key = document.get(match_field).cloned().ok_or_else(|| {
                        DaoError::Validation(format!(
                            "document {index} has no '{match_field}' to match on"
                        ))
                    })?;
                    document.remove("_id");
                    validate_patch(&document)?;

                    Ok(WriteModel::UpdateOne {
                        filter: Filter::eq(match_field, key),
                        update: document,
                        upsert,
                    })
                })
                .collect::<DaoResult<Vec<_>>>()?;

            if models.is_empty() {
                return Ok(BulkWriteResult::default());
            }

            debug!(collection, entries = models.len(), upsert, "bulk update");
            self.backend.bulk_write(collection, models).await
        }
        .await
        .inspect_err(|e| log_failure("update_many", collection, e))
    }
}

fn validate_patch(patch: &Document) -> DaoResult<()> {
    if patch.is_empty() {
        return Err(DaoError::Validation("update patch must not be empty".into()));
    }

    patch.keys().try_for_each(|key| validate_field_name(key))
}
