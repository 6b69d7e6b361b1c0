use bson::Bson;
use tracing::debug;

use crate::{
    backend::StoreBackend,
    dao::{Dao, log_failure},
    error::DaoResult,
    pipeline::{Accumulator, Group, Pipeline, Stage},
    query::{Expr, validate_field_name},
};

const VALUE: &str = "value";

/// Numeric view of an accumulator result. Non-numeric results count as zero.
fn as_f64(value: &Bson) -> f64 {
    match value {
        Bson::Double(n) => *n,
        Bson::Int32(n) => *n as f64,
        Bson::Int64(n) => *n as f64,
        Bson::Decimal128(d) => d.to_string().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

impl<B: StoreBackend> Dao<B> {
    /// Counts documents matching `filter`. An empty filter counts the whole collection.
    pub async fn count(&self, collection: &str, filter: Expr) -> DaoResult<u64> {
        async {
            let filter = Expr::non_empty(Some(filter));
            if let Some(filter) = &filter {
                filter.validate()?;
            }

            self.backend.count(collection, filter.as_ref()).await
        }
        .await
        .inspect_err(|e| log_failure("count", collection, e))
    }

    /// Sums `field` over matching documents; `0.0` when nothing matches.
    pub async fn sum(&self, collection: &str, field: &str, filter: Expr) -> DaoResult<f64> {
        let value = self
            .accumulate("sum", collection, filter, Accumulator::Sum(field.to_string()))
            .await?;

        Ok(value.as_ref().map_or(0.0, as_f64))
    }

    /// Averages `field` over matching documents; `0.0` when nothing matches.
    pub async fn avg(&self, collection: &str, field: &str, filter: Expr) -> DaoResult<f64> {
        let value = self
            .accumulate("avg", collection, filter, Accumulator::Avg(field.to_string()))
            .await?;

        Ok(value.as_ref().map_or(0.0, as_f64))
    }

    /// Largest value of `field` among matching documents; `0` when nothing matches.
    pub async fn max(&self, collection: &str, field: &str, filter: Expr) -> DaoResult<Bson> {
        let value = self
            .accumulate("max", collection, filter, Accumulator::Max(field.to_string()))
            .await?;

        Ok(value.unwrap_or(Bson::Int32(0)))
    }

    /// Smallest value of `field` among matching documents; `0` when nothing matches.
    pub async fn min(&self, collection: &str, field: &str, filter: Expr) -> DaoResult<Bson> {
        let value = self
            .accumulate("min", collection, filter, Accumulator::Min(field.to_string()))
            .await?;

        Ok(value.unwrap_or(Bson::Int32(0)))
    }

    /// Runs `accumulator` in a single null-keyed group. `None` when no row matched or the
    /// accumulator produced `null`.
    async fn accumulate(
        &self,
        op: &'static str,
        collection: &str,
        filter: Expr,
        accumulator: Accumulator,
    ) -> DaoResult<Option<Bson>> {
        async {
            if let Accumulator::Sum(field)
            | Accumulator::Avg(field)
            | Accumulator::Min(field)
            | Accumulator::Max(field) = &accumulator
            {
                validate_field_name(field)?;
            }

            // An empty predicate would be rendered as an empty match; swap in one that
            // every stored document satisfies.
            let filter = match filter.is_empty() {
                true => Expr::match_all(),
                false => {
                    filter.validate()?;
                    filter
                }
            };

            let pipeline = Pipeline::new()
                .push(Stage::Match(filter))
                .push(Stage::Group(Group::new().with(VALUE, accumulator)));
            debug!(op, collection, ?pipeline, "aggregate");

            let rows = self.backend.aggregate(collection, &pipeline).await?;

            Ok(rows
                .into_iter()
                .next()
                .and_then(|mut row| row.remove(VALUE))
                .filter(|value| !matches!(value, Bson::Null)))
        }
        .await
        .inspect_err(|e| log_failure(op, collection, e))
    }
}
