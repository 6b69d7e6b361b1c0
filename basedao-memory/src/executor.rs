//! Pipeline execution over in-memory collections.

use std::collections::HashMap;

use bson::{Bson, Document};

use basedao_core::{
    error::{DaoError, DaoResult},
    pipeline::{Accumulator, Group, Lookup, Stage},
};

use crate::{
    evaluator::{Comparable, DocumentEvaluator, sort_documents, values_at},
    projection::project,
};

pub(crate) type StoreMap = HashMap<String, Vec<Document>>;

/// Runs `stages` over `documents`. Lookups read their foreign collections from `store`.
pub(crate) fn execute(
    store: &StoreMap,
    mut documents: Vec<Document>,
    stages: &[Stage],
) -> DaoResult<Vec<Document>> {
    for stage in stages {
        documents = match stage {
            Stage::Match(expr) => {
                let mut kept = Vec::with_capacity(documents.len());
                for document in documents {
                    if DocumentEvaluator::new(&document).evaluate(expr)? {
                        kept.push(document);
                    }
                }
                kept
            }
            Stage::Sort(spec) => {
                sort_documents(&mut documents, spec);
                documents
            }
            Stage::Skip(n) => documents.into_iter().skip(*n).collect(),
            Stage::Limit(n) => documents.into_iter().take(*n).collect(),
            Stage::Project(projection) => documents
                .into_iter()
                .map(|document| project(document, projection))
                .collect::<DaoResult<_>>()?,
            Stage::Lookup(lookup) => documents
                .into_iter()
                .map(|document| join(store, document, lookup))
                .collect::<DaoResult<_>>()?,
            Stage::Group(group) => match documents.is_empty() {
                true => documents,
                false => vec![accumulate(&documents, group)],
            },
            Stage::Count(name) => match documents.len() {
                0 => documents,
                n => {
                    let mut row = Document::new();
                    row.insert(name.clone(), count_value(n));
                    vec![row]
                }
            },
            Stage::Raw(raw) => {
                return Err(DaoError::InvalidPipeline(format!(
                    "native stage {raw} is not supported by the in-memory store"
                )));
            }
        };
    }

    Ok(documents)
}

/// Attaches the foreign rows whose key equals this row's local key.
fn join(store: &StoreMap, mut document: Document, lookup: &Lookup) -> DaoResult<Document> {
    let local = values_at(&document, &lookup.local_field)
        .first()
        .map(|value| (*value).clone());

    let matched = match (local, store.get(&lookup.from)) {
        (Some(local), Some(foreign)) => {
            let local = Comparable::from(&local);
            foreign
                .iter()
                .filter(|row| {
                    values_at(row, &lookup.foreign_field)
                        .first()
                        .is_some_and(|value| Comparable::from(*value) == local)
                })
                .cloned()
                .collect()
        }
        _ => Vec::new(),
    };

    let joined = execute(store, matched, &lookup.pipeline)?;
    document.insert(
        lookup.alias.clone(),
        Bson::Array(joined.into_iter().map(Bson::Document).collect()),
    );

    Ok(document)
}

/// Folds every input row into one `{ _id: null, ... }` row.
fn accumulate(documents: &[Document], group: &Group) -> Document {
    let mut row = bson::doc! { "_id": Bson::Null };

    for (name, accumulator) in &group.accumulators {
        let value = match accumulator {
            Accumulator::Count => count_value(documents.len()),
            Accumulator::Sum(field) => sum(numbers(documents, field)),
            Accumulator::Avg(field) => {
                let values: Vec<f64> = numbers(documents, field).map(|(n, _)| n).collect();
                match values.len() {
                    0 => Bson::Null,
                    len => Bson::Double(values.iter().sum::<f64>() / len as f64),
                }
            }
            Accumulator::Min(field) => extreme(documents, field, |a, b| a.total_cmp(b).is_lt()),
            Accumulator::Max(field) => extreme(documents, field, |a, b| a.total_cmp(b).is_gt()),
        };
        row.insert(name.clone(), value);
    }

    row
}

/// A row count, widened to `Int64` once it no longer fits in `Int32`.
fn count_value(n: usize) -> Bson {
    match i32::try_from(n) {
        Ok(n) => Bson::Int32(n),
        Err(_) => Bson::Int64(n as i64),
    }
}

/// Numeric values of `field`, each with whether it was integral.
fn numbers<'a>(
    documents: &'a [Document],
    field: &'a str,
) -> impl Iterator<Item = (f64, bool)> + 'a {
    documents
        .iter()
        .filter_map(move |document| values_at(document, field).first().copied())
        .filter_map(|value| match value {
            Bson::Int32(n) => Some((*n as f64, true)),
            Bson::Int64(n) => Some((*n as f64, true)),
            Bson::Double(n) => Some((*n, false)),
            _ => None,
        })
}

/// Integral inputs sum to an integer; anything else to a double.
fn sum(values: impl Iterator<Item = (f64, bool)>) -> Bson {
    let (total, integral) = values.fold((0.0, true), |(total, integral), (n, is_int)| {
        (total + n, integral && is_int)
    });

    match integral {
        true => Bson::Int64(total as i64),
        false => Bson::Double(total),
    }
}

/// The non-null value of `field` that wins `better` against all others, or null.
fn extreme(
    documents: &[Document],
    field: &str,
    better: impl Fn(&Comparable, &Comparable) -> bool,
) -> Bson {
    documents
        .iter()
        .filter_map(|document| values_at(document, field).first().copied())
        .filter(|value| !matches!(value, Bson::Null))
        .fold(None::<&Bson>, |best, value| match best {
            Some(current) if !better(&Comparable::from(value), &Comparable::from(current)) => {
                Some(current)
            }
            _ => Some(value),
        })
        .cloned()
        .unwrap_or(Bson::Null)
}
