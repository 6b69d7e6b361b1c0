//! Query expression evaluation for in-memory document filtering.
//!
//! This module provides the evaluation engine for query expressions, path resolution for
//! dotted field names, and the cross-type ordering used by sorts and aggregates.

use std::cmp::Ordering;

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use basedao_core::{
    error::DaoError,
    query::{Expr, FieldOp, QueryVisitor, SortDirection, SortSpec},
};

/// Comparable view of a BSON value.
///
/// Values of different kinds order by a fixed type rank (null, numbers, strings, documents,
/// arrays, object ids, booleans, dates, everything else). Numbers of any width compare by
/// value. Range operators only compare values of the same rank; sorting uses the full order.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Comparable<'a> {
    Null,
    Number(f64),
    String(&'a str),
    Document(&'a Document),
    Array(&'a [Bson]),
    ObjectId(ObjectId),
    Bool(bool),
    DateTime(DateTime),
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::Decimal128(value) => {
                Comparable::Number(value.to_string().parse().unwrap_or(f64::NAN))
            }
            Bson::String(value) | Bson::Symbol(value) => Comparable::String(value),
            Bson::Document(doc) => Comparable::Document(doc),
            Bson::Array(items) => Comparable::Array(items),
            Bson::ObjectId(oid) => Comparable::ObjectId(*oid),
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            other => Comparable::Other(other),
        }
    }
}

impl Comparable<'_> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Document(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
            Comparable::Other(_) => 8,
        }
    }

    /// Total order across all values.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Ordering::Equal,
            (Comparable::Number(a), Comparable::Number(b)) => a.total_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (Comparable::Document(a), Comparable::Document(b)) => a
                .iter()
                .zip(b.iter())
                .map(|((ka, va), (kb, vb))| {
                    ka.cmp(kb)
                        .then_with(|| Comparable::from(va).total_cmp(&Comparable::from(vb)))
                })
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Comparable::Array(a), Comparable::Array(b)) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| Comparable::from(x).total_cmp(&Comparable::from(y)))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().cmp(&b.bytes()),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.cmp(b),
            (Comparable::Other(a), Comparable::Other(b)) => a.to_string().cmp(&b.to_string()),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        (self.rank() == other.rank()).then(|| self.total_cmp(other))
    }
}

/// Every value reachable through a dotted `path`.
///
/// Arrays along the path fan out: a segment is applied to each element that is a
/// document, and a numeric segment also indexes into the array.
pub(crate) fn values_at<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut found = Vec::new();

    if let Some(value) = document.get(segments[0]) {
        descend(value, &segments[1..], &mut found);
    }

    found
}

fn descend<'a>(value: &'a Bson, rest: &[&str], found: &mut Vec<&'a Bson>) {
    let Some((segment, tail)) = rest.split_first() else {
        found.push(value);
        return;
    };

    match value {
        Bson::Document(doc) => {
            if let Some(next) = doc.get(*segment) {
                descend(next, tail, found);
            }
        }
        Bson::Array(items) => {
            if let Some(next) = segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                descend(next, tail, found);
            }
            for item in items.iter().filter(|item| matches!(item, Bson::Document(_))) {
                descend(item, rest, found);
            }
        }
        _ => {}
    }
}

/// The value a sort uses for `path`: the first one found, or null.
pub(crate) fn sort_key<'a>(document: &'a Document, path: &str) -> Comparable<'a> {
    values_at(document, path)
        .first()
        .map(|value| Comparable::from(*value))
        .unwrap_or(Comparable::Null)
}

/// Stable multi-key sort.
pub(crate) fn sort_documents(documents: &mut [Document], spec: &SortSpec) {
    if spec.is_empty() {
        return;
    }

    documents.sort_by(|a, b| {
        spec.iter()
            .map(|sort| {
                let ordering = sort_key(a, &sort.field).total_cmp(&sort_key(b, &sort.field));
                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

/// Field values a predicate is tested against: each resolved value, plus the elements of
/// any array among them.
fn candidates<'a>(resolved: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut out = Vec::with_capacity(resolved.len());

    for value in resolved {
        out.push(*value);
        if let Bson::Array(items) = value {
            out.extend(items.iter());
        }
    }

    out
}

fn lowercase(value: &Bson) -> Option<String> {
    match value {
        Bson::String(s) => Some(s.to_lowercase()),
        _ => None,
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> Result<bool, DaoError> {
        self.visit_expr(expr)
    }

    pub fn matches(document: &Document, expr: Option<&Expr>) -> Result<bool, DaoError> {
        match expr {
            Some(expr) => DocumentEvaluator::new(document).evaluate(expr),
            None => Ok(true),
        }
    }

    fn equals_any(resolved: &[&Bson], value: &Bson) -> bool {
        if resolved.is_empty() {
            return matches!(value, Bson::Null);
        }

        let target = Comparable::from(value);
        candidates(resolved)
            .into_iter()
            .any(|candidate| Comparable::from(candidate) == target)
    }

    fn compare_any(resolved: &[&Bson], value: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
        let target = Comparable::from(value);
        candidates(resolved).into_iter().any(|candidate| {
            Comparable::from(candidate)
                .partial_cmp(&target)
                .is_some_and(&accept)
        })
    }

    fn string_any(resolved: &[&Bson], value: &Bson, test: impl Fn(&str, &str) -> bool) -> bool {
        let Some(needle) = lowercase(value) else {
            return false;
        };

        candidates(resolved)
            .into_iter()
            .filter_map(lowercase)
            .any(|haystack| test(&haystack, &needle))
    }

    fn contains(resolved: &[&Bson], value: &Bson) -> bool {
        match value {
            Bson::Array(required) => required
                .iter()
                .all(|item| DocumentEvaluator::equals_any(resolved, item)),
            _ => DocumentEvaluator::string_any(resolved, value, |h, n| h.contains(n)),
        }
    }

    fn any_of(resolved: &[&Bson], value: &Bson) -> bool {
        match value {
            Bson::Array(options) => options
                .iter()
                .any(|option| DocumentEvaluator::equals_any(resolved, option)),
            single => DocumentEvaluator::equals_any(resolved, single),
        }
    }
}

impl QueryVisitor for DocumentEvaluator<'_> {
    type Output = bool;
    type Error = DaoError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        let mut constrained = exprs.iter().filter(|expr| !expr.is_empty()).peekable();
        if constrained.peek().is_none() {
            return Ok(true);
        }

        for expr in constrained {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(!values_at(self.document, field).is_empty() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let resolved = values_at(self.document, field);

        Ok(match op {
            FieldOp::Eq => DocumentEvaluator::equals_any(&resolved, value),
            FieldOp::Ne => !DocumentEvaluator::equals_any(&resolved, value),
            FieldOp::Gt => DocumentEvaluator::compare_any(&resolved, value, Ordering::is_gt),
            FieldOp::Gte => DocumentEvaluator::compare_any(&resolved, value, Ordering::is_ge),
            FieldOp::Lt => DocumentEvaluator::compare_any(&resolved, value, Ordering::is_lt),
            FieldOp::Lte => DocumentEvaluator::compare_any(&resolved, value, Ordering::is_le),
            FieldOp::Contains => DocumentEvaluator::contains(&resolved, value),
            FieldOp::NotContains => !DocumentEvaluator::contains(&resolved, value),
            FieldOp::StartsWith => {
                DocumentEvaluator::string_any(&resolved, value, |h, n| h.starts_with(n))
            }
            FieldOp::EndsWith => {
                DocumentEvaluator::string_any(&resolved, value, |h, n| h.ends_with(n))
            }
            FieldOp::AnyOf => DocumentEvaluator::any_of(&resolved, value),
            FieldOp::NoneOf => !DocumentEvaluator::any_of(&resolved, value),
        })
    }
}
