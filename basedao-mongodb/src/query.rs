//! Translation from basedao descriptors to MongoDB query syntax.
//!
//! This module renders predicates, sort specifications, projections and pipeline stages into
//! the BSON documents the MongoDB driver expects.

use bson::{Bson, Document, doc};

use basedao_core::{
    error::{DaoError, DaoResult},
    pipeline::{Accumulator, Group, Lookup, Pipeline, Stage},
    query::{Expr, FieldOp, Projection, QueryVisitor, SortSpec},
};

/// Name of the `let` variable carrying the local key into a lookup sub-pipeline.
const LOCAL_VALUE: &str = "local_value";

/// Translates basedao query expressions into MongoDB query documents.
///
/// Empty `And`/`Or` groups are dropped; an expression that constrains nothing renders as
/// `{}`. String operators become case-insensitive regular expressions with the needle
/// escaped.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    fn visit_group(&mut self, operator: &str, exprs: &[Expr]) -> DaoResult<Document> {
        let mut rendered = exprs
            .iter()
            .filter(|expr| !expr.is_empty())
            .map(|expr| self.visit_expr(expr))
            .collect::<DaoResult<Vec<_>>>()?;

        Ok(match rendered.len() {
            0 => Document::new(),
            1 => rendered.remove(0),
            _ => doc! { operator: rendered },
        })
    }
}

fn case_insensitive(pattern: String) -> Document {
    doc! { "$regex": pattern, "$options": "i" }
}

fn expect_string<'a>(op: &FieldOp, value: &'a Bson) -> DaoResult<&'a str> {
    match value {
        Bson::String(s) => Ok(s),
        other => Err(DaoError::Validation(format!("{op:?} requires a string value, got {other}"))),
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DaoError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        self.visit_group("$and", exprs)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        self.visit_group("$or", exprs)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => match value {
                    Bson::Array(arr) => doc! { "$all": arr },
                    _ => case_insensitive(regex::escape(expect_string(op, value)?)),
                },
                FieldOp::NotContains => match value {
                    Bson::Array(arr) => doc! { "$not": { "$all": arr } },
                    _ => doc! { "$not": case_insensitive(regex::escape(expect_string(op, value)?)) },
                },
                FieldOp::StartsWith => case_insensitive(format!("^{}", regex::escape(expect_string(op, value)?))),
                FieldOp::EndsWith => case_insensitive(format!("{}$", regex::escape(expect_string(op, value)?))),
                FieldOp::AnyOf => doc! { "$in": value },
                FieldOp::NoneOf => doc! { "$nin": value },
            }
        })
    }
}

/// Renders an optional predicate; `None` and empty expressions become `{}`.
pub fn render_filter(filter: Option<&Expr>) -> DaoResult<Document> {
    match filter {
        Some(expr) => MongoQueryTranslator.visit_expr(expr),
        None => Ok(Document::new()),
    }
}

pub fn render_sort(sort: &SortSpec) -> Document {
    sort.iter()
        .map(|key| (key.field.clone(), Bson::Int32(key.direction.as_i32())))
        .collect()
}

pub fn render_projection(projection: &Projection) -> Document {
    projection
        .iter()
        .map(|(field, include)| (field.to_string(), Bson::Int32(include as i32)))
        .collect()
}

fn render_group(group: &Group) -> Document {
    let mut rendered = doc! { "_id": Bson::Null };

    for (name, accumulator) in &group.accumulators {
        let expr = match accumulator {
            Accumulator::Sum(field) => doc! { "$sum": format!("${field}") },
            Accumulator::Avg(field) => doc! { "$avg": format!("${field}") },
            Accumulator::Min(field) => doc! { "$min": format!("${field}") },
            Accumulator::Max(field) => doc! { "$max": format!("${field}") },
            Accumulator::Count => doc! { "$sum": 1 },
        };
        rendered.insert(name.clone(), expr);
    }

    rendered
}

/// Correlates on `foreign_field == $$local_value` ahead of the lookup's own stages.
fn render_lookup(lookup: &Lookup) -> DaoResult<Document> {
    let correlate = doc! {
        "$match": {
            "$expr": {
                "$eq": [format!("${}", lookup.foreign_field), format!("$${LOCAL_VALUE}")],
            },
        },
    };

    let pipeline = std::iter::once(Ok(correlate))
        .chain(lookup.pipeline.iter().map(render_stage))
        .collect::<DaoResult<Vec<_>>>()?;

    Ok(doc! {
        "$lookup": {
            "from": lookup.from.as_str(),
            "let": { LOCAL_VALUE: format!("${}", lookup.local_field) },
            "pipeline": pipeline,
            "as": lookup.alias.as_str(),
        },
    })
}

pub fn render_stage(stage: &Stage) -> DaoResult<Document> {
    Ok(match stage {
        Stage::Match(expr) => doc! { "$match": render_filter(Some(expr))? },
        Stage::Sort(sort) => doc! { "$sort": render_sort(sort) },
        Stage::Skip(n) => doc! { "$skip": *n as i64 },
        Stage::Limit(n) => doc! { "$limit": *n as i64 },
        Stage::Project(projection) => doc! { "$project": render_projection(projection) },
        Stage::Lookup(lookup) => render_lookup(lookup)?,
        Stage::Group(group) => doc! { "$group": render_group(group) },
        Stage::Count(name) => doc! { "$count": name.as_str() },
        Stage::Raw(raw) => raw.clone(),
    })
}

pub fn render_pipeline(pipeline: &Pipeline) -> DaoResult<Vec<Document>> {
    pipeline.stages().iter().map(render_stage).collect()
}
