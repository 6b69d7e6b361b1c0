//! Declarative query descriptors: predicates, sort specifications and projections.
//!
//! These types are the typed replacement for untyped "where/sort/field" JSON objects.
//! Backends render them into their native form through a [`QueryVisitor`].
//!
//! # Query Building
//!
//! ```ignore
//! use basedao::query::{FindQuery, Filter, SortSpec, Projection};
//!
//! let query = FindQuery::builder()
//!     .filter(Filter::eq("status", "paid").and(Filter::gte("amount", 100)))
//!     .sort(SortSpec::new().desc("_add_time"))
//!     .projection(Projection::new().exclude("password"))
//!     .limit(10)
//!     .build();
//! ```
//!
//! # Filter Expression API
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - String: `starts_with`, `ends_with`, `contains`, `not_contains`
//! - Existence: `exists`, `not_exists`
//! - Array: `any_of`, `none_of`
//! - Logical: `and`, `or`
//!
//! Field names may be dotted paths (`"vipInfo.level"`), which is how post-join filters
//! reach into joined rows.

use std::str::FromStr;

use bson::Bson;

use crate::error::{DaoError, DaoResult};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    /// The numeric form used by document stores (`1` / `-1`).
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

impl FromStr for SortDirection {
    type Err = DaoError;

    /// Parses `"asc"` or `"desc"`. An empty string means ascending.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(DaoError::Validation(format!("unknown sort direction '{other}'"))),
        }
    }
}

/// A single sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// An ordered list of sort keys. The first entry is the primary key, later entries break ties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortSpec(Vec<Sort>);

impl SortSpec {
    pub fn new() -> Self {
        SortSpec(Vec::new())
    }

    /// Appends a key with the given direction.
    pub fn by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.0.push(Sort { field: field.into(), direction });
        self
    }

    pub fn asc(self, field: impl Into<String>) -> Self {
        self.by(field, SortDirection::Asc)
    }

    pub fn desc(self, field: impl Into<String>) -> Self {
        self.by(field, SortDirection::Desc)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sort> {
        self.0.iter()
    }

    /// Builds a sort specification from `(field, "asc" | "desc")` pairs.
    pub fn parse<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> DaoResult<Self> {
        pairs
            .into_iter()
            .try_fold(SortSpec::new(), |spec, (field, direction)| {
                Ok(spec.by(field, direction.parse()?))
            })
    }
}

/// Field-level include/exclude flags, passed to the store as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection(Vec<(String, bool)>);

impl Projection {
    pub fn new() -> Self {
        Projection(Vec::new())
    }

    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.0.push((field.into(), true));
        self
    }

    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.0.push((field.into(), false));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates `(field, included)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(field, include)| (field.as_str(), *include))
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// String contains (case-insensitive) or array contains all values.
    Contains,
    /// Negation of `Contains`.
    NotContains,
    /// String starts with value (case-insensitive).
    StartsWith,
    /// String ends with value (case-insensitive).
    EndsWith,
    /// Field equals any of the values.
    AnyOf,
    /// Field equals none of the values.
    NoneOf,
}

/// A predicate over documents.
///
/// `Expr::default()` is the empty predicate: an `And` with no children, which constrains
/// nothing. The DAO rejects it for destructive operations.
///
/// # Example
///
/// ```ignore
/// use basedao::query::Filter;
///
/// let expr = Filter::and(vec![
///     Filter::eq("status", "active"),
///     Filter::gt("age", 18),
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field name (or dotted path) to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Default for Expr {
    fn default() -> Self {
        Expr::And(Vec::new())
    }
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// The predicate aggregates use in place of an empty one. Every stored document has an
    /// identity, and none has this one.
    pub fn match_all() -> Self {
        Filter::ne("_id", "___")
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Returns true when the expression constrains nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Expr::And(list) | Expr::Or(list) => list.iter().all(Expr::is_empty),
            _ => false,
        }
    }

    /// Maps an optional predicate to `None` when it constrains nothing.
    pub fn non_empty(expr: Option<Expr>) -> Option<Expr> {
        expr.filter(|e| !e.is_empty())
    }

    /// Checks field names and operator/value compatibility.
    pub fn validate(&self) -> DaoResult<()> {
        match self {
            Expr::And(list) | Expr::Or(list) => list.iter().try_for_each(Expr::validate),
            Expr::Not(inner) => inner.validate(),
            Expr::Exists(field, _) => validate_field_name(field),
            Expr::Field { field, op, value } => {
                validate_field_name(field)?;

                let compatible = match op {
                    FieldOp::AnyOf | FieldOp::NoneOf => matches!(value, Bson::Array(_)),
                    FieldOp::StartsWith | FieldOp::EndsWith => matches!(value, Bson::String(_)),
                    FieldOp::Contains | FieldOp::NotContains => {
                        matches!(value, Bson::String(_) | Bson::Array(_))
                    }
                    _ => true,
                };

                if compatible {
                    Ok(())
                } else {
                    Err(DaoError::Validation(format!(
                        "operator {op:?} on '{field}' does not accept value {value}"
                    )))
                }
            }
        }
    }
}

pub(crate) fn validate_field_name(field: &str) -> DaoResult<()> {
    if field.is_empty() {
        return Err(DaoError::Validation("field name must not be empty".into()));
    }
    if field.starts_with('$') {
        return Err(DaoError::Validation(format!("field name '{field}' must not start with '$'")));
    }

    Ok(())
}

/// Helper struct for constructing filter expressions.
///
/// All methods accept field names and values as `Into<String>` and `Into<Bson>`.
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the string field starts with the value.
    pub fn starts_with(field: impl Into<String>, value: impl Into<String>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, Bson::String(value.into()))
    }

    /// Matches documents where the string field ends with the value.
    pub fn ends_with(field: impl Into<String>, value: impl Into<String>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, Bson::String(value.into()))
    }

    /// Matches documents where the field (string or array) contains the value.
    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    pub fn not_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Matches documents where the field equals any of the values.
    pub fn any_of<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::AnyOf,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches documents where the field equals none of the values.
    pub fn none_of<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::NoneOf,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }
}

/// A single find against one collection: the store-side half of `select`.
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    /// Optional filter; `None` matches everything.
    pub filter: Option<Expr>,
    pub sort: SortSpec,
    pub projection: Projection,
    /// Number of documents to skip.
    pub skip: Option<usize>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
}

impl FindQuery {
    pub fn new() -> Self {
        FindQuery::default()
    }

    pub fn builder() -> FindQueryBuilder {
        FindQueryBuilder::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindQueryBuilder {
    query: FindQuery,
}

impl FindQueryBuilder {
    pub fn new() -> Self {
        FindQueryBuilder { query: FindQuery::default() }
    }

    /// Sets the filter. An empty expression leaves the query unconstrained.
    pub fn filter(mut self, filter: impl Into<Option<Expr>>) -> Self {
        self.query.filter = Expr::non_empty(filter.into());
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.query.sort = sort;
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.query.projection = projection;
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.query.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn build(self) -> FindQuery {
        self.query
    }
}

/// Renders an [`Expr`] into a backend-specific form.
pub trait QueryVisitor {
    type Output;
    type Error: Into<DaoError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}
