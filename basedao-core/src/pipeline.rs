//! Aggregation pipeline descriptors.
//!
//! The DAO assembles [`Pipeline`]s for aggregates and joins; backends either translate them
//! into native pipeline documents or execute them directly.

use bson::Document;

use crate::query::{Expr, Projection, SortSpec};

/// An accumulator computed over all input rows of a [`Group`] stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
    /// Number of input rows.
    Count,
}

/// A grouping stage with a null key: every input row lands in one synthetic output row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub accumulators: Vec<(String, Accumulator)>,
}

impl Group {
    pub fn new() -> Self {
        Group::default()
    }

    /// Adds an output field computed by `accumulator`.
    pub fn with(mut self, name: impl Into<String>, accumulator: Accumulator) -> Self {
        self.accumulators.push((name.into(), accumulator));
        self
    }
}

/// A correlated sub-query against another collection.
///
/// For each input row, rows of `from` whose `foreign_field` equals the row's `local_field`
/// are run through `pipeline` and attached as an array under `alias`.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub from: String,
    pub local_field: String,
    pub foreign_field: String,
    pub alias: String,
    pub pipeline: Vec<Stage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Expr),
    Sort(SortSpec),
    Skip(usize),
    Limit(usize),
    Project(Projection),
    Lookup(Lookup),
    Group(Group),
    /// Replaces the input with a single `{ <name>: <row count> }` row, or nothing when
    /// there were no input rows.
    Count(String),
    /// A stage in the store's native syntax, passed through untouched. Only backends that
    /// speak that syntax accept it.
    Raw(Document),
}

/// An ordered list of stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline::default()
    }

    pub fn push(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Adds a match stage unless the expression is empty.
    pub fn filter(self, expr: Option<&Expr>) -> Self {
        match expr.filter(|e| !e.is_empty()) {
            Some(expr) => self.push(Stage::Match(expr.clone())),
            None => self,
        }
    }

    /// Adds a sort stage unless `sort` is empty.
    pub fn sort(self, sort: &SortSpec) -> Self {
        if sort.is_empty() {
            self
        } else {
            self.push(Stage::Sort(sort.clone()))
        }
    }

    /// Adds a projection stage unless the projection is empty.
    pub fn project(self, projection: &Projection) -> Self {
        if projection.is_empty() {
            self
        } else {
            self.push(Stage::Project(projection.clone()))
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn into_stages(self) -> Vec<Stage> {
        self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }
}

impl From<Vec<Stage>> for Pipeline {
    fn from(stages: Vec<Stage>) -> Self {
        Pipeline { stages }
    }
}

impl FromIterator<Stage> for Pipeline {
    fn from_iter<I: IntoIterator<Item = Stage>>(iter: I) -> Self {
        Pipeline { stages: iter.into_iter().collect() }
    }
}
