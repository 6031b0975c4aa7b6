//! Declarative query engine over the analytical store
//!
//! Catalogs describe the closed schema; builders compile field/measure/
//! filter values into `{sql, params}` pairs. Compilation is pure: tests run
//! value-in, string-out with no database.

pub mod aggregate;
pub mod catalog;
pub mod filters;
pub mod select;

pub use aggregate::{AggregateQueryBuilder, MeasureSpec};
pub use catalog::{Aggregation, Catalog, FieldDef, FieldKind, FieldLevel, MeasureLevel, ViewKind};
pub use filters::{Filter, QueryParam, SqlParams};
pub use select::SelectQueryBuilder;

use thiserror::Error;

/// Build-time validation failures; raised before any SQL executes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryBuildError {
    #[error("Unknown field: {0}")]
    UnknownField(String),
    #[error("Unknown measure: {0}")]
    UnknownMeasure(String),
    #[error("{0} is a measure and cannot be selected as a field")]
    MeasureAsField(String),
    #[error("Aggregation {agg} is not allowed for measure {measure}")]
    AggregationNotAllowed { measure: String, agg: String },
    #[error("Field {0} is not groupable")]
    NotGroupable(String),
    #[error("Unknown filter column: {0}")]
    UnknownFilterColumn(String),
    #[error("Unknown order column: {0}")]
    UnknownOrderColumn(String),
    #[error("Duplicate output column: {0}")]
    DuplicateColumn(String),
    #[error("At least one measure is required")]
    NoMeasures,
    #[error("At least one field is required")]
    NoFields,
}

/// A compiled query: SQL with `?` placeholders plus bound values in order.
#[derive(Debug)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: SqlParams,
}

/// Sort direction for compiled queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}
