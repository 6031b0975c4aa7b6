//! Rollup/aggregate builder
//!
//! Compiles `{measures, dimensions, filters}` into grouped CTEs joined on
//! the dimension columns. Row-level measures aggregate base rows directly;
//! trace-level measures roll up per trace first. Each distinct grouping key
//! becomes one CTE; the outer query LEFT JOINs them.

use super::catalog::{Aggregation, Catalog, FieldDef, FieldKind, FieldLevel, MeasureDef, MeasureLevel};
use super::filters::{Filter, SqlParams};
use super::{CompiledQuery, QueryBuildError, SortDirection};

/// One requested aggregate: a catalog measure plus an aggregation, with an
/// optional explicit output alias.
#[derive(Debug, Clone)]
pub struct MeasureSpec {
    pub measure: String,
    pub agg: Aggregation,
    pub alias: Option<String>,
}

impl MeasureSpec {
    pub fn new(measure: impl Into<String>, agg: Aggregation) -> Self {
        Self {
            measure: measure.into(),
            agg,
            alias: None,
        }
    }

    pub fn aliased(measure: impl Into<String>, agg: Aggregation, alias: impl Into<String>) -> Self {
        Self {
            measure: measure.into(),
            agg,
            alias: Some(alias.into()),
        }
    }

    /// Systematic output column name, overridable by the alias.
    fn output_column(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.measure, self.agg.as_str()))
    }
}

struct ResolvedMeasure<'a> {
    spec: &'a MeasureSpec,
    def: &'static MeasureDef,
    output: String,
}

pub struct AggregateQueryBuilder<'a> {
    project_id: &'a str,
    catalog: &'a Catalog,
    measures: &'a [MeasureSpec],
    dimensions: &'a [&'a str],
    filters: &'a [Filter],
    order_by: Option<(&'a str, SortDirection)>,
    limit: Option<u32>,
}

impl<'a> AggregateQueryBuilder<'a> {
    pub fn new(
        project_id: &'a str,
        catalog: &'a Catalog,
        measures: &'a [MeasureSpec],
        dimensions: &'a [&'a str],
    ) -> Self {
        Self {
            project_id,
            catalog,
            measures,
            dimensions,
            filters: &[],
            order_by: None,
            limit: None,
        }
    }

    pub fn filters(mut self, filters: &'a [Filter]) -> Self {
        self.filters = filters;
        self
    }

    pub fn order_by(mut self, column: &'a str, direction: SortDirection) -> Self {
        self.order_by = Some((column, direction));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Compile to SQL + params; all validation happens here.
    pub fn build(self) -> Result<CompiledQuery, QueryBuildError> {
        if self.measures.is_empty() {
            return Err(QueryBuildError::NoMeasures);
        }

        // Dimensions: must exist and be groupable.
        let dims: Vec<&FieldDef> = self
            .dimensions
            .iter()
            .map(|name| {
                let field = self
                    .catalog
                    .field(name)
                    .ok_or_else(|| QueryBuildError::UnknownField(name.to_string()))?;
                if !field.groupable {
                    return Err(QueryBuildError::NotGroupable(name.to_string()));
                }
                Ok(field)
            })
            .collect::<Result<_, _>>()?;

        // Measures: must exist and allow the requested aggregation; output
        // column names must be unique.
        let mut resolved: Vec<ResolvedMeasure> = Vec::with_capacity(self.measures.len());
        for spec in self.measures {
            let def = self
                .catalog
                .measure(&spec.measure)
                .ok_or_else(|| QueryBuildError::UnknownMeasure(spec.measure.clone()))?;
            if !def.aggs.contains(&spec.agg) {
                return Err(QueryBuildError::AggregationNotAllowed {
                    measure: spec.measure.clone(),
                    agg: spec.agg.as_str().to_string(),
                });
            }
            let output = spec.output_column();
            if resolved.iter().any(|r| r.output == output) {
                return Err(QueryBuildError::DuplicateColumn(output));
            }
            resolved.push(ResolvedMeasure { spec, def, output });
        }

        // Filters: field filters apply inside every rollup CTE; filters on
        // rollup output columns move to the outer WHERE.
        let mut field_filters: Vec<(&Filter, &FieldDef)> = Vec::new();
        let mut output_filters: Vec<&Filter> = Vec::new();
        for filter in self.filters {
            if let Some(field) = self.catalog.field(filter.column()) {
                field_filters.push((filter, field));
            } else if resolved.iter().any(|r| r.output == filter.column()) {
                output_filters.push(filter);
            } else {
                return Err(QueryBuildError::UnknownFilterColumn(
                    filter.column().to_string(),
                ));
            }
        }

        // Order column must be a dimension or an output column.
        if let Some((column, _)) = self.order_by
            && !dims.iter().any(|d| d.name == column)
            && !resolved.iter().any(|r| r.output == column)
        {
            return Err(QueryBuildError::UnknownOrderColumn(column.to_string()));
        }

        let needs_traces_cte = dims
            .iter()
            .map(|d| d.level)
            .chain(field_filters.iter().map(|(_, f)| f.level))
            .any(|level| level == FieldLevel::Trace);

        let row_measures: Vec<&ResolvedMeasure> = resolved
            .iter()
            .filter(|r| r.def.level == MeasureLevel::Row)
            .collect();
        let trace_measures: Vec<&ResolvedMeasure> = resolved
            .iter()
            .filter(|r| r.def.level == MeasureLevel::Trace)
            .collect();

        let mut params = SqlParams::default();
        let mut ctes: Vec<(String, String)> = Vec::new();

        if needs_traces_cte {
            let mut trace_cols: Vec<&FieldDef> = Vec::new();
            for field in dims
                .iter()
                .copied()
                .chain(field_filters.iter().map(|(_, f)| *f))
                .filter(|f| f.level == FieldLevel::Trace)
            {
                if !trace_cols.iter().any(|c| c.name == field.name) {
                    trace_cols.push(field);
                }
            }
            let rollups: Vec<String> = trace_cols
                .iter()
                .map(|f| {
                    format!(
                        "{} AS {}",
                        f.trace_expr.expect("trace-level field has rollup expr"),
                        f.column
                    )
                })
                .collect();
            ctes.push((
                "traces".to_string(),
                format!(
                    "SELECT trace_id, {} FROM {} WHERE project_id = ? GROUP BY trace_id",
                    rollups.join(", "),
                    self.catalog.table
                ),
            ));
            params.push_str(self.project_id);
        }

        let dim_suffix = if dims.is_empty() {
            "all".to_string()
        } else {
            dims.iter().map(|d| d.name).collect::<Vec<_>>().join("_")
        };

        let dim_select: Vec<String> = dims
            .iter()
            .map(|d| match d.level {
                FieldLevel::Row => format!("e.{} AS {}", d.column, d.name),
                FieldLevel::Trace => format!("t.{} AS {}", d.column, d.name),
            })
            .collect();
        let dim_names: Vec<&str> = dims.iter().map(|d| d.name).collect();

        let from_clause = if needs_traces_cte {
            format!(
                "{} e LEFT JOIN traces t ON e.trace_id = t.trace_id",
                self.catalog.table
            )
        } else {
            format!("{} e", self.catalog.table)
        };

        // Shared WHERE clause; field-filter params re-bind per CTE.
        let emit_where = |params: &mut SqlParams| -> String {
            let mut clause = "e.project_id = ?".to_string();
            params.push_str(self.project_id);
            for (filter, field) in &field_filters {
                let column_sql = match field.level {
                    FieldLevel::Row => format!("e.{}", field.column),
                    FieldLevel::Trace => format!("t.{}", field.column),
                };
                let fragment =
                    filter.to_sql(&column_sql, field.kind == FieldKind::StringArray, params);
                clause.push_str(" AND ");
                clause.push_str(&fragment);
            }
            clause
        };

        if !row_measures.is_empty() {
            let aggregates: Vec<String> = row_measures
                .iter()
                .map(|r| format!("{} AS {}", r.spec.agg.apply(r.def.expr), r.output))
                .collect();
            let where_clause = emit_where(&mut params);
            let select_list = if dim_select.is_empty() {
                aggregates.join(", ")
            } else {
                format!("{}, {}", dim_select.join(", "), aggregates.join(", "))
            };
            let group_clause = if dim_names.is_empty() {
                String::new()
            } else {
                format!(" GROUP BY {}", dim_names.join(", "))
            };
            ctes.push((
                format!("by_{}", dim_suffix),
                format!(
                    "SELECT {} FROM {} WHERE {}{}",
                    select_list, from_clause, where_clause, group_clause
                ),
            ));
        }

        if !trace_measures.is_empty() {
            // Inner query: one row per (dims, trace) with the per-trace value.
            let inner_values: Vec<String> = trace_measures
                .iter()
                .enumerate()
                .map(|(i, r)| format!("{} AS value_{}", r.def.expr, i))
                .collect();
            let inner_select = if dim_select.is_empty() {
                format!("e.trace_id AS rollup_trace_id, {}", inner_values.join(", "))
            } else {
                format!(
                    "{}, e.trace_id AS rollup_trace_id, {}",
                    dim_select.join(", "),
                    inner_values.join(", ")
                )
            };
            let where_clause = emit_where(&mut params);
            let inner_group: Vec<&str> = dim_names
                .iter()
                .copied()
                .chain(std::iter::once("rollup_trace_id"))
                .collect();

            let outer_aggs: Vec<String> = trace_measures
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    format!("{} AS {}", r.spec.agg.apply(&format!("value_{}", i)), r.output)
                })
                .collect();
            let outer_select = if dim_names.is_empty() {
                outer_aggs.join(", ")
            } else {
                format!("{}, {}", dim_names.join(", "), outer_aggs.join(", "))
            };
            let outer_group = if dim_names.is_empty() {
                String::new()
            } else {
                format!(" GROUP BY {}", dim_names.join(", "))
            };
            ctes.push((
                format!("by_{}_per_trace", dim_suffix),
                format!(
                    "SELECT {} FROM (SELECT {} FROM {} WHERE {} GROUP BY {}){}",
                    outer_select,
                    inner_select,
                    from_clause,
                    where_clause,
                    inner_group.join(", "),
                    outer_group
                ),
            ));
        }

        // Outer query: join rollup CTEs on the dimensions.
        let rollup_ctes: Vec<&(String, String)> =
            ctes.iter().filter(|(name, _)| name.as_str() != "traces").collect();
        let first = rollup_ctes
            .first()
            .expect("at least one measure produces a rollup CTE");

        let mut outer_select: Vec<String> = dim_names
            .iter()
            .map(|d| format!("r0.{}", d))
            .collect();
        for (i, (name, _)) in rollup_ctes.iter().enumerate() {
            let alias = format!("r{}", i);
            for r in &resolved {
                let in_this = match r.def.level {
                    MeasureLevel::Row => name.as_str() == format!("by_{}", dim_suffix),
                    MeasureLevel::Trace => {
                        name.as_str() == format!("by_{}_per_trace", dim_suffix)
                    }
                };
                if in_this {
                    outer_select.push(format!("{}.{}", alias, r.output));
                }
            }
        }

        let mut outer = format!(
            "SELECT {} FROM {} r0",
            outer_select.join(", "),
            first.0
        );
        for (i, (name, _)) in rollup_ctes.iter().enumerate().skip(1) {
            let alias = format!("r{}", i);
            if dim_names.is_empty() {
                outer.push_str(&format!(" CROSS JOIN {} {}", name, alias));
            } else {
                let conditions: Vec<String> = dim_names
                    .iter()
                    .map(|d| format!("r0.{} = {}.{}", d, alias, d))
                    .collect();
                outer.push_str(&format!(
                    " LEFT JOIN {} {} ON {}",
                    name,
                    alias,
                    conditions.join(" AND ")
                ));
            }
        }

        if !output_filters.is_empty() {
            let fragments: Vec<String> = output_filters
                .iter()
                .map(|f| f.to_sql(f.column(), false, &mut params))
                .collect();
            outer.push_str(&format!(" WHERE {}", fragments.join(" AND ")));
        }

        if let Some((column, direction)) = self.order_by {
            outer.push_str(&format!(" ORDER BY {} {}", column, direction.as_sql()));
        }
        if let Some(limit) = self.limit {
            outer.push_str(&format!(" LIMIT {}", limit));
        }

        let with_clause: Vec<String> = ctes
            .iter()
            .map(|(name, body)| format!("{} AS ({})", name, body))
            .collect();
        let sql = format!("WITH {} {}", with_clause.join(", "), outer);

        Ok(CompiledQuery { sql, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::query::filters::{NumberOp, QueryParam, StringOp};

    const CATALOG: Catalog = Catalog::events();

    #[test]
    fn single_rollup_by_trace_id() {
        let measures = vec![
            MeasureSpec::new("totalCost", Aggregation::Sum),
            MeasureSpec::new("count", Aggregation::Count),
        ];
        let query = AggregateQueryBuilder::new("proj-1", &CATALOG, &measures, &["traceId"])
            .build()
            .unwrap();
        assert_eq!(
            query.sql,
            "WITH by_traceId AS (SELECT e.trace_id AS traceId, \
             sum(total_cost) AS totalCost_sum, count() AS count_count \
             FROM events e WHERE e.project_id = ? GROUP BY traceId) \
             SELECT r0.traceId, r0.totalCost_sum, r0.count_count FROM by_traceId r0"
        );
        assert_eq!(
            query.params.values,
            vec![QueryParam::String("proj-1".into())]
        );
    }

    #[test]
    fn mixed_levels_produce_two_joined_ctes() {
        let measures = vec![
            MeasureSpec::new("totalCost", Aggregation::Sum),
            MeasureSpec::new("traceCount", Aggregation::Count),
        ];
        let query = AggregateQueryBuilder::new("proj-1", &CATALOG, &measures, &["name"])
            .build()
            .unwrap();
        assert!(query.sql.contains("by_name AS ("));
        assert!(query.sql.contains("by_name_per_trace AS ("));
        assert!(query.sql.contains("LEFT JOIN by_name_per_trace r1 ON r0.name = r1.name"));
        assert!(query.sql.contains("rollup_trace_id"));
        // project bound once per rollup CTE
        assert_eq!(query.params.values.len(), 2);
    }

    #[test]
    fn alias_overrides_output_column() {
        let measures = vec![MeasureSpec::aliased("totalCost", Aggregation::Sum, "spend")];
        let query = AggregateQueryBuilder::new("proj-1", &CATALOG, &measures, &[])
            .build()
            .unwrap();
        assert!(query.sql.contains("sum(total_cost) AS spend"));
        assert!(query.sql.contains("by_all AS ("));
    }

    #[test]
    fn field_filters_stay_in_cte_and_output_filters_move_out() {
        let measures = vec![MeasureSpec::new("totalCost", Aggregation::Sum)];
        let filters = vec![
            Filter::String {
                column: "environment".into(),
                operator: StringOp::Eq,
                value: "prod".into(),
            },
            Filter::Number {
                column: "totalCost_sum".into(),
                operator: NumberOp::Gt,
                value: 1.0,
            },
        ];
        let query = AggregateQueryBuilder::new("proj-1", &CATALOG, &measures, &["traceId"])
            .filters(&filters)
            .build()
            .unwrap();
        assert!(query.sql.contains("e.environment = ?"));
        assert!(query.sql.contains("WHERE totalCost_sum > ?"));
        // project, environment (CTE), cost threshold (outer)
        assert_eq!(query.params.values.len(), 3);
    }

    #[test]
    fn disallowed_aggregation_fails() {
        let measures = vec![MeasureSpec::new("count", Aggregation::Avg)];
        let err = AggregateQueryBuilder::new("proj-1", &CATALOG, &measures, &[])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            QueryBuildError::AggregationNotAllowed {
                measure: "count".into(),
                agg: "avg".into()
            }
        );
    }

    #[test]
    fn non_groupable_dimension_fails() {
        let measures = vec![MeasureSpec::new("count", Aggregation::Count)];
        let err = AggregateQueryBuilder::new("proj-1", &CATALOG, &measures, &["startTime"])
            .build()
            .unwrap_err();
        assert_eq!(err, QueryBuildError::NotGroupable("startTime".into()));
    }

    #[test]
    fn unknown_measure_fails() {
        let measures = vec![MeasureSpec::new("profit", Aggregation::Sum)];
        let err = AggregateQueryBuilder::new("proj-1", &CATALOG, &measures, &[])
            .build()
            .unwrap_err();
        assert_eq!(err, QueryBuildError::UnknownMeasure("profit".into()));
    }

    #[test]
    fn duplicate_output_column_fails() {
        let measures = vec![
            MeasureSpec::new("totalCost", Aggregation::Sum),
            MeasureSpec::aliased("latencyMs", Aggregation::Avg, "totalCost_sum"),
        ];
        let err = AggregateQueryBuilder::new("proj-1", &CATALOG, &measures, &[])
            .build()
            .unwrap_err();
        assert_eq!(err, QueryBuildError::DuplicateColumn("totalCost_sum".into()));
    }

    #[test]
    fn trace_level_dimension_joins_traces_cte() {
        let measures = vec![MeasureSpec::new("count", Aggregation::Count)];
        let query = AggregateQueryBuilder::new("proj-1", &CATALOG, &measures, &["traceName"])
            .build()
            .unwrap();
        assert!(query.sql.contains("traces AS (SELECT trace_id, argMaxIf"));
        assert!(query.sql.contains("LEFT JOIN traces t ON e.trace_id = t.trace_id"));
        assert!(query.sql.contains("t.trace_name AS traceName"));
    }

    #[test]
    fn every_cte_is_project_scoped() {
        let measures = vec![
            MeasureSpec::new("totalCost", Aggregation::Sum),
            MeasureSpec::new("traceCount", Aggregation::Count),
        ];
        let query = AggregateQueryBuilder::new("proj-1", &CATALOG, &measures, &["traceName"])
            .build()
            .unwrap();
        let scoped = query.sql.matches("project_id = ?").count();
        // traces CTE + two rollup CTEs
        assert_eq!(scoped, 3);
        assert_eq!(
            query
                .params
                .values
                .iter()
                .filter(|p| **p == QueryParam::String("proj-1".into()))
                .count(),
            3
        );
    }
}
