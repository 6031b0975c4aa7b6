//! Row-level select builder
//!
//! Compiles a field list plus filters into
//! `SELECT ... FROM <table> e [LEFT JOIN traces t] WHERE ... ORDER BY ...`.
//! Referencing any trace-level field emits the `traces` CTE exactly once
//! and LEFT JOINs it on trace_id.

use super::catalog::{Catalog, FieldDef, FieldKind, FieldLevel};
use super::filters::{Filter, SqlParams};
use super::{CompiledQuery, QueryBuildError, SortDirection};

pub struct SelectQueryBuilder<'a> {
    project_id: &'a str,
    catalog: &'a Catalog,
    fields: Vec<&'a str>,
    filters: &'a [Filter],
    order_by: Option<(&'a str, SortDirection)>,
    limit: u32,
    page: u32,
}

impl<'a> SelectQueryBuilder<'a> {
    pub fn new(project_id: &'a str, catalog: &'a Catalog, fields: &'a [&'a str]) -> Self {
        Self {
            project_id,
            catalog,
            fields: fields.to_vec(),
            filters: &[],
            order_by: None,
            limit: 50,
            page: 1,
        }
    }

    pub fn filters(mut self, filters: &'a [Filter]) -> Self {
        self.filters = filters;
        self
    }

    pub fn order_by(mut self, field: &'a str, direction: SortDirection) -> Self {
        self.order_by = Some((field, direction));
        self
    }

    pub fn paginate(mut self, page: u32, limit: u32) -> Self {
        self.page = page.max(1);
        self.limit = limit;
        self
    }

    fn resolve(&self, name: &str) -> Result<&'static FieldDef, QueryBuildError> {
        match self.catalog.field(name) {
            Some(field) => Ok(field),
            None if self.catalog.measure(name).is_some() => {
                Err(QueryBuildError::MeasureAsField(name.to_string()))
            }
            None => Err(QueryBuildError::UnknownField(name.to_string())),
        }
    }

    /// Compile to SQL + params; all validation happens here.
    pub fn build(self) -> Result<CompiledQuery, QueryBuildError> {
        if self.fields.is_empty() {
            return Err(QueryBuildError::NoFields);
        }

        let fields: Vec<&FieldDef> = self
            .fields
            .iter()
            .map(|name| self.resolve(name))
            .collect::<Result<_, _>>()?;

        let filter_fields: Vec<&FieldDef> = self
            .filters
            .iter()
            .map(|f| {
                self.catalog
                    .field(f.column())
                    .ok_or_else(|| QueryBuildError::UnknownFilterColumn(f.column().to_string()))
            })
            .collect::<Result<_, _>>()?;

        let order = match self.order_by {
            Some((name, direction)) => Some((
                self.catalog
                    .field(name)
                    .ok_or_else(|| QueryBuildError::UnknownOrderColumn(name.to_string()))?,
                direction,
            )),
            None => None,
        };

        // Trace-level columns needed anywhere force the traces CTE.
        let mut trace_columns: Vec<&FieldDef> = Vec::new();
        for field in fields
            .iter()
            .copied()
            .chain(filter_fields.iter().copied())
            .chain(order.iter().map(|(f, _)| *f))
        {
            if field.level == FieldLevel::Trace
                && !trace_columns.iter().any(|c| c.name == field.name)
            {
                trace_columns.push(field);
            }
        }

        let mut params = SqlParams::default();
        let mut sql = String::new();

        if !trace_columns.is_empty() {
            let rollups: Vec<String> = trace_columns
                .iter()
                .map(|f| {
                    format!(
                        "{} AS {}",
                        f.trace_expr.expect("trace-level field has rollup expr"),
                        f.column
                    )
                })
                .collect();
            sql.push_str(&format!(
                "WITH traces AS (SELECT trace_id, {} FROM {} WHERE project_id = ? GROUP BY trace_id) ",
                rollups.join(", "),
                self.catalog.table
            ));
            params.push_str(self.project_id);
        }

        let select_list: Vec<String> = fields
            .iter()
            .map(|f| match f.level {
                FieldLevel::Row => format!("e.{} AS {}", f.column, f.name),
                FieldLevel::Trace => format!("t.{} AS {}", f.column, f.name),
            })
            .collect();
        sql.push_str(&format!(
            "SELECT {} FROM {} e",
            select_list.join(", "),
            self.catalog.table
        ));
        if !trace_columns.is_empty() {
            sql.push_str(" LEFT JOIN traces t ON e.trace_id = t.trace_id");
        }

        sql.push_str(" WHERE e.project_id = ?");
        params.push_str(self.project_id);

        for (filter, field) in self.filters.iter().zip(filter_fields.iter()) {
            let column_sql = match field.level {
                FieldLevel::Row => format!("e.{}", field.column),
                FieldLevel::Trace => format!("t.{}", field.column),
            };
            let fragment = filter.to_sql(
                &column_sql,
                field.kind == FieldKind::StringArray,
                &mut params,
            );
            sql.push_str(" AND ");
            sql.push_str(&fragment);
        }

        if let Some((field, direction)) = order {
            let column_sql = match field.level {
                FieldLevel::Row => format!("e.{}", field.column),
                FieldLevel::Trace => format!("t.{}", field.column),
            };
            sql.push_str(&format!(" ORDER BY {} {}", column_sql, direction.as_sql()));
        }

        let offset = (self.page as u64 - 1) * self.limit as u64;
        sql.push_str(&format!(" LIMIT {} OFFSET {}", self.limit, offset));

        Ok(CompiledQuery { sql, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::query::filters::{NumberOp, QueryParam, StringOp};

    const CATALOG: Catalog = Catalog::events();

    #[test]
    fn plain_select_has_no_cte() {
        let query = SelectQueryBuilder::new("proj-1", &CATALOG, &["id", "name", "totalCost"])
            .build()
            .unwrap();
        assert_eq!(
            query.sql,
            "SELECT e.span_id AS id, e.name AS name, e.total_cost AS totalCost \
             FROM events e WHERE e.project_id = ? LIMIT 50 OFFSET 0"
        );
        assert_eq!(
            query.params.values,
            vec![QueryParam::String("proj-1".into())]
        );
    }

    #[test]
    fn trace_level_field_emits_traces_cte_once() {
        let query = SelectQueryBuilder::new(
            "proj-1",
            &CATALOG,
            &["id", "traceName", "traceTags"],
        )
        .build()
        .unwrap();
        assert!(query.sql.starts_with(
            "WITH traces AS (SELECT trace_id, \
             argMaxIf(name, event_ts, parent_span_id = '') AS trace_name, \
             anyLastIf(tags, parent_span_id = '') AS trace_tags \
             FROM events WHERE project_id = ? GROUP BY trace_id) "
        ));
        assert_eq!(query.sql.matches("WITH traces").count(), 1);
        assert!(query.sql.contains("LEFT JOIN traces t ON e.trace_id = t.trace_id"));
        assert!(query.sql.contains("t.trace_name AS traceName"));
        // CTE project scope + outer project scope
        assert_eq!(query.params.values.len(), 2);
    }

    #[test]
    fn filter_on_trace_level_field_also_forces_cte() {
        let filters = vec![Filter::String {
            column: "traceName".into(),
            operator: StringOp::Eq,
            value: "checkout".into(),
        }];
        let query = SelectQueryBuilder::new("proj-1", &CATALOG, &["id"])
            .filters(&filters)
            .build()
            .unwrap();
        assert!(query.sql.contains("WITH traces AS"));
        assert!(query.sql.contains("AND t.trace_name = ?"));
    }

    #[test]
    fn filters_and_ordering_compose() {
        let filters = vec![Filter::Number {
            column: "totalCost".into(),
            operator: NumberOp::Gt,
            value: 0.1,
        }];
        let query = SelectQueryBuilder::new("proj-1", &CATALOG, &["id", "totalCost"])
            .filters(&filters)
            .order_by("startTime", SortDirection::Desc)
            .paginate(3, 25)
            .build()
            .unwrap();
        assert!(query.sql.contains("AND e.total_cost > ?"));
        assert!(query.sql.contains("ORDER BY e.start_time DESC"));
        assert!(query.sql.ends_with("LIMIT 25 OFFSET 50"));
        assert_eq!(query.params.values.len(), 2);
    }

    #[test]
    fn unknown_field_fails_at_build_time() {
        let err = SelectQueryBuilder::new("proj-1", &CATALOG, &["nope"])
            .build()
            .unwrap_err();
        assert_eq!(err, QueryBuildError::UnknownField("nope".into()));
    }

    #[test]
    fn measure_as_field_fails() {
        let err = SelectQueryBuilder::new("proj-1", &CATALOG, &["traceCount"])
            .build()
            .unwrap_err();
        assert_eq!(err, QueryBuildError::MeasureAsField("traceCount".into()));
    }

    #[test]
    fn unknown_filter_column_fails() {
        let filters = vec![Filter::Number {
            column: "secret_col".into(),
            operator: NumberOp::Eq,
            value: 1.0,
        }];
        let err = SelectQueryBuilder::new("proj-1", &CATALOG, &["id"])
            .filters(&filters)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            QueryBuildError::UnknownFilterColumn("secret_col".into())
        );
    }
}
