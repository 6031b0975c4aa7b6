//! Filter model for analytical queries
//!
//! Filters are typed values compiled to parameterized SQL fragments. Column
//! names are validated against a whitelist before any SQL is assembled;
//! user-supplied values only ever reach the query through bound parameters.

use serde::Deserialize;

use crate::utils::sql::escape_like_pattern;

/// A value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    String(String),
    Int64(i64),
    Float64(f64),
}

/// Collects bound parameters in placeholder order.
#[derive(Debug, Default)]
pub struct SqlParams {
    pub values: Vec<QueryParam>,
}

impl SqlParams {
    pub fn push_str(&mut self, value: impl Into<String>) {
        self.values.push(QueryParam::String(value.into()));
    }

    pub fn push_i64(&mut self, value: i64) {
        self.values.push(QueryParam::Int64(value));
    }

    pub fn push_f64(&mut self, value: f64) {
        self.values.push(QueryParam::Float64(value));
    }

    /// Bind all collected parameters onto a ClickHouse query in order.
    pub fn bind_to(&self, mut query: clickhouse::query::Query) -> clickhouse::query::Query {
        for param in &self.values {
            query = match param {
                QueryParam::String(s) => query.bind(s),
                QueryParam::Int64(i) => query.bind(i),
                QueryParam::Float64(f) => query.bind(f),
            };
        }
        query
    }
}

/// Typed filter terms; the tag set mirrors the public filter JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    Datetime {
        column: String,
        operator: DatetimeOp,
        /// RFC 3339; compared via parameterized microseconds
        value: chrono::DateTime<chrono::Utc>,
    },
    String {
        column: String,
        operator: StringOp,
        value: String,
    },
    Number {
        column: String,
        operator: NumberOp,
        value: f64,
    },
    StringOptions {
        column: String,
        operator: OptionsOp,
        value: Vec<String>,
    },
    Boolean {
        column: String,
        operator: BooleanOp,
        value: bool,
    },
    Null {
        column: String,
        operator: NullOp,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub enum DatetimeOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub enum StringOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "starts with")]
    StartsWith,
    #[serde(rename = "ends with")]
    EndsWith,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "regex")]
    Regex,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub enum NumberOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub enum OptionsOp {
    #[serde(rename = "any of")]
    AnyOf,
    #[serde(rename = "none of")]
    NoneOf,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub enum BooleanOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<>")]
    Ne,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub enum NullOp {
    #[serde(rename = "is null")]
    IsNull,
    #[serde(rename = "is not null")]
    IsNotNull,
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Self::Datetime { column, .. } => column,
            Self::String { column, .. } => column,
            Self::Number { column, .. } => column,
            Self::StringOptions { column, .. } => column,
            Self::Boolean { column, .. } => column,
            Self::Null { column, .. } => column,
        }
    }

    /// Compile to a SQL fragment with `?` placeholders.
    ///
    /// `column_sql` is the resolved (whitelisted, optionally aliased) column
    /// expression; `is_array` selects array membership semantics for
    /// string-options filters on array columns.
    pub fn to_sql(&self, column_sql: &str, is_array: bool, params: &mut SqlParams) -> String {
        match self {
            Self::Datetime { operator, value, .. } => {
                params.push_i64(value.timestamp_micros());
                let op = match operator {
                    DatetimeOp::Gt => ">",
                    DatetimeOp::Lt => "<",
                    DatetimeOp::Gte => ">=",
                    DatetimeOp::Lte => "<=",
                };
                format!("{} {} fromUnixTimestamp64Micro(?)", column_sql, op)
            }
            Self::String { operator, value, .. } => match operator {
                StringOp::Eq => {
                    params.push_str(value.clone());
                    format!("{} = ?", column_sql)
                }
                StringOp::Ne => {
                    params.push_str(value.clone());
                    format!("{} != ?", column_sql)
                }
                StringOp::StartsWith => {
                    params.push_str(format!("{}%", escape_like_pattern(value)));
                    format!("{} LIKE ?", column_sql)
                }
                StringOp::EndsWith => {
                    params.push_str(format!("%{}", escape_like_pattern(value)));
                    format!("{} LIKE ?", column_sql)
                }
                StringOp::Contains => {
                    params.push_str(format!("%{}%", escape_like_pattern(value)));
                    format!("{} LIKE ?", column_sql)
                }
                StringOp::Regex => {
                    params.push_str(value.clone());
                    format!("match({}, ?)", column_sql)
                }
            },
            Self::Number { operator, value, .. } => {
                params.push_f64(*value);
                let op = match operator {
                    NumberOp::Eq => "=",
                    NumberOp::Ne => "!=",
                    NumberOp::Gt => ">",
                    NumberOp::Lt => "<",
                    NumberOp::Gte => ">=",
                    NumberOp::Lte => "<=",
                };
                format!("{} {} ?", column_sql, op)
            }
            Self::StringOptions { operator, value, .. } => {
                if value.is_empty() {
                    // "any of nothing" matches no row; "none of nothing"
                    // excludes nothing.
                    return match operator {
                        OptionsOp::AnyOf => "1 = 0".to_string(),
                        OptionsOp::NoneOf => "1 = 1".to_string(),
                    };
                }
                if is_array {
                    let conditions: Vec<String> = value
                        .iter()
                        .map(|v| {
                            params.push_str(v.clone());
                            match operator {
                                OptionsOp::AnyOf => format!("has({}, ?)", column_sql),
                                OptionsOp::NoneOf => format!("NOT has({}, ?)", column_sql),
                            }
                        })
                        .collect();
                    let join_op = match operator {
                        OptionsOp::AnyOf => " OR ",
                        OptionsOp::NoneOf => " AND ",
                    };
                    return format!("({})", conditions.join(join_op));
                }
                let placeholders: Vec<&str> = value.iter().map(|_| "?").collect();
                for v in value {
                    params.push_str(v.clone());
                }
                match operator {
                    OptionsOp::AnyOf => {
                        format!("{} IN ({})", column_sql, placeholders.join(", "))
                    }
                    OptionsOp::NoneOf => {
                        format!("{} NOT IN ({})", column_sql, placeholders.join(", "))
                    }
                }
            }
            Self::Boolean { operator, value, .. } => {
                let sql_bool = if *value { "TRUE" } else { "FALSE" };
                match operator {
                    BooleanOp::Eq => format!("{} = {}", column_sql, sql_bool),
                    BooleanOp::Ne => format!("{} <> {}", column_sql, sql_bool),
                }
            }
            Self::Null { operator, .. } => match operator {
                NullOp::IsNull => format!("{} IS NULL", column_sql),
                NullOp::IsNotNull => format!("{} IS NOT NULL", column_sql),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn datetime_filter_binds_micros() {
        let ts = chrono::Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let filter = Filter::Datetime {
            column: "startTime".into(),
            operator: DatetimeOp::Gte,
            value: ts,
        };
        let mut params = SqlParams::default();
        let sql = filter.to_sql("start_time", false, &mut params);
        assert_eq!(sql, "start_time >= fromUnixTimestamp64Micro(?)");
        assert_eq!(params.values, vec![QueryParam::Int64(ts.timestamp_micros())]);
    }

    #[test]
    fn string_contains_escapes_pattern() {
        let filter = Filter::String {
            column: "name".into(),
            operator: StringOp::Contains,
            value: "50%_off".into(),
        };
        let mut params = SqlParams::default();
        let sql = filter.to_sql("name", false, &mut params);
        assert_eq!(sql, "name LIKE ?");
        assert_eq!(
            params.values,
            vec![QueryParam::String("%50\\%\\_off%".into())]
        );
    }

    #[test]
    fn regex_uses_match() {
        let filter = Filter::String {
            column: "name".into(),
            operator: StringOp::Regex,
            value: "^gen-.*$".into(),
        };
        let mut params = SqlParams::default();
        let sql = filter.to_sql("name", false, &mut params);
        assert_eq!(sql, "match(name, ?)");
    }

    #[test]
    fn string_options_scalar_uses_in() {
        let filter = Filter::StringOptions {
            column: "environment".into(),
            operator: OptionsOp::AnyOf,
            value: vec!["prod".into(), "staging".into()],
        };
        let mut params = SqlParams::default();
        let sql = filter.to_sql("environment", false, &mut params);
        assert_eq!(sql, "environment IN (?, ?)");
        assert_eq!(params.values.len(), 2);
    }

    #[test]
    fn string_options_array_uses_has() {
        let filter = Filter::StringOptions {
            column: "tags".into(),
            operator: OptionsOp::NoneOf,
            value: vec!["spam".into(), "test".into()],
        };
        let mut params = SqlParams::default();
        let sql = filter.to_sql("tags", true, &mut params);
        assert_eq!(sql, "(NOT has(tags, ?) AND NOT has(tags, ?))");
    }

    #[test]
    fn empty_any_of_matches_nothing() {
        let filter = Filter::StringOptions {
            column: "environment".into(),
            operator: OptionsOp::AnyOf,
            value: vec![],
        };
        let mut params = SqlParams::default();
        assert_eq!(filter.to_sql("environment", false, &mut params), "1 = 0");
        assert!(params.values.is_empty());
    }

    #[test]
    fn empty_none_of_excludes_nothing() {
        let filter = Filter::StringOptions {
            column: "environment".into(),
            operator: OptionsOp::NoneOf,
            value: vec![],
        };
        let mut params = SqlParams::default();
        assert_eq!(filter.to_sql("environment", false, &mut params), "1 = 1");
        assert!(params.values.is_empty());
    }

    #[test]
    fn filter_json_parses_spec_operators() {
        let filters: Vec<Filter> = serde_json::from_str(
            r#"[
                {"type": "string", "column": "name", "operator": "starts with", "value": "agent"},
                {"type": "string_options", "column": "environment", "operator": "any of", "value": ["prod"]},
                {"type": "number", "column": "totalCost", "operator": ">", "value": 0.5},
                {"type": "null", "column": "endTime", "operator": "is null"}
            ]"#,
        )
        .unwrap();
        assert_eq!(filters.len(), 4);
        assert_eq!(filters[2].column(), "totalCost");
    }
}
