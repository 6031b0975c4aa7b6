//! Query catalogs
//!
//! A catalog is the closed schema a builder may reference: scalar fields
//! (with groupability) and measures (expressions plus the aggregations each
//! allows). User-supplied identifiers resolve against the catalog at build
//! time or the build fails; they never reach the SQL string.

/// Scalar field type, used to pick filter semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Datetime,
    StringArray,
    Boolean,
}

/// Where a field's value lives relative to the base table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLevel {
    /// Plain column on the base table
    Row,
    /// Derived per-trace; forces the `traces` CTE and resolves against it
    Trace,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    /// Column on the base table (Row) or output column of the traces CTE
    pub column: &'static str,
    /// Rollup expression populating the traces CTE column (Trace level only)
    pub trace_expr: Option<&'static str>,
    pub kind: FieldKind,
    pub level: FieldLevel,
    pub groupable: bool,
}

/// Aggregations a measure may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregation {
    Sum,
    Count,
    Avg,
    Min,
    Max,
    P50,
    P95,
    P99,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::P50 => "p50",
            Self::P95 => "p95",
            Self::P99 => "p99",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sum" => Some(Self::Sum),
            "count" => Some(Self::Count),
            "avg" => Some(Self::Avg),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "p50" => Some(Self::P50),
            "p95" => Some(Self::P95),
            "p99" => Some(Self::P99),
            _ => None,
        }
    }

    /// Wrap an expression in the aggregate function.
    pub fn apply(&self, expr: &str) -> String {
        match self {
            Self::Sum => format!("sum({})", expr),
            Self::Count => "count()".to_string(),
            Self::Avg => format!("avg({})", expr),
            Self::Min => format!("min({})", expr),
            Self::Max => format!("max({})", expr),
            Self::P50 => format!("quantile(0.5)({})", expr),
            Self::P95 => format!("quantile(0.95)({})", expr),
            Self::P99 => format!("quantile(0.99)({})", expr),
        }
    }
}

/// Rollup level of a measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasureLevel {
    /// Aggregated directly over base-table rows
    Row,
    /// Rolled up per trace first, then aggregated
    Trace,
}

#[derive(Debug, Clone, Copy)]
pub struct MeasureDef {
    pub name: &'static str,
    /// Expression over base-table columns (Row) or the per-trace rollup
    /// expression (Trace)
    pub expr: &'static str,
    pub level: MeasureLevel,
    pub aggs: &'static [Aggregation],
}

/// The view a catalog describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Events,
    Traces,
    Scores,
}

#[derive(Debug, Clone, Copy)]
pub struct Catalog {
    pub view: ViewKind,
    pub table: &'static str,
    pub fields: &'static [FieldDef],
    pub measures: &'static [MeasureDef],
}

impl Catalog {
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn measure(&self, name: &str) -> Option<&'static MeasureDef> {
        self.measures.iter().find(|m| m.name == name)
    }
}

const fn row_field(
    name: &'static str,
    column: &'static str,
    kind: FieldKind,
    groupable: bool,
) -> FieldDef {
    FieldDef {
        name,
        column,
        trace_expr: None,
        kind,
        level: FieldLevel::Row,
        groupable,
    }
}

const fn trace_field(
    name: &'static str,
    column: &'static str,
    trace_expr: &'static str,
    kind: FieldKind,
    groupable: bool,
) -> FieldDef {
    FieldDef {
        name,
        column,
        trace_expr: Some(trace_expr),
        kind,
        level: FieldLevel::Trace,
        groupable,
    }
}

const NUMERIC_AGGS: &[Aggregation] = &[
    Aggregation::Sum,
    Aggregation::Avg,
    Aggregation::Min,
    Aggregation::Max,
    Aggregation::P50,
    Aggregation::P95,
    Aggregation::P99,
];

// ============================================================================
// Events view (observations as wide rows; trace rows have parent_span_id = '')
// ============================================================================

const EVENT_FIELDS: &[FieldDef] = &[
    row_field("id", "span_id", FieldKind::String, false),
    row_field("traceId", "trace_id", FieldKind::String, true),
    row_field("parentObservationId", "parent_span_id", FieldKind::String, false),
    row_field("type", "type", FieldKind::String, true),
    row_field("name", "name", FieldKind::String, true),
    row_field("level", "level", FieldKind::String, true),
    row_field("environment", "environment", FieldKind::String, true),
    row_field("model", "model", FieldKind::String, true),
    row_field("userId", "user_id", FieldKind::String, true),
    row_field("sessionId", "session_id", FieldKind::String, true),
    row_field("startTime", "start_time", FieldKind::Datetime, false),
    row_field("endTime", "end_time", FieldKind::Datetime, false),
    row_field("promptTokens", "prompt_tokens", FieldKind::Number, false),
    row_field("completionTokens", "completion_tokens", FieldKind::Number, false),
    row_field("totalTokens", "total_tokens", FieldKind::Number, false),
    row_field("totalCost", "total_cost", FieldKind::Number, false),
    row_field("latencyMs", "latency_ms", FieldKind::Number, false),
    trace_field(
        "traceName",
        "trace_name",
        "argMaxIf(name, event_ts, parent_span_id = '')",
        FieldKind::String,
        true,
    ),
    trace_field(
        "traceTags",
        "trace_tags",
        "anyLastIf(tags, parent_span_id = '')",
        FieldKind::StringArray,
        false,
    ),
];

const EVENT_MEASURES: &[MeasureDef] = &[
    MeasureDef {
        name: "count",
        expr: "1",
        level: MeasureLevel::Row,
        aggs: &[Aggregation::Count],
    },
    MeasureDef {
        name: "totalCost",
        expr: "total_cost",
        level: MeasureLevel::Row,
        aggs: NUMERIC_AGGS,
    },
    MeasureDef {
        name: "totalTokens",
        expr: "total_tokens",
        level: MeasureLevel::Row,
        aggs: NUMERIC_AGGS,
    },
    MeasureDef {
        name: "promptTokens",
        expr: "prompt_tokens",
        level: MeasureLevel::Row,
        aggs: NUMERIC_AGGS,
    },
    MeasureDef {
        name: "completionTokens",
        expr: "completion_tokens",
        level: MeasureLevel::Row,
        aggs: NUMERIC_AGGS,
    },
    MeasureDef {
        name: "latencyMs",
        expr: "latency_ms",
        level: MeasureLevel::Row,
        aggs: NUMERIC_AGGS,
    },
    MeasureDef {
        name: "traceCount",
        expr: "1",
        level: MeasureLevel::Trace,
        aggs: &[Aggregation::Count],
    },
    MeasureDef {
        name: "traceTotalCost",
        expr: "sum(total_cost)",
        level: MeasureLevel::Trace,
        aggs: NUMERIC_AGGS,
    },
];

// ============================================================================
// Traces view
// ============================================================================

const TRACE_FIELDS: &[FieldDef] = &[
    row_field("id", "id", FieldKind::String, false),
    row_field("name", "name", FieldKind::String, true),
    row_field("userId", "user_id", FieldKind::String, true),
    row_field("sessionId", "session_id", FieldKind::String, true),
    row_field("release", "release", FieldKind::String, true),
    row_field("version", "version", FieldKind::String, true),
    row_field("environment", "environment", FieldKind::String, true),
    row_field("tags", "tags", FieldKind::StringArray, false),
    row_field("public", "public", FieldKind::Boolean, true),
    row_field("bookmarked", "bookmarked", FieldKind::Boolean, true),
    row_field("timestamp", "timestamp", FieldKind::Datetime, false),
];

const TRACE_MEASURES: &[MeasureDef] = &[MeasureDef {
    name: "count",
    expr: "1",
    level: MeasureLevel::Row,
    aggs: &[Aggregation::Count],
}];

// ============================================================================
// Scores view
// ============================================================================

const SCORE_FIELDS: &[FieldDef] = &[
    row_field("id", "id", FieldKind::String, false),
    row_field("name", "name", FieldKind::String, true),
    row_field("source", "source", FieldKind::String, true),
    row_field("dataType", "data_type", FieldKind::String, true),
    row_field("traceId", "trace_id", FieldKind::String, true),
    row_field("observationId", "observation_id", FieldKind::String, false),
    row_field("environment", "environment", FieldKind::String, true),
    row_field("value", "value", FieldKind::Number, false),
    row_field("stringValue", "string_value", FieldKind::String, true),
    row_field("timestamp", "timestamp", FieldKind::Datetime, false),
];

const SCORE_MEASURES: &[MeasureDef] = &[
    MeasureDef {
        name: "count",
        expr: "1",
        level: MeasureLevel::Row,
        aggs: &[Aggregation::Count],
    },
    MeasureDef {
        name: "value",
        expr: "value",
        level: MeasureLevel::Row,
        aggs: NUMERIC_AGGS,
    },
];

impl Catalog {
    pub const fn events() -> Self {
        Self {
            view: ViewKind::Events,
            table: "events",
            fields: EVENT_FIELDS,
            measures: EVENT_MEASURES,
        }
    }

    pub const fn traces() -> Self {
        Self {
            view: ViewKind::Traces,
            table: "traces",
            fields: TRACE_FIELDS,
            measures: TRACE_MEASURES,
        }
    }

    pub const fn scores() -> Self {
        Self {
            view: ViewKind::Scores,
            table: "scores",
            fields: SCORE_FIELDS,
            measures: SCORE_MEASURES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name() {
        let catalog = Catalog::events();
        assert_eq!(catalog.field("traceId").unwrap().column, "trace_id");
        assert!(catalog.field("nonsense").is_none());
        assert_eq!(catalog.measure("totalCost").unwrap().expr, "total_cost");
    }

    #[test]
    fn trace_level_fields_carry_rollup_exprs() {
        let catalog = Catalog::events();
        let field = catalog.field("traceName").unwrap();
        assert_eq!(field.level, FieldLevel::Trace);
        assert!(field.trace_expr.unwrap().contains("argMaxIf"));
    }

    #[test]
    fn aggregation_sql() {
        assert_eq!(Aggregation::Sum.apply("total_cost"), "sum(total_cost)");
        assert_eq!(Aggregation::Count.apply("1"), "count()");
        assert_eq!(Aggregation::P95.apply("latency_ms"), "quantile(0.95)(latency_ms)");
    }

    #[test]
    fn aggregation_parse_round_trip() {
        for agg in [
            Aggregation::Sum,
            Aggregation::Count,
            Aggregation::Avg,
            Aggregation::Min,
            Aggregation::Max,
            Aggregation::P50,
            Aggregation::P95,
            Aggregation::P99,
        ] {
            assert_eq!(Aggregation::parse(agg.as_str()), Some(agg));
        }
        assert_eq!(Aggregation::parse("median"), None);
    }
}
