//! ClickHouse schema
//!
//! Wide columnar tables for the read paths plus the `events` table backing
//! the declarative query engine. Upserts are modeled as ReplacingMergeTree
//! inserts deduplicated by `updated_at`; reads use FINAL.

pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS traces (
        project_id String,
        id String,
        name String DEFAULT '',
        user_id String DEFAULT '',
        session_id String DEFAULT '',
        release String DEFAULT '',
        version String DEFAULT '',
        environment String DEFAULT 'default',
        tags Array(String) DEFAULT [],
        public Bool DEFAULT false,
        bookmarked Bool DEFAULT false,
        input String DEFAULT '',
        output String DEFAULT '',
        metadata String DEFAULT '',
        timestamp DateTime64(6),
        event_ts DateTime64(6),
        created_at DateTime64(6),
        updated_at DateTime64(6)
    )
    ENGINE = ReplacingMergeTree(updated_at)
    PARTITION BY toYYYYMM(timestamp)
    ORDER BY (project_id, toDate(timestamp), id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS observations (
        project_id String,
        id String,
        trace_id String DEFAULT '',
        parent_observation_id String DEFAULT '',
        type String,
        name String DEFAULT '',
        level String DEFAULT 'DEFAULT',
        status_message String DEFAULT '',
        environment String DEFAULT 'default',
        model String DEFAULT '',
        model_parameters String DEFAULT '',
        input String DEFAULT '',
        output String DEFAULT '',
        metadata String DEFAULT '',
        usage_details String DEFAULT '',
        cost_details String DEFAULT '',
        prompt_tokens Int64 DEFAULT 0,
        completion_tokens Int64 DEFAULT 0,
        total_tokens Int64 DEFAULT 0,
        explicit_total_cost Nullable(Float64),
        component_cost_sum Float64 DEFAULT 0,
        unit String DEFAULT '',
        version String DEFAULT '',
        prompt_id String DEFAULT '',
        start_time DateTime64(6),
        end_time Nullable(DateTime64(6)),
        completion_start_time Nullable(DateTime64(6)),
        event_ts DateTime64(6),
        created_at DateTime64(6),
        updated_at DateTime64(6)
    )
    ENGINE = ReplacingMergeTree(updated_at)
    PARTITION BY toYYYYMM(start_time)
    ORDER BY (project_id, toDate(start_time), trace_id, id)
    "#,
    // Derived cost/latency columns for the read paths.
    r#"
    CREATE VIEW IF NOT EXISTS observations_view AS
    SELECT
        *,
        coalesce(explicit_total_cost, component_cost_sum) AS total_cost,
        if(end_time IS NULL, NULL,
           dateDiff('millisecond', start_time, assumeNotNull(end_time))) AS latency_ms,
        if(completion_start_time IS NULL, NULL,
           dateDiff('millisecond', start_time, assumeNotNull(completion_start_time)))
            AS time_to_first_token_ms
    FROM observations FINAL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS scores (
        project_id String,
        id String,
        name String,
        source String DEFAULT 'API',
        data_type String,
        value Nullable(Float64),
        string_value String DEFAULT '',
        comment String DEFAULT '',
        metadata String DEFAULT '',
        config_id String DEFAULT '',
        queue_id String DEFAULT '',
        author_user_id String DEFAULT '',
        trace_id String DEFAULT '',
        session_id String DEFAULT '',
        dataset_run_id String DEFAULT '',
        observation_id String DEFAULT '',
        environment String DEFAULT 'default',
        timestamp DateTime64(6),
        created_at DateTime64(6),
        updated_at DateTime64(6)
    )
    ENGINE = ReplacingMergeTree(updated_at)
    PARTITION BY toYYYYMM(timestamp)
    ORDER BY (project_id, toDate(timestamp), id)
    "#,
    // Wide event rows for the query engine: every observation lands here,
    // and every trace lands as a row with parent_span_id = ''.
    r#"
    CREATE TABLE IF NOT EXISTS events (
        project_id String,
        trace_id String,
        span_id String,
        parent_span_id String DEFAULT '',
        type String DEFAULT '',
        name String DEFAULT '',
        level String DEFAULT 'DEFAULT',
        environment String DEFAULT 'default',
        user_id String DEFAULT '',
        session_id String DEFAULT '',
        model String DEFAULT '',
        tags Array(String) DEFAULT [],
        start_time DateTime64(6),
        end_time Nullable(DateTime64(6)),
        event_ts DateTime64(6),
        prompt_tokens Int64 DEFAULT 0,
        completion_tokens Int64 DEFAULT 0,
        total_tokens Int64 DEFAULT 0,
        total_cost Float64 DEFAULT 0,
        latency_ms Nullable(Int64),
        input String DEFAULT '',
        output String DEFAULT '',
        metadata String DEFAULT '',
        updated_at DateTime64(6)
    )
    ENGINE = ReplacingMergeTree(updated_at)
    PARTITION BY toYYYYMM(start_time)
    ORDER BY (project_id, toDate(start_time), trace_id, span_id)
    "#,
];
