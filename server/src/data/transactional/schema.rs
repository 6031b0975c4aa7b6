//! PostgreSQL schema
//!
//! Applied in one shot on a fresh database; versioned migrations evolve it
//! afterwards. All entity tables are keyed `(project_id, id)`.

pub const SCHEMA_VERSION: i32 = 1;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS organizations (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_projects_org ON projects(organization_id);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT,
    display_name TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS organization_memberships (
    organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (organization_id, user_id)
);

CREATE TABLE IF NOT EXISTS project_memberships (
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (project_id, user_id)
);

CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    project_id TEXT REFERENCES projects(id) ON DELETE CASCADE,
    scope TEXT NOT NULL,
    access_level TEXT NOT NULL DEFAULT 'all',
    public_key TEXT NOT NULL UNIQUE,
    hashed_secret_key TEXT NOT NULL UNIQUE,
    display_secret_key TEXT NOT NULL,
    note TEXT,
    last_used_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_api_keys_hash ON api_keys(hashed_secret_key);

CREATE TABLE IF NOT EXISTS trace_sessions (
    id TEXT NOT NULL,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    created_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (project_id, id)
);

CREATE TABLE IF NOT EXISTS traces (
    id TEXT NOT NULL,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT,
    user_id TEXT,
    session_id TEXT,
    input TEXT,
    output TEXT,
    metadata TEXT,
    release TEXT,
    version TEXT,
    tags TEXT,
    public BOOLEAN NOT NULL DEFAULT FALSE,
    bookmarked BOOLEAN NOT NULL DEFAULT FALSE,
    environment TEXT NOT NULL DEFAULT 'default',
    timestamp TIMESTAMPTZ NOT NULL,
    event_ts TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (project_id, id)
);
CREATE INDEX IF NOT EXISTS idx_traces_session ON traces(project_id, session_id);
CREATE INDEX IF NOT EXISTS idx_traces_timestamp ON traces(project_id, timestamp);

CREATE TABLE IF NOT EXISTS observations (
    id TEXT NOT NULL,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    trace_id TEXT,
    parent_observation_id TEXT,
    observation_type TEXT NOT NULL,
    name TEXT,
    level TEXT NOT NULL DEFAULT 'DEFAULT',
    status_message TEXT,
    start_time TIMESTAMPTZ NOT NULL,
    end_time TIMESTAMPTZ,
    completion_start_time TIMESTAMPTZ,
    input TEXT,
    output TEXT,
    metadata TEXT,
    model TEXT,
    model_parameters TEXT,
    usage_details TEXT,
    cost_details TEXT,
    prompt_tokens BIGINT NOT NULL DEFAULT 0,
    completion_tokens BIGINT NOT NULL DEFAULT 0,
    total_tokens BIGINT NOT NULL DEFAULT 0,
    unit TEXT,
    version TEXT,
    environment TEXT NOT NULL DEFAULT 'default',
    prompt_id TEXT,
    event_ts TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (project_id, id)
);
CREATE INDEX IF NOT EXISTS idx_observations_trace ON observations(project_id, trace_id);
CREATE INDEX IF NOT EXISTS idx_observations_start ON observations(project_id, start_time);

CREATE TABLE IF NOT EXISTS scores (
    id TEXT NOT NULL,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    source TEXT NOT NULL DEFAULT 'API',
    data_type TEXT NOT NULL,
    value DOUBLE PRECISION,
    string_value TEXT,
    comment TEXT,
    metadata TEXT,
    config_id TEXT,
    author_user_id TEXT,
    queue_id TEXT,
    trace_id TEXT,
    session_id TEXT,
    dataset_run_id TEXT,
    observation_id TEXT,
    environment TEXT NOT NULL DEFAULT 'default',
    timestamp TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (project_id, id)
);
CREATE INDEX IF NOT EXISTS idx_scores_trace ON scores(project_id, trace_id);

CREATE TABLE IF NOT EXISTS prompts (
    id TEXT NOT NULL,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    version INTEGER NOT NULL,
    prompt_type TEXT NOT NULL,
    prompt TEXT NOT NULL,
    config TEXT,
    labels TEXT,
    tags TEXT,
    is_active BOOLEAN NOT NULL DEFAULT FALSE,
    created_by TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (project_id, id),
    UNIQUE (project_id, name, version)
);

CREATE TABLE IF NOT EXISTS media (
    id TEXT NOT NULL,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    sha256_hash TEXT NOT NULL,
    content_type TEXT NOT NULL,
    content_length BIGINT NOT NULL,
    bucket_name TEXT NOT NULL,
    bucket_path TEXT NOT NULL,
    upload_http_status INTEGER,
    upload_http_error TEXT,
    uploaded_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (project_id, id),
    UNIQUE (project_id, sha256_hash, content_type, content_length)
);

CREATE TABLE IF NOT EXISTS trace_media (
    project_id TEXT NOT NULL,
    trace_id TEXT NOT NULL,
    media_id TEXT NOT NULL,
    field TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (project_id, trace_id, media_id, field),
    FOREIGN KEY (project_id, media_id) REFERENCES media(project_id, id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS observation_media (
    project_id TEXT NOT NULL,
    trace_id TEXT NOT NULL,
    observation_id TEXT NOT NULL,
    media_id TEXT NOT NULL,
    field TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (project_id, observation_id, media_id, field),
    FOREIGN KEY (project_id, media_id) REFERENCES media(project_id, id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY,
    version INTEGER NOT NULL,
    applied_at BIGINT NOT NULL,
    description TEXT
);
"#;
