//! PostgreSQL migration management

use sqlx::PgPool;

use crate::data::DataError;

use super::schema::{SCHEMA, SCHEMA_VERSION};

/// Run all pending migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DataError> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = 'public'
            AND table_name = 'schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        tracing::debug!("Applying initial PostgreSQL schema v{}", SCHEMA_VERSION);
        apply_initial_schema(pool).await?;
        return Ok(());
    }

    let current_version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version WHERE id = 1")
            .fetch_optional(pool)
            .await?;

    match current_version {
        None => {
            apply_initial_schema(pool).await?;
        }
        Some(v) if v < SCHEMA_VERSION => {
            tracing::debug!("Migrating PostgreSQL schema from v{} to v{}", v, SCHEMA_VERSION);
            for version in (v + 1)..=SCHEMA_VERSION {
                apply_versioned_migration(pool, version).await?;
            }
        }
        Some(v) if v > SCHEMA_VERSION => {
            tracing::warn!(
                "PostgreSQL schema version {} is newer than application version {}",
                v,
                SCHEMA_VERSION
            );
        }
        _ => {
            tracing::debug!("PostgreSQL schema is up to date (v{})", SCHEMA_VERSION);
        }
    }

    Ok(())
}

async fn apply_initial_schema(pool: &PgPool) -> Result<(), DataError> {
    let now = chrono::Utc::now().timestamp();

    sqlx::query(SCHEMA).execute(pool).await?;

    sqlx::query(
        "INSERT INTO schema_version (id, version, applied_at, description)
         VALUES (1, $1, $2, 'Initial schema')
         ON CONFLICT (id) DO UPDATE SET version = $1, applied_at = $2",
    )
    .bind(SCHEMA_VERSION)
    .bind(now)
    .execute(pool)
    .await?;

    tracing::debug!("PostgreSQL schema v{} applied", SCHEMA_VERSION);
    Ok(())
}

/// Add new migrations here as the schema evolves. Schema v1 is applied via
/// the SCHEMA constant, so no versioned migrations exist yet.
async fn apply_versioned_migration(pool: &PgPool, version: i32) -> Result<(), DataError> {
    let _ = pool;
    Err(DataError::MigrationFailed {
        backend: "postgres",
        version,
        name: "unknown".to_string(),
        error: format!("No migration defined for version {}", version),
    })
}
