//! Health endpoint
//!
//! Reports build version plus live backend reachability: both stores are
//! probed with a trivial round-trip query, not just a local pool flag.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::api::server::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let postgres_ok = match state.transactional.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Postgres health probe failed");
            false
        }
    };
    let clickhouse_ok = match state.analytics.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "ClickHouse health probe failed");
            false
        }
    };
    let reachable = postgres_ok && clickhouse_ok;

    Json(json!({
        "status": if reachable { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "backendReachable": reachable,
        "postgres": postgres_ok,
        "clickhouse": clickhouse_ok,
    }))
}
