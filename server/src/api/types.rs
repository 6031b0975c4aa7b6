//! Shared API types
//!
//! Error envelope, pagination and ordering used across all endpoints.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use validator::ValidationError;

/// Maximum items per page for paginated endpoints
pub const MAX_PAGE_LIMIT: u32 = 100;
/// Default page number
pub const DEFAULT_PAGE: u32 = 1;
/// Default items per page
pub const DEFAULT_LIMIT: u32 = 50;
/// Maximum delete batch size
pub const MAX_DELETE_BATCH: usize = 100;

/// Parse an optional RFC 3339 timestamp parameter.
pub fn parse_timestamp_param(s: &Option<String>) -> Result<Option<DateTime<Utc>>, ApiError> {
    match s {
        Some(ts) => DateTime::parse_from_rfc3339(ts)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| {
                ApiError::bad_request(
                    "INVALID_TIMESTAMP",
                    format!("Invalid timestamp format: {}. Use ISO 8601.", ts),
                )
            }),
        None => Ok(None),
    }
}

/// Validator function for the page parameter; pages start at 1.
pub fn validate_page(page: u32) -> Result<(), ValidationError> {
    if page < 1 {
        return Err(ValidationError::new("page_min").with_message("Page must be >= 1".into()));
    }
    Ok(())
}

/// Validator function for the limit parameter
pub fn validate_limit(limit: u32) -> Result<(), ValidationError> {
    if limit == 0 || limit > MAX_PAGE_LIMIT {
        return Err(ValidationError::new("limit_range")
            .with_message(format!("Limit must be between 1 and {}", MAX_PAGE_LIMIT).into()));
    }
    Ok(())
}

pub fn default_page() -> u32 {
    DEFAULT_PAGE
}

pub fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

/// Standard API error response
#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: String, message: String },
    Unauthorized { message: String },
    Forbidden { message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Internal { message: String, correlation_id: String },
}

impl ApiError {
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Unexpected failures get a correlation id that is both logged and
    /// returned, so a report can be matched to server logs.
    pub fn internal(source: impl std::fmt::Display) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        tracing::error!(correlation_id = %correlation_id, error = %source, "Internal error");
        Self::Internal {
            message: "An internal error occurred".to_string(),
            correlation_id,
        }
    }

    pub fn from_data(e: crate::data::DataError) -> Self {
        Self::internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, code, message, correlation_id) = match self {
            Self::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, "bad_request", code, message, None)
            }
            Self::Unauthorized { message } => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "UNAUTHORIZED".to_string(),
                message,
                None,
            ),
            Self::Forbidden { message } => (
                StatusCode::FORBIDDEN,
                "forbidden",
                "FORBIDDEN".to_string(),
                message,
                None,
            ),
            Self::NotFound { code, message } => {
                (StatusCode::NOT_FOUND, "not_found", code, message, None)
            }
            Self::Conflict { code, message } => {
                (StatusCode::CONFLICT, "conflict", code, message, None)
            }
            Self::Internal {
                message,
                correlation_id,
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "INTERNAL".to_string(),
                message,
                Some(correlation_id),
            ),
        };
        let mut body = serde_json::json!({
            "error": error_type,
            "code": code,
            "message": message,
        });
        if let Some(correlation_id) = correlation_id {
            body["correlationId"] = serde_json::Value::String(correlation_id);
        }
        (status, Json(body)).into_response()
    }
}

/// Pagination metadata in responses
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub page: u32,
    pub limit: u32,
    pub total_items: u64,
    pub total_pages: u64,
}

impl PaginationMeta {
    pub fn new(page: u32, limit: u32, total_items: u64) -> Self {
        Self {
            page,
            limit,
            total_items,
            total_pages: total_items.div_ceil(limit.max(1) as u64),
        }
    }
}

/// Generic paginated response wrapper
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, page: u32, limit: u32, total_items: u64) -> Self {
        Self {
            data,
            meta: PaginationMeta::new(page, limit, total_items),
        }
    }
}

/// `orderBy=<field>.<asc|desc>` query parameter
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub column: String,
    pub direction: OrderDirection,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub enum OrderDirection {
    #[default]
    Desc,
    Asc,
}

impl OrderBy {
    pub fn parse(s: &str, allowed_columns: &[&str]) -> Result<Self, ApiError> {
        let (column, direction) = match s.rsplit_once('.') {
            Some((col, "asc")) => (col, OrderDirection::Asc),
            Some((col, "desc")) => (col, OrderDirection::Desc),
            None => (s, OrderDirection::Desc),
            Some(_) => {
                return Err(ApiError::bad_request(
                    "INVALID_ORDER",
                    "Invalid orderBy format. Use '<field>.asc' or '<field>.desc'",
                ));
            }
        };
        if !allowed_columns.contains(&column) {
            return Err(ApiError::bad_request(
                "INVALID_ORDER_COLUMN",
                format!("Cannot order by: {}", column),
            ));
        }
        Ok(Self {
            column: column.to_string(),
            direction,
        })
    }

    /// Generate SQL with column name mapping (API aliases to DB columns).
    pub fn to_sql_mapped<F>(&self, mapper: F) -> String
    where
        F: Fn(&str) -> &str,
    {
        let dir = match self.direction {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        };
        format!("{} {}", mapper(&self.column), dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_by_parses_spec_format() {
        let order = OrderBy::parse("timestamp.asc", &["timestamp", "name"]).unwrap();
        assert_eq!(order.column, "timestamp");
        assert!(matches!(order.direction, OrderDirection::Asc));

        let order = OrderBy::parse("name", &["timestamp", "name"]).unwrap();
        assert!(matches!(order.direction, OrderDirection::Desc));

        assert!(OrderBy::parse("timestamp.sideways", &["timestamp"]).is_err());
        assert!(OrderBy::parse("secret.asc", &["timestamp"]).is_err());
    }

    #[test]
    fn order_by_maps_columns() {
        let order = OrderBy::parse("totalCost.desc", &["totalCost"]).unwrap();
        let sql = order.to_sql_mapped(|c| if c == "totalCost" { "total_cost" } else { c });
        assert_eq!(sql, "total_cost DESC");
    }

    #[test]
    fn page_and_limit_validators() {
        assert!(validate_page(0).is_err());
        assert!(validate_page(1).is_ok());
        assert!(validate_limit(0).is_err());
        assert!(validate_limit(MAX_PAGE_LIMIT).is_ok());
        assert!(validate_limit(MAX_PAGE_LIMIT + 1).is_err());
    }

    #[test]
    fn pagination_meta_rounds_up() {
        let meta = PaginationMeta::new(1, 50, 101);
        assert_eq!(meta.total_pages, 3);
        let empty = PaginationMeta::new(1, 50, 0);
        assert_eq!(empty.total_items, 0);
        assert_eq!(empty.total_pages, 0);
    }
}
