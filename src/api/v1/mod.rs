//! V1 API handlers.

mod admin;
mod sync;
mod users;

#[cfg(test)]
mod test_support;

pub use admin::*;
pub use sync::*;
pub use users::*;

use axum::{
    Json,
    extract::{FromRequestParts, Query},
    http::{StatusCode, request::Parts},
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;
use utoipa::ToSchema;

use crate::api::AppState;
use crate::db::{Database, DbError, User, UserRepository};
use crate::sync::GitOps;

/// Header carrying an admin API key.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Error response DTO
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    #[schema(example = "user not found")]
    pub error: String,
}

/// Plain acknowledgement
#[derive(Debug, Serialize, ToSchema)]
pub struct OkResponse {
    #[schema(example = true)]
    pub ok: bool,
}

impl OkResponse {
    pub fn new() -> Self {
        Self { ok: true }
    }
}

impl Default for OkResponse {
    fn default() -> Self {
        Self::new()
    }
}

pub type ApiFailure = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<Json<T>, ApiFailure>;

pub(crate) fn failure(status: StatusCode, message: impl Into<String>) -> ApiFailure {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub(crate) fn bad_request(message: impl Into<String>) -> ApiFailure {
    failure(StatusCode::BAD_REQUEST, message)
}

pub(crate) fn not_found(message: impl Into<String>) -> ApiFailure {
    failure(StatusCode::NOT_FOUND, message)
}

pub(crate) fn internal(e: impl std::fmt::Display) -> ApiFailure {
    failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Map a store error, naming the missing entity on 404.
pub(crate) fn db_failure(e: DbError, missing: &str) -> ApiFailure {
    match e {
        DbError::NotFound { .. } => not_found(missing),
        DbError::Validation { message } => bad_request(message),
        DbError::AlreadyExists { .. } => failure(StatusCode::CONFLICT, e.to_string()),
        _ => internal(e),
    }
}

/// Trimmed, non-empty form value.
pub(crate) fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Accepts integers given as numbers, numeric strings or booleans. Anything
/// else reads as absent.
pub(crate) fn lenient_i64<'de, De>(deserializer: De) -> Result<Option<i64>, De::Error>
where
    De: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| parse_i64(&v)))
}

pub(crate) fn parse_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct AdminKeyQuery {
    admin_key: Option<String>,
}

/// An authenticated admin, taken from the `X-Admin-Key` header or the
/// `admin_key` query parameter.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl<D, G> FromRequestParts<AppState<D, G>> for AdminUser
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    type Rejection = ApiFailure;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<D, G>,
    ) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| {
                Query::<AdminKeyQuery>::try_from_uri(&parts.uri)
                    .ok()
                    .and_then(|Query(q)| q.admin_key)
            })
            .filter(|k| !k.is_empty());

        let Some(key) = key else {
            return Err(failure(StatusCode::UNAUTHORIZED, "admin key required"));
        };

        match state.db().users().find_admin_by_key(&key).await {
            Ok(Some(user)) => Ok(AdminUser(user)),
            Ok(None) => {
                warn!("Rejected unknown admin key");
                Err(failure(StatusCode::UNAUTHORIZED, "invalid admin key"))
            }
            Err(e) => Err(internal(e)),
        }
    }
}
