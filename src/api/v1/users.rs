//! Public endpoints: catalogue, registration and engagement tracking.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::{
    ApiResult, ErrorResponse, OkResponse, bad_request, db_failure, internal, lenient_i64,
    non_empty, not_found,
};
use crate::api::AppState;
use crate::db::{
    Database, PlayRepository, Registration, Routine, RoutineRepository, User, UserRepository,
};
use crate::sync::GitOps;

// =============================================================================
// DTOs (Data Transfer Objects)
// =============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
}

/// Routine response DTO
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoutineResponse {
    #[schema(example = 1)]
    pub id: i64,
    #[schema(example = "Morning stretch")]
    pub title: Option<String>,
    #[schema(example = "Special")]
    pub category: Option<String>,
    #[schema(example = "medium")]
    pub difficulty: Option<String>,
    /// Length in seconds
    #[schema(example = 600)]
    pub duration: Option<i64>,
    #[schema(example = "/static/videos/20250101120000_a1b2c3d4e5f6_stretch.mp4")]
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub description: Option<String>,
    pub uploaded_by: Option<i64>,
    #[schema(example = "2025-01-01 12:00:00")]
    pub uploaded_at: Option<String>,
    pub views: i64,
}

impl From<Routine> for RoutineResponse {
    fn from(r: Routine) -> Self {
        Self {
            id: r.id,
            title: r.title,
            category: r.category,
            difficulty: r.difficulty,
            duration: r.duration,
            video_url: r.video_url,
            thumbnail_url: r.thumbnail_url,
            description: r.description,
            uploaded_by: r.uploaded_by,
            uploaded_at: r.uploaded_at,
            views: r.views,
        }
    }
}

/// Account response DTO. Never carries the password hash.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    #[schema(example = 1)]
    pub id: i64,
    #[schema(example = "alice")]
    pub username: String,
    pub age: Option<i64>,
    #[schema(example = "US")]
    pub country: String,
    pub occupation: Option<String>,
    pub admin: bool,
    pub api_key: Option<String>,
    pub visits: i64,
    pub reminders_set: bool,
    pub last_seen: Option<String>,
    pub created_at: Option<String>,
    /// Present for admin accounts only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_api_key: Option<String>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        let admin_api_key = if u.admin { u.api_key.clone() } else { None };
        Self {
            id: u.id,
            username: u.username,
            age: u.age,
            country: u.country,
            occupation: u.occupation,
            admin: u.admin,
            api_key: u.api_key,
            visits: u.visits,
            reminders_set: u.reminders_set,
            last_seen: u.last_seen,
            created_at: u.created_at,
            admin_api_key,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "alice")]
    pub username: Option<String>,
    /// Unparseable ages are stored as 0
    #[serde(default, deserialize_with = "lenient_i64")]
    #[schema(example = 31)]
    pub age: Option<i64>,
    #[schema(example = "US")]
    pub country: Option<String>,
    #[schema(example = "nurse")]
    pub occupation: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IdentityRequest {
    #[schema(example = "alice")]
    pub username: Option<String>,
    #[schema(example = "US")]
    pub country: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TrackPlayRequest {
    #[schema(example = "alice")]
    pub username: Option<String>,
    #[schema(example = "US")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    #[schema(example = 1)]
    pub routine_id: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReminderRequest {
    #[schema(example = "alice")]
    pub username: Option<String>,
    #[schema(example = "US")]
    pub country: Option<String>,
    /// Defaults to enabled
    #[serde(default, deserialize_with = "lenient_i64")]
    #[schema(example = 1)]
    pub enabled: Option<i64>,
}

fn identity(
    username: Option<&str>,
    country: Option<&str>,
    message: &str,
) -> Result<(String, String), super::ApiFailure> {
    match (non_empty(username), non_empty(country)) {
        (Some(username), Some(country)) => Ok((username, country)),
        _ => Err(bad_request(message)),
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "system",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// List all routines, newest upload first
#[utoipa::path(
    get,
    path = "/api/v1/routines",
    tag = "routines",
    responses(
        (status = 200, description = "All routines", body = Vec<RoutineResponse>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn list_routines<D, G>(
    State(state): State<AppState<D, G>>,
) -> ApiResult<Vec<RoutineResponse>>
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    let routines = state.db().routines().list().await.map_err(internal)?;
    Ok(Json(routines.into_iter().map(RoutineResponse::from).collect()))
}

/// Register a user, or record a revisit of an existing one
///
/// Accounts are unique on (username, country).
#[utoipa::path(
    post,
    path = "/api/v1/register",
    tag = "users",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account after the update", body = UserResponse),
        (status = 400, description = "username and country required", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn register<D, G>(
    State(state): State<AppState<D, G>>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<UserResponse>
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    let (username, country) = identity(
        req.username.as_deref(),
        req.country.as_deref(),
        "username and country required",
    )?;

    let registration = Registration {
        username,
        country,
        age: req.age.unwrap_or(0),
        occupation: non_empty(req.occupation.as_deref()).unwrap_or_default(),
    };

    let outcome = state
        .db()
        .users()
        .register(&registration)
        .await
        .map_err(|e| db_failure(e, "user not found"))?;

    let verb = if outcome.created { "register" } else { "revisit" };
    info!(
        username = %registration.username,
        country = %registration.country,
        created = outcome.created,
        "Registered user"
    );
    state.trigger_sync(
        format!(
            "{} {}/{}",
            verb, registration.username, registration.country
        ),
        false,
    );

    Ok(Json(UserResponse::from(outcome.user)))
}

/// Record a visit
#[utoipa::path(
    post,
    path = "/api/v1/visit",
    tag = "users",
    request_body = IdentityRequest,
    responses(
        (status = 200, description = "Visit recorded", body = OkResponse),
        (status = 400, description = "username+country required", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn visit<D, G>(
    State(state): State<AppState<D, G>>,
    Json(req): Json<IdentityRequest>,
) -> ApiResult<OkResponse>
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    let (username, country) = identity(
        req.username.as_deref(),
        req.country.as_deref(),
        "username+country required",
    )?;

    let matched = state
        .db()
        .users()
        .record_visit(&username, &country)
        .await
        .map_err(internal)?;

    if matched {
        state.trigger_sync(format!("visit {}/{}", username, country), false);
    }

    Ok(Json(OkResponse::new()))
}

/// Record a play of a routine
///
/// Bumps the routine's view counter and stores the play event together.
#[utoipa::path(
    post,
    path = "/api/v1/track_play",
    tag = "users",
    request_body = TrackPlayRequest,
    responses(
        (status = 200, description = "Play recorded", body = OkResponse),
        (status = 400, description = "Missing fields", body = ErrorResponse),
        (status = 404, description = "User or routine not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn track_play<D, G>(
    State(state): State<AppState<D, G>>,
    Json(req): Json<TrackPlayRequest>,
) -> ApiResult<OkResponse>
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    let required = "username,country,routine_id required";
    let (username, country) = identity(req.username.as_deref(), req.country.as_deref(), required)?;
    let routine_id = req.routine_id.ok_or_else(|| bad_request(required))?;

    let user = state
        .db()
        .users()
        .find_by_identity(&username, &country)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("user not found"))?;

    state
        .db()
        .plays()
        .record(user.id, routine_id)
        .await
        .map_err(|e| db_failure(e, "routine not found"))?;

    state.trigger_sync(
        format!("play {} by {}/{}", routine_id, username, country),
        false,
    );

    Ok(Json(OkResponse::new()))
}

/// Turn reminders on or off
#[utoipa::path(
    post,
    path = "/api/v1/set_reminder",
    tag = "users",
    request_body = ReminderRequest,
    responses(
        (status = 200, description = "Reminder flag stored", body = OkResponse),
        (status = 400, description = "username+country required", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn set_reminder<D, G>(
    State(state): State<AppState<D, G>>,
    Json(req): Json<ReminderRequest>,
) -> ApiResult<OkResponse>
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    let (username, country) = identity(
        req.username.as_deref(),
        req.country.as_deref(),
        "username+country required",
    )?;
    let enabled = req.enabled.map(|v| v != 0).unwrap_or(true);

    let matched = state
        .db()
        .users()
        .set_reminder(&username, &country, enabled)
        .await
        .map_err(internal)?;

    if matched {
        state.trigger_sync(format!("reminder {}/{}", username, country), false);
    }

    Ok(Json(OkResponse::new()))
}
