//! Admin endpoints: account bootstrap, catalogue management and dashboard.
//!
//! Everything except `exists`, `register` and `login` requires an [`AdminUser`].

use std::collections::HashMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

use super::{
    AdminUser, ApiFailure, ApiResult, ErrorResponse, OkResponse, RoutineResponse, bad_request,
    db_failure, failure, internal, lenient_i64, non_empty, not_found, parse_i64,
};
use crate::api::AppState;
use crate::db::utils::{generate_api_key, hash_password, verify_password};
use crate::db::{
    Database, MediaReplacement, Metrics, NewRoutine, Routine, RoutineRepository, User,
    UserRepository,
};
use crate::sync::GitOps;

const DEFAULT_TITLE: &str = "Untitled";
const DEFAULT_CATEGORY: &str = "Special";
const DEFAULT_DIFFICULTY: &str = "medium";

// =============================================================================
// DTOs (Data Transfer Objects)
// =============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdminExistsResponse {
    pub admin_exists: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdminCredentials {
    #[schema(example = "root")]
    pub username: Option<String>,
    #[schema(example = "correct horse battery staple")]
    pub password: Option<String>,
}

/// Returned by admin registration and login. The key authenticates admin calls.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdminSessionResponse {
    pub ok: bool,
    pub admin_id: i64,
    pub api_key: String,
}

/// Account row for the admin dashboard, without credentials.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub age: Option<i64>,
    pub country: String,
    pub occupation: Option<String>,
    pub admin: bool,
    pub visits: i64,
    pub reminders_set: bool,
    pub last_seen: Option<String>,
    pub created_at: Option<String>,
}

impl From<User> for UserSummary {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            age: u.age,
            country: u.country,
            occupation: u.occupation,
            admin: u.admin,
            visits: u.visits,
            reminders_set: u.reminders_set,
            last_seen: u.last_seen,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UploadVideoRequest {
    #[schema(example = "Morning stretch")]
    pub title: Option<String>,
    #[schema(example = "Special")]
    pub category: Option<String>,
    #[schema(example = "medium")]
    pub difficulty: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    #[schema(example = 600)]
    pub duration: Option<i64>,
    #[schema(example = "https://cdn.example.com/stretch.mp4")]
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadVideoResponse {
    pub ok: bool,
    pub id: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadFilesResponse {
    pub ok: bool,
    pub video_urls: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoutineIdRequest {
    #[serde(default, deserialize_with = "lenient_i64")]
    #[schema(example = 1)]
    pub routine_id: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReplaceVideoQuery {
    /// Used when the form carries no `routine_id`
    pub routine_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReplaceVideoResponse {
    pub ok: bool,
    pub video_url: String,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MetricsResponse {
    pub total_users: i64,
    pub total_visits: i64,
    pub total_videos: i64,
    pub total_plays: i64,
    pub reminders_set: i64,
}

impl From<Metrics> for MetricsResponse {
    fn from(m: Metrics) -> Self {
        Self {
            total_users: m.total_users,
            total_visits: m.total_visits,
            total_videos: m.total_videos,
            total_plays: m.total_plays,
            reminders_set: m.reminders_set,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PromoteRequest {
    #[serde(default, deserialize_with = "lenient_i64")]
    #[schema(example = 2)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PromoteResponse {
    pub ok: bool,
    pub new_admin_key: String,
}

// =============================================================================
// Multipart
// =============================================================================

/// Uploaded files and text fields of a multipart form.
#[derive(Default)]
struct UploadForm {
    video_files: Vec<(String, Bytes)>,
    video_file: Option<(String, Bytes)>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiFailure> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| bad_request(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match (name.as_str(), field.file_name().map(str::to_string)) {
                ("video_files" | "video_file", Some(file_name)) => {
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| bad_request(e.body_text()))?;
                    // browsers send an empty part when no file was picked
                    if file_name.is_empty() {
                        continue;
                    }
                    if name == "video_files" {
                        form.video_files.push((file_name, bytes));
                    } else {
                        form.video_file = Some((file_name, bytes));
                    }
                }
                _ => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| bad_request(e.body_text()))?;
                    form.fields.insert(name, text);
                }
            }
        }

        Ok(form)
    }

    fn text(&self, name: &str) -> Option<String> {
        non_empty(self.fields.get(name).map(String::as_str))
    }

    /// `video_files` if any, else the single `video_file`.
    fn uploads(self) -> Vec<(String, Bytes)> {
        if self.video_files.is_empty() {
            self.video_file.into_iter().collect()
        } else {
            self.video_files
        }
    }
}

async fn remove_media<D, G>(state: &AppState<D, G>, routine: &Routine)
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    for url in [&routine.video_url, &routine.thumbnail_url]
        .into_iter()
        .flatten()
    {
        state.media().remove_by_url(url).await;
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Whether an admin account exists
#[utoipa::path(
    get,
    path = "/api/v1/admin/exists",
    tag = "admin",
    responses((status = 200, description = "Admin presence", body = AdminExistsResponse))
)]
#[instrument(skip(state))]
pub async fn admin_exists<D, G>(
    State(state): State<AppState<D, G>>,
) -> ApiResult<AdminExistsResponse>
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    let admin_exists = state.db().users().admin_exists().await.map_err(internal)?;
    Ok(Json(AdminExistsResponse { admin_exists }))
}

/// Register the first admin
///
/// Only allowed while no admin exists.
#[utoipa::path(
    post,
    path = "/api/v1/admin/register",
    tag = "admin",
    request_body = AdminCredentials,
    responses(
        (status = 200, description = "Admin created", body = AdminSessionResponse),
        (status = 400, description = "username and password required", body = ErrorResponse),
        (status = 403, description = "admin already exists", body = ErrorResponse)
    )
)]
#[instrument(skip(state, req))]
pub async fn admin_register<D, G>(
    State(state): State<AppState<D, G>>,
    Json(req): Json<AdminCredentials>,
) -> ApiResult<AdminSessionResponse>
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    if state.db().users().admin_exists().await.map_err(internal)? {
        return Err(failure(StatusCode::FORBIDDEN, "admin already exists"));
    }

    let (Some(username), Some(password)) = (
        non_empty(req.username.as_deref()),
        non_empty(req.password.as_deref()),
    ) else {
        return Err(bad_request("username and password required"));
    };

    let api_key = generate_api_key();
    let admin = state
        .db()
        .users()
        .create_admin(&username, &hash_password(&password), &api_key)
        .await
        .map_err(|e| match e {
            crate::db::DbError::AlreadyExists { .. } => {
                failure(StatusCode::FORBIDDEN, "admin already exists")
            }
            other => db_failure(other, "admin not found"),
        })?;

    info!(admin_id = admin.id, username = %admin.username, "Registered admin");
    state.trigger_sync(format!("admin register {}", admin.username), false);

    Ok(Json(AdminSessionResponse {
        ok: true,
        admin_id: admin.id,
        api_key,
    }))
}

/// Log in with username and password
///
/// Returns the admin's API key.
#[utoipa::path(
    post,
    path = "/api/v1/admin/login",
    tag = "admin",
    request_body = AdminCredentials,
    responses(
        (status = 200, description = "Credentials accepted", body = AdminSessionResponse),
        (status = 400, description = "Missing fields or no password set", body = ErrorResponse),
        (status = 403, description = "invalid password", body = ErrorResponse),
        (status = 404, description = "admin not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, req))]
pub async fn admin_login<D, G>(
    State(state): State<AppState<D, G>>,
    Json(req): Json<AdminCredentials>,
) -> ApiResult<AdminSessionResponse>
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    let (Some(username), Some(password)) = (
        non_empty(req.username.as_deref()),
        non_empty(req.password.as_deref()),
    ) else {
        return Err(bad_request("username and password required"));
    };

    let admin = state
        .db()
        .users()
        .find_admin_by_username(&username)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("admin not found"))?;

    let Some(hash) = admin.password_hash.as_deref().filter(|h| !h.is_empty()) else {
        return Err(bad_request(
            "this admin account does not support password login; use admin key",
        ));
    };

    if !verify_password(hash, &password) {
        warn!(username = %username, "Admin login with wrong password");
        return Err(failure(StatusCode::FORBIDDEN, "invalid password"));
    }

    let api_key = admin
        .api_key
        .clone()
        .ok_or_else(|| internal("admin account has no API key"))?;

    Ok(Json(AdminSessionResponse {
        ok: true,
        admin_id: admin.id,
        api_key,
    }))
}

/// List all accounts
#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    tag = "admin",
    responses(
        (status = 200, description = "All accounts, newest first", body = Vec<UserSummary>),
        (status = 401, description = "Missing or invalid admin key", body = ErrorResponse)
    )
)]
#[instrument(skip(state, _admin))]
pub async fn admin_users<D, G>(
    State(state): State<AppState<D, G>>,
    _admin: AdminUser,
) -> ApiResult<Vec<UserSummary>>
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    let users = state.db().users().list().await.map_err(internal)?;
    Ok(Json(users.into_iter().map(UserSummary::from).collect()))
}

/// List all routines
#[utoipa::path(
    get,
    path = "/api/v1/admin/videos",
    tag = "admin",
    responses(
        (status = 200, description = "All routines, newest first", body = Vec<RoutineResponse>),
        (status = 401, description = "Missing or invalid admin key", body = ErrorResponse)
    )
)]
#[instrument(skip(state, _admin))]
pub async fn admin_videos<D, G>(
    State(state): State<AppState<D, G>>,
    _admin: AdminUser,
) -> ApiResult<Vec<RoutineResponse>>
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    let routines = state.db().routines().list().await.map_err(internal)?;
    Ok(Json(routines.into_iter().map(RoutineResponse::from).collect()))
}

/// Add a routine that points at an external video URL
#[utoipa::path(
    post,
    path = "/api/v1/admin/upload_video",
    tag = "admin",
    request_body = UploadVideoRequest,
    responses(
        (status = 200, description = "Routine created", body = UploadVideoResponse),
        (status = 400, description = "video_url required", body = ErrorResponse),
        (status = 401, description = "Missing or invalid admin key", body = ErrorResponse)
    )
)]
#[instrument(skip(state, admin))]
pub async fn upload_video<D, G>(
    State(state): State<AppState<D, G>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<UploadVideoRequest>,
) -> ApiResult<UploadVideoResponse>
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    let video_url =
        non_empty(req.video_url.as_deref()).ok_or_else(|| bad_request("video_url required"))?;

    let routine = NewRoutine {
        title: req.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        category: req.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        difficulty: req
            .difficulty
            .unwrap_or_else(|| DEFAULT_DIFFICULTY.to_string()),
        duration: req.duration.unwrap_or(0),
        video_url,
        thumbnail_url: non_empty(req.thumbnail_url.as_deref()),
        description: req.description.unwrap_or_default(),
        uploaded_by: Some(admin.id),
    };

    let created = state
        .db()
        .routines()
        .create(&routine)
        .await
        .map_err(|e| db_failure(e, "routine not found"))?;

    state.trigger_sync(format!("add routine {}", created.id), false);

    Ok(Json(UploadVideoResponse {
        ok: true,
        id: created.id,
    }))
}

/// Upload one or more video files
///
/// Multipart form with `video_files` (repeatable) or a single `video_file`,
/// plus optional `title`, `category`, `difficulty`, `duration` and
/// `description` shared by every file. Thumbnails are generated when
/// `ffmpeg` is available.
#[utoipa::path(
    post,
    path = "/api/v1/admin/upload_file",
    tag = "admin",
    responses(
        (status = 200, description = "Files stored", body = UploadFilesResponse),
        (status = 400, description = "no video files provided", body = ErrorResponse),
        (status = 401, description = "Missing or invalid admin key", body = ErrorResponse),
        (status = 500, description = "no files were saved", body = ErrorResponse)
    )
)]
#[instrument(skip(state, admin, multipart))]
pub async fn upload_file<D, G>(
    State(state): State<AppState<D, G>>,
    AdminUser(admin): AdminUser,
    multipart: Multipart,
) -> ApiResult<UploadFilesResponse>
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    let form = UploadForm::read(multipart).await?;

    let title = form.text("title");
    let category = form
        .text("category")
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    let difficulty = form
        .text("difficulty")
        .unwrap_or_else(|| DEFAULT_DIFFICULTY.to_string());
    let duration = form
        .text("duration")
        .and_then(|d| parse_i64(&Value::String(d)))
        .unwrap_or(0);
    let description = form.text("description").unwrap_or_default();

    let uploads = form.uploads();
    if uploads.is_empty() {
        return Err(bad_request("no video files provided"));
    }

    let mut video_urls = Vec::new();
    for (file_name, bytes) in uploads {
        let stored = match state.media().save(&file_name, &bytes).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(file = %file_name, error = %e, "Failed to save upload");
                continue;
            }
        };

        let routine = NewRoutine {
            title: title.clone().unwrap_or_else(|| stored.source_name.clone()),
            category: category.clone(),
            difficulty: difficulty.clone(),
            duration,
            video_url: stored.video_url.clone(),
            thumbnail_url: stored.thumbnail_url.clone(),
            description: description.clone(),
            uploaded_by: Some(admin.id),
        };

        match state.db().routines().create(&routine).await {
            Ok(created) => {
                info!(routine_id = created.id, url = %stored.video_url, "Stored uploaded routine");
                video_urls.push(stored.video_url);
            }
            Err(e) => {
                warn!(file = %file_name, error = %e, "Failed to record upload");
                state.media().remove_by_url(&stored.video_url).await;
                if let Some(thumb) = &stored.thumbnail_url {
                    state.media().remove_by_url(thumb).await;
                }
            }
        }
    }

    if video_urls.is_empty() {
        return Err(internal("no files were saved"));
    }

    state.trigger_sync(format!("upload {} file(s)", video_urls.len()), true);

    Ok(Json(UploadFilesResponse {
        ok: true,
        video_urls,
    }))
}

/// Delete a routine and its media files
#[utoipa::path(
    post,
    path = "/api/v1/admin/delete_video",
    tag = "admin",
    request_body = RoutineIdRequest,
    responses(
        (status = 200, description = "Routine deleted", body = OkResponse),
        (status = 400, description = "routine_id required", body = ErrorResponse),
        (status = 401, description = "Missing or invalid admin key", body = ErrorResponse),
        (status = 404, description = "routine not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, _admin))]
pub async fn delete_video<D, G>(
    State(state): State<AppState<D, G>>,
    _admin: AdminUser,
    Json(req): Json<RoutineIdRequest>,
) -> ApiResult<OkResponse>
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    let routine_id = req
        .routine_id
        .ok_or_else(|| bad_request("routine_id required"))?;

    let routines = state.db().routines();
    let routine = routines
        .get(routine_id)
        .await
        .map_err(|e| db_failure(e, "routine not found"))?;
    routines
        .delete(routine_id)
        .await
        .map_err(|e| db_failure(e, "routine not found"))?;

    remove_media(&state, &routine).await;
    state.trigger_sync(format!("delete routine {}", routine_id), false);

    Ok(Json(OkResponse::new()))
}

/// Replace a routine's video file
///
/// Multipart form with `video_file` and `routine_id` (form field or query
/// parameter); optional `title` and `description` override the stored ones.
/// The previous files are removed.
#[utoipa::path(
    post,
    path = "/api/v1/admin/replace_video",
    tag = "admin",
    params(ReplaceVideoQuery),
    responses(
        (status = 200, description = "Media replaced", body = ReplaceVideoResponse),
        (status = 400, description = "routine_id or video_file missing", body = ErrorResponse),
        (status = 401, description = "Missing or invalid admin key", body = ErrorResponse),
        (status = 404, description = "routine not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, _admin, multipart))]
pub async fn replace_video<D, G>(
    State(state): State<AppState<D, G>>,
    _admin: AdminUser,
    Query(query): Query<ReplaceVideoQuery>,
    multipart: Multipart,
) -> ApiResult<ReplaceVideoResponse>
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    let form = UploadForm::read(multipart).await?;

    let routine_id = form
        .text("routine_id")
        .or_else(|| non_empty(query.routine_id.as_deref()))
        .and_then(|id| parse_i64(&Value::String(id)))
        .ok_or_else(|| bad_request("routine_id required"))?;

    let title = form.text("title");
    let description = form.text("description");
    let Some((file_name, bytes)) = form.video_file else {
        return Err(bad_request("video_file required"));
    };

    let existing = state
        .db()
        .routines()
        .get(routine_id)
        .await
        .map_err(|e| db_failure(e, "routine not found"))?;

    let stored = state.media().save(&file_name, &bytes).await.map_err(|e| {
        warn!(file = %file_name, error = %e, "Failed to save replacement");
        internal("could not save uploaded file")
    })?;

    let replacement = MediaReplacement {
        title: title
            .or_else(|| existing.title.clone())
            .unwrap_or_else(|| stored.source_name.clone()),
        description: description
            .or_else(|| existing.description.clone())
            .unwrap_or_default(),
        video_url: stored.video_url.clone(),
        thumbnail_url: stored.thumbnail_url.clone(),
    };

    if let Err(e) = state
        .db()
        .routines()
        .replace_media(routine_id, &replacement)
        .await
    {
        state.media().remove_by_url(&stored.video_url).await;
        if let Some(thumb) = &stored.thumbnail_url {
            state.media().remove_by_url(thumb).await;
        }
        return Err(db_failure(e, "routine not found"));
    }

    remove_media(&state, &existing).await;
    info!(routine_id, url = %stored.video_url, "Replaced routine media");
    state.trigger_sync(format!("replace routine {}", routine_id), true);

    Ok(Json(ReplaceVideoResponse {
        ok: true,
        video_url: stored.video_url,
        thumbnail_url: stored.thumbnail_url,
    }))
}

/// Dashboard aggregates
#[utoipa::path(
    get,
    path = "/api/v1/admin/metrics",
    tag = "admin",
    responses(
        (status = 200, description = "Aggregates", body = MetricsResponse),
        (status = 401, description = "Missing or invalid admin key", body = ErrorResponse)
    )
)]
#[instrument(skip(state, _admin))]
pub async fn admin_metrics<D, G>(
    State(state): State<AppState<D, G>>,
    _admin: AdminUser,
) -> ApiResult<MetricsResponse>
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    let metrics = state.db().metrics().await.map_err(internal)?;
    Ok(Json(MetricsResponse::from(metrics)))
}

/// Grant admin rights to an account
///
/// Issues a fresh API key for the promoted account.
#[utoipa::path(
    post,
    path = "/api/v1/admin/promote",
    tag = "admin",
    request_body = PromoteRequest,
    responses(
        (status = 200, description = "Account promoted", body = PromoteResponse),
        (status = 400, description = "user_id required", body = ErrorResponse),
        (status = 401, description = "Missing or invalid admin key", body = ErrorResponse),
        (status = 404, description = "user not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, admin))]
pub async fn promote<D, G>(
    State(state): State<AppState<D, G>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<PromoteRequest>,
) -> ApiResult<PromoteResponse>
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    let user_id = req.user_id.ok_or_else(|| bad_request("user_id required"))?;

    let new_admin_key = generate_api_key();
    state
        .db()
        .users()
        .promote(user_id, &new_admin_key)
        .await
        .map_err(|e| db_failure(e, "user not found"))?;

    info!(user_id, by = admin.id, "Promoted user to admin");
    state.trigger_sync(format!("promote user {}", user_id), false);

    Ok(Json(PromoteResponse {
        ok: true,
        new_admin_key,
    }))
}
