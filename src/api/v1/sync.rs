//! Sync API endpoints.
//!
//! Manual access to the git mirror. Unlike the background publishes these
//! return the diagnostic detail of the run.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::{AdminUser, ApiResult, ErrorResponse};
use crate::api::AppState;
use crate::db::Database;
use crate::sync::{GitOps, PublishReport, SyncStatus};

/// Request for a manual publish
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PublishRequest {
    /// Commit message (defaults to a timestamped snapshot message)
    #[schema(example = "Manual snapshot")]
    pub message: Option<String>,

    /// Also stage the media directory, if media commits are enabled
    #[serde(default)]
    #[schema(example = false)]
    pub include_assets: bool,
}

/// Outcome of a manual publish
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PublishResponse {
    /// True when the mirror is up to date with the store
    pub success: bool,
    /// disabled, nothing_to_publish, no_changes, status_failed, no_remote,
    /// pushed or push_failed
    #[schema(example = "pushed")]
    pub outcome: String,
    /// Paths passed to `git add`, relative to the working copy
    pub paths: Vec<String>,
    pub committed: bool,
    pub pushed: bool,
    #[schema(example = "origin")]
    pub remote: Option<String>,
    #[schema(example = "a1b2c3d register alice/US")]
    pub last_commit: Option<String>,
}

impl From<PublishReport> for PublishResponse {
    fn from(r: PublishReport) -> Self {
        Self {
            success: r.success(),
            outcome: r.outcome.as_str().to_string(),
            paths: r.paths,
            committed: r.committed,
            pushed: r.pushed,
            remote: r.remote,
            last_commit: r.last_commit,
        }
    }
}

/// State of the git working copy
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncStatusResponse {
    pub enabled: bool,
    pub initialized: bool,
    pub work_dir: String,
    pub remote_url: Option<String>,
    /// Absent when the working copy could not be inspected
    pub clean: Option<bool>,
    pub last_commit: Option<String>,
}

impl From<SyncStatus> for SyncStatusResponse {
    fn from(s: SyncStatus) -> Self {
        Self {
            enabled: s.enabled,
            initialized: s.initialized,
            work_dir: s.work_dir,
            remote_url: s.remote_url,
            clean: s.clean,
            last_commit: s.last_commit,
        }
    }
}

/// Publish a snapshot now
///
/// Runs the full export, commit and push sequence and reports each step.
/// Waits for any background publish in progress.
#[utoipa::path(
    post,
    path = "/api/v1/admin/sync",
    tag = "sync",
    request_body = PublishRequest,
    responses(
        (status = 200, description = "Publish finished (see outcome)", body = PublishResponse),
        (status = 401, description = "Missing or invalid admin key", body = ErrorResponse)
    )
)]
#[instrument(skip(state, admin))]
pub async fn publish_now<D, G>(
    State(state): State<AppState<D, G>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<PublishRequest>,
) -> ApiResult<PublishResponse>
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    info!(by = admin.id, "Manual publish requested");
    let report = state
        .sync()
        .publish_report(state.db(), None, req.message.as_deref(), req.include_assets)
        .await;

    Ok(Json(PublishResponse::from(report)))
}

/// Inspect the git working copy
#[utoipa::path(
    get,
    path = "/api/v1/admin/sync/status",
    tag = "sync",
    responses(
        (status = 200, description = "Working copy state", body = SyncStatusResponse),
        (status = 401, description = "Missing or invalid admin key", body = ErrorResponse)
    )
)]
#[instrument(skip(state, _admin))]
pub async fn sync_status<D, G>(
    State(state): State<AppState<D, G>>,
    _admin: AdminUser,
) -> ApiResult<SyncStatusResponse>
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    Ok(Json(SyncStatusResponse::from(state.sync().status().await)))
}
