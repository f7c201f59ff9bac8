//! API route configuration.

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use super::state::AppState;
use super::v1::{
    self, AdminCredentials, AdminExistsResponse, AdminSessionResponse, ErrorResponse,
    HealthResponse, IdentityRequest, MetricsResponse, OkResponse, PromoteRequest,
    PromoteResponse, PublishRequest, PublishResponse, RegisterRequest, ReminderRequest,
    ReplaceVideoResponse, RoutineIdRequest, RoutineResponse, SyncStatusResponse,
    TrackPlayRequest, UploadFilesResponse, UploadVideoRequest, UploadVideoResponse,
    UserResponse, UserSummary,
};
use crate::db::Database;
use crate::sync::{GitOps, MEDIA_DIR};

/// Largest accepted request body, sized for video uploads.
pub const MAX_BODY_BYTES: usize = 512 * 1024 * 1024;

/// Build routes with generic database and git types.
///
/// Applies the turbofish to every handler so route tables stay readable.
macro_rules! routes {
    ($D:ty, $G:ty => {
        $($method:ident $path:literal => $($handler:ident)::+),* $(,)?
    }) => {{
        let router = Router::new();
        $(
            let router = router.route($path, $method($($handler)::+::<$D, $G>));
        )*
        router
    }};
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Routines API",
        version = "0.3.0",
        description = "Workout routine catalogue with engagement tracking and a git-mirrored store",
        license(name = "GPL-2.0")
    ),
    paths(
        v1::health,
        v1::list_routines,
        v1::register,
        v1::visit,
        v1::track_play,
        v1::set_reminder,
        v1::admin_exists,
        v1::admin_register,
        v1::admin_login,
        v1::admin_users,
        v1::admin_videos,
        v1::upload_video,
        v1::upload_file,
        v1::delete_video,
        v1::replace_video,
        v1::admin_metrics,
        v1::promote,
        v1::publish_now,
        v1::sync_status,
    ),
    components(
        schemas(
            ErrorResponse,
            OkResponse,
            HealthResponse,
            RoutineResponse,
            UserResponse,
            RegisterRequest,
            IdentityRequest,
            TrackPlayRequest,
            ReminderRequest,
            AdminExistsResponse,
            AdminCredentials,
            AdminSessionResponse,
            UserSummary,
            UploadVideoRequest,
            UploadVideoResponse,
            UploadFilesResponse,
            RoutineIdRequest,
            ReplaceVideoResponse,
            MetricsResponse,
            PromoteRequest,
            PromoteResponse,
            PublishRequest,
            PublishResponse,
            SyncStatusResponse,
        )
    ),
    tags(
        (name = "system", description = "Health endpoints"),
        (name = "routines", description = "Routine catalogue"),
        (name = "users", description = "Registration and engagement tracking"),
        (name = "admin", description = "Admin accounts and catalogue management"),
        (name = "sync", description = "Git mirror of the store")
    )
)]
pub struct ApiDoc;

/// Create the router: JSON API under `/api/v1`, uploaded media under
/// `/static/videos`, OpenAPI reference at `/docs`.
pub fn create_router<D, G>(state: AppState<D, G>) -> Router
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    let api = ApiDoc::openapi();

    let public_routes = routes!(D, G => {
        get "/routines" => v1::list_routines,
        post "/register" => v1::register,
        post "/visit" => v1::visit,
        post "/track_play" => v1::track_play,
        post "/set_reminder" => v1::set_reminder,
        get "/admin/exists" => v1::admin_exists,
        post "/admin/register" => v1::admin_register,
        post "/admin/login" => v1::admin_login,
    });

    let admin_routes = routes!(D, G => {
        get "/admin/users" => v1::admin_users,
        get "/admin/videos" => v1::admin_videos,
        post "/admin/upload_video" => v1::upload_video,
        post "/admin/upload_file" => v1::upload_file,
        post "/admin/delete_video" => v1::delete_video,
        post "/admin/replace_video" => v1::replace_video,
        get "/admin/metrics" => v1::admin_metrics,
        post "/admin/promote" => v1::promote,
        post "/admin/sync" => v1::publish_now,
        get "/admin/sync/status" => v1::sync_status,
    });

    let v1_routes = Router::new()
        .route("/health", get(v1::health))
        .merge(public_routes)
        .merge(admin_routes);

    let media = ServeDir::new(state.media().videos_dir());

    Router::new()
        .nest("/api/v1", v1_routes)
        .nest_service(&format!("/{}", MEDIA_DIR), media)
        .merge(Scalar::with_url("/docs", api))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
