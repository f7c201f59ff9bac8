//! Shared setup for the HTTP handler tests.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::api::{AppState, create_router};
use crate::db::{Database, SqliteDatabase};
use crate::media::MediaStore;
use crate::sync::{GitOps, MockGitOps, SyncConfig};

pub const BOUNDARY: &str = "routines-test-boundary";

pub struct TestApp<G: GitOps + Send + Sync + 'static> {
    pub router: Router,
    pub state: AppState<SqliteDatabase, G>,
    pub data_dir: TempDir,
}

impl<G: GitOps + Send + Sync + 'static> TestApp<G> {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    pub async fn send_raw(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    pub fn db(&self) -> &SqliteDatabase {
        self.state.db()
    }

    /// Register the first admin and return its API key.
    pub async fn admin_key(&self) -> String {
        let (status, body) = self
            .send(post_json(
                "/api/v1/admin/register",
                &json!({"username": "root", "password": "s3cret"}),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        body["api_key"].as_str().unwrap().to_string()
    }
}

async fn test_db() -> SqliteDatabase {
    let db = SqliteDatabase::in_memory()
        .await
        .expect("Failed to create test database");
    db.migrate().await;
    db
}

/// App with sync switched off and thumbnails unavailable.
pub async fn test_app() -> TestApp<MockGitOps> {
    let data_dir = TempDir::new().unwrap();
    let config = SyncConfig::default()
        .with_work_dir(data_dir.path())
        .with_enabled(false);
    app_with(MockGitOps::new(), config, data_dir).await
}

pub async fn app_with<G: GitOps + Send + Sync + 'static>(
    git: G,
    config: SyncConfig,
    data_dir: TempDir,
) -> TestApp<G> {
    let media = MediaStore::new(data_dir.path()).with_ffmpeg("/nonexistent/ffmpeg");
    let (state, _worker) = AppState::start(test_db().await, git, config, media);
    TestApp {
        router: create_router(state.clone()),
        state,
        data_dir,
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn get_as_admin(uri: &str, key: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-admin-key", key)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub fn post_json_as_admin(uri: &str, key: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-admin-key", key)
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// One part of a multipart form.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

pub fn post_multipart_as_admin(uri: &str, key: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                        name, value
                    )
                    .as_bytes(),
                );
            }
            Part::File(name, file_name, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: video/mp4\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header("x-admin-key", key)
        .body(Body::from(body))
        .unwrap()
}
