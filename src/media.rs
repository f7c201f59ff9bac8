//! Uploaded media files and thumbnail extraction.
//!
//! Files live under `<data dir>/static/videos` and are addressed by URL
//! (`/static/videos/<name>`). Thumbnails are produced by an external `ffmpeg`;
//! a missing tool, a timeout or a failed run just means no thumbnail.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use miette::Diagnostic;
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::process::run_with_timeout;
use crate::sync::{MEDIA_DIR, get_media_dir, get_thumbnail_dir};

pub const THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(20);

/// Errors from storing media.
#[derive(Error, Diagnostic, Debug)]
pub enum MediaError {
    #[error("IO error: {0}")]
    #[diagnostic(code(routines::media::io))]
    Io(#[from] std::io::Error),
}

/// A saved upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    /// Sanitized upload name, used as a fallback title.
    pub source_name: String,
    pub file_name: String,
    pub video_url: String,
    pub thumbnail_url: Option<String>,
}

/// `<UTC yyyymmddHHMMSS>_<12 hex chars>_<sanitized name>`.
pub fn stored_file_name(original: &str) -> String {
    let mut bytes = [0u8; 6];
    OsRng.fill_bytes(&mut bytes);
    let random: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();

    format!(
        "{}_{}_{}",
        Utc::now().format("%Y%m%d%H%M%S"),
        random,
        sanitize_name(original)
    )
}

fn sanitize_name(original: &str) -> String {
    let cleaned: String = sanitize_filename::sanitize(original)
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Grab one frame at 00:00:01 into `thumb`. True only if `thumb` exists afterwards.
pub async fn extract_thumbnail(
    ffmpeg: &Path,
    video: &Path,
    thumb: &Path,
    timeout: Duration,
) -> bool {
    let mut command = Command::new(ffmpeg);
    command
        .arg("-y")
        .args(["-ss", "00:00:01"])
        .arg("-i")
        .arg(video)
        .args(["-vframes", "1", "-q:v", "2"])
        .arg(thumb);

    if let Err(e) = run_with_timeout(&mut command, timeout).await {
        warn!(video = %video.display(), error = %e, "Thumbnail extraction failed");
    }

    thumb.exists()
}

/// Stores uploads under the data directory.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    ffmpeg: PathBuf,
    thumbnail_timeout: Duration,
}

impl MediaStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into(),
            ffmpeg: PathBuf::from("ffmpeg"),
            thumbnail_timeout: THUMBNAIL_TIMEOUT,
        }
    }

    pub fn with_ffmpeg(mut self, ffmpeg: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self
    }

    /// Directory served at `/static/videos`.
    pub fn videos_dir(&self) -> PathBuf {
        get_media_dir(&self.root)
    }

    /// Save an upload and try to produce its thumbnail.
    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<StoredMedia, MediaError> {
        let videos = self.videos_dir();
        let thumbs = get_thumbnail_dir(&self.root);
        tokio::fs::create_dir_all(&thumbs).await?;

        let source_name = sanitize_name(original_name);
        let file_name = stored_file_name(original_name);
        let video_path = videos.join(&file_name);
        tokio::fs::write(&video_path, bytes).await?;
        info!(file = %file_name, size = bytes.len(), "Saved upload");

        let thumb_name = format!("{}.jpg", file_name);
        let thumb_path = thumbs.join(&thumb_name);
        let created = extract_thumbnail(
            &self.ffmpeg,
            &video_path,
            &thumb_path,
            self.thumbnail_timeout,
        )
        .await;

        Ok(StoredMedia {
            video_url: format!("/{}/{}", MEDIA_DIR, file_name),
            thumbnail_url: created.then(|| format!("/{}/thumbnails/{}", MEDIA_DIR, thumb_name)),
            source_name,
            file_name,
        })
    }

    /// Map a media URL to its file. Only URLs inside the media directory
    /// without parent or root components resolve.
    pub fn path_for_url(&self, url: &str) -> Option<PathBuf> {
        let relative = Path::new(url.strip_prefix('/')?);
        if !relative.starts_with(MEDIA_DIR) {
            return None;
        }
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }

    /// Delete the file behind a media URL. Missing files and foreign URLs are ignored.
    pub async fn remove_by_url(&self, url: &str) {
        let Some(path) = self.path_for_url(url) else {
            debug!(url, "Not a local media URL, nothing to remove");
            return;
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => info!(path = %path.display(), "Removed media file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Could not remove media file"),
        }
    }
}
