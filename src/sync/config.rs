//! Sync configuration.
//!
//! Read once at startup from the environment, then overridden by CLI flags
//! through the `with_*` builders. Precedence: CLI flag > env var > default.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use super::git::{CommitIdentity, DEFAULT_TIMEOUT};
use super::paths::{MEDIA_DIR, SNAPSHOT_DIR, data_dir_from};

pub const ENV_ENABLED: &str = "ROUTINES_SYNC_ENABLED";
pub const ENV_COMMIT_MEDIA: &str = "ROUTINES_SYNC_COMMIT_MEDIA";
pub const ENV_COMMIT_STORE: &str = "ROUTINES_SYNC_COMMIT_STORE";
pub const ENV_AUTHOR_NAME: &str = "ROUTINES_SYNC_AUTHOR_NAME";
pub const ENV_AUTHOR_EMAIL: &str = "ROUTINES_SYNC_AUTHOR_EMAIL";
pub const ENV_REMOTE_URL: &str = "ROUTINES_SYNC_REMOTE_URL";
pub const ENV_REMOTE_NAME: &str = "ROUTINES_SYNC_REMOTE_NAME";
pub const ENV_BRANCH: &str = "ROUTINES_SYNC_BRANCH";
pub const ENV_TIMEOUT: &str = "ROUTINES_SYNC_TIMEOUT";

pub const DEFAULT_AUTHOR_NAME: &str = "Routines Sync";
pub const DEFAULT_AUTHOR_EMAIL: &str = "sync@routines.local";
pub const DEFAULT_REMOTE_NAME: &str = "origin";
pub const DEFAULT_BRANCH: &str = "main";

/// Everything the sync subsystem needs, resolved up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub enabled: bool,
    /// Stage the media directory when a trigger asks for assets.
    pub commit_media: bool,
    /// Stage a consistent copy of the store file with every snapshot.
    pub commit_store: bool,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub remote_url: Option<String>,
    pub remote_name: String,
    pub branch: String,
    /// Per git invocation; pushes get twice this.
    pub timeout: Duration,
    /// Root of the git working copy.
    pub work_dir: PathBuf,
    /// Relative to `work_dir`.
    pub snapshot_dir: PathBuf,
    /// Relative to `work_dir`.
    pub media_dir: PathBuf,
}

impl SyncConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let flag = |key: &str, default: bool| match text(key) {
            Some(value) => parse_flag(&value).unwrap_or_else(|| {
                warn!(key, value = %value, "Unrecognised boolean, using default");
                default
            }),
            None => default,
        };

        let timeout = match text(ENV_TIMEOUT) {
            Some(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    warn!(key = ENV_TIMEOUT, value = %value, "Invalid timeout, using default");
                    DEFAULT_TIMEOUT
                }
            },
            None => DEFAULT_TIMEOUT,
        };

        Self {
            enabled: flag(ENV_ENABLED, true),
            commit_media: flag(ENV_COMMIT_MEDIA, false),
            commit_store: flag(ENV_COMMIT_STORE, false),
            author_name: text(ENV_AUTHOR_NAME),
            author_email: text(ENV_AUTHOR_EMAIL),
            remote_url: text(ENV_REMOTE_URL),
            remote_name: text(ENV_REMOTE_NAME).unwrap_or_else(|| DEFAULT_REMOTE_NAME.to_string()),
            branch: text(ENV_BRANCH).unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            timeout,
            work_dir: data_dir_from(&lookup),
            snapshot_dir: PathBuf::from(SNAPSHOT_DIR),
            media_dir: PathBuf::from(MEDIA_DIR),
        }
    }

    /// Set the working copy root.
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_commit_media(mut self, commit_media: bool) -> Self {
        self.commit_media = commit_media;
        self
    }

    pub fn with_commit_store(mut self, commit_store: bool) -> Self {
        self.commit_store = commit_store;
        self
    }

    pub fn with_remote_url(mut self, url: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = Some(name.into());
        self.author_email = Some(email.into());
        self
    }

    /// Repository-local identity: configured values, falling back to defaults.
    pub fn identity(&self) -> CommitIdentity {
        CommitIdentity {
            name: self
                .author_name
                .clone()
                .unwrap_or_else(|| DEFAULT_AUTHOR_NAME.to_string()),
            email: self
                .author_email
                .clone()
                .unwrap_or_else(|| DEFAULT_AUTHOR_EMAIL.to_string()),
        }
    }

    /// Per-commit override, only when an author was configured explicitly.
    pub fn author_override(&self) -> Option<CommitIdentity> {
        if self.author_name.is_none() && self.author_email.is_none() {
            return None;
        }
        Some(self.identity())
    }

    /// Media directory as a git pathspec.
    pub fn media_pathspec(&self) -> String {
        self.media_dir.to_string_lossy().into_owned()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
