//! Publishing snapshots to the git mirror.
//!
//! [`RepositorySync`] owns the working copy. Every step of a publish is
//! fail-open: errors are logged and the sequence either carries on or stops
//! with a failure outcome, but nothing is ever returned as an error. Repository
//! state (initialized, remote, pending changes) is re-read from the working
//! copy each time it is needed.

use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::db::Database;

use super::config::SyncConfig;
use super::export::SnapshotExporter;
use super::git::GitOps;

/// How a publish ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
    /// Sync is switched off.
    Disabled,
    /// No paths resolved.
    NothingToPublish,
    /// Nothing staged after `git add`; no commit made.
    NoChanges,
    /// `git status` failed.
    StatusFailed,
    /// Committed locally, no remote to push to.
    NoRemote,
    Pushed,
    PushFailed,
}

impl PublishOutcome {
    /// Wire name, as serialized.
    pub fn as_str(self) -> &'static str {
        match self {
            PublishOutcome::Disabled => "disabled",
            PublishOutcome::NothingToPublish => "nothing_to_publish",
            PublishOutcome::NoChanges => "no_changes",
            PublishOutcome::StatusFailed => "status_failed",
            PublishOutcome::NoRemote => "no_remote",
            PublishOutcome::Pushed => "pushed",
            PublishOutcome::PushFailed => "push_failed",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(
            self,
            PublishOutcome::NothingToPublish | PublishOutcome::NoChanges | PublishOutcome::Pushed
        )
    }
}

/// Diagnostic detail of one publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub outcome: PublishOutcome,
    pub paths: Vec<String>,
    pub committed: bool,
    pub pushed: bool,
    pub remote: Option<String>,
    pub last_commit: Option<String>,
}

impl PublishReport {
    fn new(outcome: PublishOutcome, paths: Vec<String>) -> Self {
        Self {
            outcome,
            paths,
            committed: false,
            pushed: false,
            remote: None,
            last_commit: None,
        }
    }

    pub fn success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// State of the working copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub enabled: bool,
    pub initialized: bool,
    pub work_dir: String,
    pub remote_url: Option<String>,
    /// `None` when the working copy could not be inspected.
    pub clean: Option<bool>,
    pub last_commit: Option<String>,
}

/// True when porcelain output lists at least one staged entry. Untracked
/// (`??`) and ignored (`!!`) entries and unstaged edits do not count.
pub fn has_staged_changes(porcelain: &str) -> bool {
    porcelain
        .lines()
        .filter_map(|line| line.chars().next())
        .any(|x| x != ' ' && x != '?' && x != '!')
}

fn default_message() -> String {
    format!("Snapshot {}", Utc::now().format("%Y-%m-%dT%H:%M:%SZ"))
}

fn stdout_line(output: &std::process::Output) -> Option<String> {
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// The git side of the sync.
struct Worktree<G> {
    git: G,
    config: SyncConfig,
}

impl<G: GitOps> Worktree<G> {
    fn path(&self) -> &Path {
        &self.config.work_dir
    }

    fn is_initialized(&self) -> bool {
        self.path().join(".git").exists()
    }

    /// Make sure a repository exists and its remote matches configuration.
    async fn prepare(&self) {
        if let Err(e) = std::fs::create_dir_all(self.path()) {
            warn!(step = "init", path = %self.path().display(), error = %e, "Could not create working copy");
        }

        if !self.is_initialized() {
            match self.git.init(self.path()).await {
                Ok(_) => info!(step = "init", path = %self.path().display(), "Initialized working copy"),
                Err(e) => warn!(step = "init", error = %e, "git init failed"),
            }
        }

        self.reconcile_remote().await;
    }

    async fn reconcile_remote(&self) {
        let Some(url) = self.config.remote_url.as_deref() else {
            return;
        };
        let name = self.config.remote_name.as_str();

        match self.git.remote_get_url(self.path(), name).await {
            Ok(output) if stdout_line(&output).as_deref() == Some(url) => {
                debug!(step = "remote", remote = name, "Remote already configured");
            }
            Ok(_) => match self.git.set_remote_url(self.path(), name, url).await {
                Ok(_) => info!(step = "remote", remote = name, url, "Updated remote URL"),
                Err(e) => warn!(step = "remote", remote = name, error = %e, "git remote set-url failed"),
            },
            Err(_) => match self.git.add_remote(self.path(), name, url).await {
                Ok(_) => info!(step = "remote", remote = name, url, "Added remote"),
                Err(e) => warn!(step = "remote", remote = name, error = %e, "git remote add failed"),
            },
        }
    }

    async fn remote(&self) -> Option<String> {
        self.git
            .remote_get_url(self.path(), &self.config.remote_name)
            .await
            .ok()
            .and_then(|output| stdout_line(&output))
    }

    async fn commit_and_push(&self, paths: Vec<String>, message: &str) -> PublishReport {
        let path = self.path();
        let identity = self.config.identity();

        for (key, value) in [("user.name", &identity.name), ("user.email", &identity.email)] {
            if let Err(e) = self.git.set_config(path, key, value).await {
                warn!(step = "config", key, error = %e, "git config failed");
            }
        }

        if let Err(e) = self.git.add_files(path, &paths).await {
            warn!(step = "add", paths = ?paths, error = %e, "git add failed");
        }

        let mut report = PublishReport::new(PublishOutcome::NoChanges, paths);

        match self.git.status_porcelain(path).await {
            Err(e) => {
                warn!(step = "status", error = %e, "git status failed");
                report.outcome = PublishOutcome::StatusFailed;
                return report;
            }
            Ok(output) => {
                if !has_staged_changes(&String::from_utf8_lossy(&output.stdout)) {
                    debug!(step = "status", "Nothing staged, skipping commit");
                    return report;
                }
            }
        }

        match self
            .git
            .commit(path, message, self.config.author_override())
            .await
        {
            Ok(_) => {
                info!(step = "commit", commit_message = message, "Committed snapshot");
                report.committed = true;
                report.last_commit = self
                    .git
                    .last_commit(path)
                    .await
                    .ok()
                    .and_then(|output| stdout_line(&output));
            }
            Err(e) => warn!(step = "commit", error = %e, "git commit failed"),
        }

        let Some(remote) = self.remote().await else {
            info!(step = "push", "No remote configured, keeping commit local");
            report.outcome = PublishOutcome::NoRemote;
            return report;
        };
        report.remote = Some(remote);

        let remote_name = self.config.remote_name.as_str();
        let branch = self.config.branch.as_str();
        report.pushed = match self.git.push_upstream(path, remote_name, branch).await {
            Ok(_) => true,
            Err(e) => {
                warn!(step = "push", remote = remote_name, branch, error = %e, "Push with upstream failed, retrying plain push");
                match self.git.push(path).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(step = "push", error = %e, "git push failed");
                        false
                    }
                }
            }
        };

        report.outcome = if report.pushed {
            info!(step = "push", remote = remote_name, branch, "Pushed snapshot");
            PublishOutcome::Pushed
        } else {
            PublishOutcome::PushFailed
        };
        report
    }

    async fn status(&self) -> SyncStatus {
        let mut status = SyncStatus {
            enabled: self.config.enabled,
            initialized: self.is_initialized(),
            work_dir: self.path().display().to_string(),
            ..Default::default()
        };
        if !status.initialized {
            return status;
        }

        status.remote_url = self.remote().await;
        status.clean = match self.git.status_porcelain(self.path()).await {
            Ok(output) => Some(String::from_utf8_lossy(&output.stdout).trim().is_empty()),
            Err(e) => {
                warn!(step = "status", error = %e, "git status failed");
                None
            }
        };
        status.last_commit = self
            .git
            .last_commit(self.path())
            .await
            .ok()
            .and_then(|output| stdout_line(&output));
        status
    }
}

/// Owns the git working copy and publishes snapshots to it.
pub struct RepositorySync<G: GitOps> {
    worktree: Worktree<G>,
    exporter: SnapshotExporter,
    /// Held for a whole publish so concurrent callers never interleave git steps.
    lock: Mutex<()>,
}

impl<G: GitOps + Send + Sync + 'static> RepositorySync<G> {
    pub fn new(git: G, config: SyncConfig) -> Self {
        let exporter = SnapshotExporter::new(&config);
        Self {
            worktree: Worktree { git, config },
            exporter,
            lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.worktree.config
    }

    /// Whether the working copy has a `.git` directory.
    pub fn is_initialized(&self) -> bool {
        self.worktree.is_initialized()
    }

    /// Publish and report success as a bool.
    pub async fn publish<D: Database>(
        &self,
        db: &D,
        paths: Option<Vec<String>>,
        message: Option<&str>,
        include_assets: bool,
    ) -> bool {
        self.publish_report(db, paths, message, include_assets)
            .await
            .success()
    }

    /// Export (unless `paths` is given), stage, commit and push.
    ///
    /// The media directory is staged only when both `commit_media` is
    /// configured and the caller passes `include_assets`.
    pub async fn publish_report<D: Database>(
        &self,
        db: &D,
        paths: Option<Vec<String>>,
        message: Option<&str>,
        include_assets: bool,
    ) -> PublishReport {
        let config = &self.worktree.config;
        if !config.enabled {
            debug!("Sync disabled, not publishing");
            return PublishReport::new(PublishOutcome::Disabled, Vec::new());
        }

        let _guard = self.lock.lock().await;

        self.worktree.prepare().await;

        let mut paths = match paths {
            Some(paths) => paths,
            None => self.exporter.export(db).await,
        };

        if config.commit_media && include_assets {
            if config.work_dir.join(&config.media_dir).exists() {
                paths.push(config.media_pathspec());
            } else {
                debug!(step = "add", "Media directory absent, not staging it");
            }
        }

        if paths.is_empty() {
            debug!("Nothing to publish");
            return PublishReport::new(PublishOutcome::NothingToPublish, paths);
        }

        let message = message.map(str::to_string).unwrap_or_else(default_message);
        self.worktree.commit_and_push(paths, &message).await
    }

    /// Inspect the working copy.
    pub async fn status(&self) -> SyncStatus {
        self.worktree.status().await
    }
}
