//! Git operations for the snapshot mirror.
//!
//! This module provides a trait-based abstraction over git commands
//! to enable easy mocking in tests. Every real invocation is bounded by a
//! timeout and never prompts for credentials.

use async_trait::async_trait;
use miette::Diagnostic;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[cfg(test)]
use mockall::automock;

use crate::process::{ProcessError, combined_output, run_with_timeout};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors that can occur during git operations.
#[derive(Error, Diagnostic, Debug)]
pub enum GitError {
    #[error("Git command failed: {0}")]
    #[diagnostic(code(routines::sync::git::command_failed))]
    CommandFailed(String),

    #[error("Git command returned non-zero exit code {code}: {output}")]
    #[diagnostic(code(routines::sync::git::non_zero_exit))]
    NonZeroExit { code: i32, output: String },

    #[error("Git not installed or not in PATH")]
    #[diagnostic(code(routines::sync::git::not_found))]
    GitNotFound,

    #[error("Git command timed out after {0:?}")]
    #[diagnostic(code(routines::sync::git::timed_out))]
    Timeout(Duration),
}

/// Author and committer identity for a single commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

/// Trait for git operations. Can be mocked in tests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GitOps: Send + Sync {
    /// Initialize a git repository at the given path.
    async fn init(&self, path: &Path) -> Result<Output, GitError>;

    /// Get the URL of a remote.
    async fn remote_get_url(&self, path: &Path, name: &str) -> Result<Output, GitError>;

    /// Add a remote to the repository.
    async fn add_remote(&self, path: &Path, name: &str, url: &str) -> Result<Output, GitError>;

    /// Point an existing remote at a new URL.
    async fn set_remote_url(&self, path: &Path, name: &str, url: &str) -> Result<Output, GitError>;

    /// Set a repository-local config value.
    async fn set_config(&self, path: &Path, key: &str, value: &str) -> Result<Output, GitError>;

    /// Add files to the staging area.
    async fn add_files(&self, path: &Path, files: &[String]) -> Result<Output, GitError>;

    /// Get repository status in porcelain format.
    async fn status_porcelain(&self, path: &Path) -> Result<Output, GitError>;

    /// Create a commit, optionally overriding author and committer.
    async fn commit(
        &self,
        path: &Path,
        message: &str,
        identity: Option<CommitIdentity>,
    ) -> Result<Output, GitError>;

    /// Push HEAD to `remote/branch` and set it as upstream.
    async fn push_upstream(&self, path: &Path, remote: &str, branch: &str) -> Result<Output, GitError>;

    /// Plain `git push` using whatever upstream is configured.
    async fn push(&self, path: &Path) -> Result<Output, GitError>;

    /// One-line summary of the latest commit.
    async fn last_commit(&self, path: &Path) -> Result<Output, GitError>;
}

/// Real implementation of GitOps on top of tokio's process support.
#[derive(Debug, Clone)]
pub struct RealGit {
    binary: PathBuf,
    timeout: Duration,
}

impl RealGit {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("git"),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Use a specific git executable.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Timeout for each invocation. Pushes get twice this.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Helper to run a git command and return the output.
    async fn run_git(
        &self,
        path: &Path,
        args: &[&str],
        envs: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Output, GitError> {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .current_dir(path)
            .env("GIT_TERMINAL_PROMPT", "0")
            .envs(envs.iter().copied());

        let output = run_with_timeout(&mut command, timeout)
            .await
            .map_err(|e| match e {
                ProcessError::NotFound(_) => GitError::GitNotFound,
                ProcessError::TimedOut { timeout, .. } => GitError::Timeout(timeout),
                ProcessError::Io(e) => GitError::CommandFailed(e.to_string()),
            })?;

        self.check_output(output)
    }

    async fn run(&self, path: &Path, args: &[&str]) -> Result<Output, GitError> {
        self.run_git(path, args, &[], self.timeout).await
    }

    /// Check if the output indicates success, otherwise return an error.
    fn check_output(&self, output: Output) -> Result<Output, GitError> {
        if output.status.success() {
            Ok(output)
        } else {
            Err(GitError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                output: combined_output(&output),
            })
        }
    }
}

impl Default for RealGit {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GitOps for RealGit {
    async fn init(&self, path: &Path) -> Result<Output, GitError> {
        self.run(path, &["init"]).await
    }

    async fn remote_get_url(&self, path: &Path, name: &str) -> Result<Output, GitError> {
        self.run(path, &["remote", "get-url", name]).await
    }

    async fn add_remote(&self, path: &Path, name: &str, url: &str) -> Result<Output, GitError> {
        self.run(path, &["remote", "add", name, url]).await
    }

    async fn set_remote_url(&self, path: &Path, name: &str, url: &str) -> Result<Output, GitError> {
        self.run(path, &["remote", "set-url", name, url]).await
    }

    async fn set_config(&self, path: &Path, key: &str, value: &str) -> Result<Output, GitError> {
        self.run(path, &["config", key, value]).await
    }

    async fn add_files(&self, path: &Path, files: &[String]) -> Result<Output, GitError> {
        let mut args = vec!["add", "--"];
        args.extend(files.iter().map(|s| s.as_str()));
        self.run(path, &args).await
    }

    async fn status_porcelain(&self, path: &Path) -> Result<Output, GitError> {
        self.run(path, &["status", "--porcelain"]).await
    }

    async fn commit(
        &self,
        path: &Path,
        message: &str,
        identity: Option<CommitIdentity>,
    ) -> Result<Output, GitError> {
        let envs: Vec<(&str, &str)> = match &identity {
            Some(id) => vec![
                ("GIT_AUTHOR_NAME", id.name.as_str()),
                ("GIT_AUTHOR_EMAIL", id.email.as_str()),
                ("GIT_COMMITTER_NAME", id.name.as_str()),
                ("GIT_COMMITTER_EMAIL", id.email.as_str()),
            ],
            None => Vec::new(),
        };
        self.run_git(path, &["commit", "-m", message], &envs, self.timeout)
            .await
    }

    async fn push_upstream(&self, path: &Path, remote: &str, branch: &str) -> Result<Output, GitError> {
        let refspec = format!("HEAD:{}", branch);
        self.run_git(path, &["push", "-u", remote, &refspec], &[], self.timeout * 2)
            .await
    }

    async fn push(&self, path: &Path) -> Result<Output, GitError> {
        self.run_git(path, &["push"], &[], self.timeout * 2).await
    }

    async fn last_commit(&self, path: &Path) -> Result<Output, GitError> {
        self.run(path, &["log", "-1", "--pretty=format:%h %s"]).await
    }
}
