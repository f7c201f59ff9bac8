//! Sync module - versioned git mirror of the store.
//!
//! After each write the store is exported to JSON snapshot documents which are
//! committed to a local git working copy and pushed to a remote. Everything in
//! here is best effort: failures are logged and never reach the caller.

mod config;
mod export;
mod git;
#[cfg(test)]
mod git_test;
mod json;
mod orchestrator;
mod paths;
#[cfg(test)]
mod paths_test;
mod publisher;
#[cfg(test)]
mod publisher_test;

pub use config::{DEFAULT_AUTHOR_EMAIL, DEFAULT_AUTHOR_NAME, SyncConfig};
pub use export::{
    ExportError, PLAYS_FILE, ROUTINES_FILE, STORE_COPY_FILE, SnapshotExporter, USERS_FILE,
};
#[cfg(test)]
pub use git::MockGitOps;
pub use git::{CommitIdentity, GitError, GitOps, RealGit};
pub use json::{JsonError, write_json_array};
pub use orchestrator::{DEFAULT_QUEUE_CAPACITY, SyncJob, SyncOrchestrator};
pub use paths::{
    DB_FILE, MEDIA_DIR, SNAPSHOT_DIR, get_data_dir, get_db_path, get_media_dir, get_thumbnail_dir,
};
pub use publisher::{
    PublishOutcome, PublishReport, RepositorySync, SyncStatus, has_staged_changes,
};
