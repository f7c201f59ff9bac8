//! Export the store to snapshot documents.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{Database, DbError};

use super::config::SyncConfig;
use super::json::{JsonError, write_json_array};

pub const USERS_FILE: &str = "users.json";
pub const ROUTINES_FILE: &str = "routines.json";
pub const PLAYS_FILE: &str = "plays.json";
pub const STORE_COPY_FILE: &str = "store.db";

/// Errors that can occur during export.
#[derive(Error, Diagnostic, Debug)]
pub enum ExportError {
    #[error("Database error: {0}")]
    #[diagnostic(code(routines::sync::export::database))]
    Database(#[from] DbError),

    #[error("JSON error: {0}")]
    #[diagnostic(code(routines::sync::export::json))]
    Json(#[from] JsonError),
}

/// Writes the exported collections (and optionally a store copy) into the
/// snapshot directory of the working copy.
#[derive(Debug, Clone)]
pub struct SnapshotExporter {
    work_dir: PathBuf,
    snapshot_dir: PathBuf,
    commit_store: bool,
}

impl SnapshotExporter {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            work_dir: config.work_dir.clone(),
            snapshot_dir: config.snapshot_dir.clone(),
            commit_store: config.commit_store,
        }
    }

    /// Export and return the written paths relative to the working copy.
    /// Failures are logged and yield an empty list.
    pub async fn export<D: Database>(&self, db: &D) -> Vec<String> {
        match self.try_export(db).await {
            Ok(paths) => paths,
            Err(e) => {
                warn!(error = %e, "Snapshot export failed");
                Vec::new()
            }
        }
    }

    /// Export, surfacing the first error.
    pub async fn try_export<D: Database>(&self, db: &D) -> Result<Vec<String>, ExportError> {
        let snapshot = db.snapshot().await?;
        let dir = self.work_dir.join(&self.snapshot_dir);

        write_json_array(&dir.join(USERS_FILE), &snapshot.users)?;
        write_json_array(&dir.join(ROUTINES_FILE), &snapshot.routines)?;
        write_json_array(&dir.join(PLAYS_FILE), &snapshot.plays)?;

        let mut paths = vec![
            self.relative(USERS_FILE),
            self.relative(ROUTINES_FILE),
            self.relative(PLAYS_FILE),
        ];

        if self.commit_store {
            db.backup_to(&dir.join(STORE_COPY_FILE)).await?;
            paths.push(self.relative(STORE_COPY_FILE));
        }

        info!(
            users = snapshot.users.len(),
            routines = snapshot.routines.len(),
            plays = snapshot.plays.len(),
            store_copy = self.commit_store,
            "Snapshot exported"
        );

        Ok(paths)
    }

    /// Absolute snapshot directory.
    pub fn dir(&self) -> PathBuf {
        self.work_dir.join(&self.snapshot_dir)
    }

    fn relative(&self, file: &str) -> String {
        Path::new(&self.snapshot_dir)
            .join(file)
            .to_string_lossy()
            .into_owned()
    }
}
