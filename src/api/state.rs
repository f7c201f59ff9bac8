//! Application state for the API server.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::db::Database;
use crate::media::MediaStore;
use crate::sync::{DEFAULT_QUEUE_CAPACITY, GitOps, RepositorySync, SyncConfig, SyncOrchestrator};

/// Shared application state.
///
/// Generic over `D: Database` and `G: GitOps` so tests can run handlers
/// against an in-memory store and a mocked git.
pub struct AppState<D: Database, G: GitOps + Send + Sync> {
    db: Arc<D>,
    sync: Arc<RepositorySync<G>>,
    orchestrator: SyncOrchestrator,
    media: MediaStore,
}

// Manual Clone impl - only the Arcs are cloned, D and G need not be Clone
impl<D: Database, G: GitOps + Send + Sync> Clone for AppState<D, G> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            sync: Arc::clone(&self.sync),
            orchestrator: self.orchestrator.clone(),
            media: self.media.clone(),
        }
    }
}

impl<D, G> AppState<D, G>
where
    D: Database + 'static,
    G: GitOps + Send + Sync + 'static,
{
    /// Assemble state from already running parts.
    pub fn new(
        db: Arc<D>,
        sync: Arc<RepositorySync<G>>,
        orchestrator: SyncOrchestrator,
        media: MediaStore,
    ) -> Self {
        Self {
            db,
            sync,
            orchestrator,
            media,
        }
    }

    /// Build state and spawn the sync worker. Must be called inside a tokio runtime.
    pub fn start(db: D, git: G, config: SyncConfig, media: MediaStore) -> (Self, JoinHandle<()>) {
        let db = Arc::new(db);
        let sync = Arc::new(RepositorySync::new(git, config));
        let (orchestrator, worker) =
            SyncOrchestrator::spawn(Arc::clone(&db), Arc::clone(&sync), DEFAULT_QUEUE_CAPACITY);

        (Self::new(db, sync, orchestrator, media), worker)
    }

    pub fn db(&self) -> &D {
        &self.db
    }

    pub fn sync(&self) -> &RepositorySync<G> {
        &self.sync
    }

    /// Queue a background publish after a committed write.
    pub fn trigger_sync(&self, message: impl Into<String>, include_assets: bool) {
        self.orchestrator.trigger(message, include_assets);
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }
}
