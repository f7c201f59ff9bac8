//! Background publishing after store mutations.
//!
//! Handlers call [`SyncOrchestrator::trigger`] once their write has committed.
//! Jobs go onto a bounded queue drained by a single worker task, which makes
//! that worker the only writer of the working copy. The call never blocks and
//! never fails the caller. A job dropped on a full queue still leaves its
//! asset request behind for the next job the worker runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::db::Database;

use super::git::GitOps;
use super::publisher::RepositorySync;

pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// One queued publish request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub message: String,
    pub include_assets: bool,
}

/// Handle for queueing publishes. Cloning shares the queue; the worker stops
/// once every handle is dropped and the queue is drained.
#[derive(Debug, Clone)]
pub struct SyncOrchestrator {
    sender: mpsc::Sender<SyncJob>,
    /// Set when an asset-bearing job could not be queued.
    assets_pending: Arc<AtomicBool>,
}

impl SyncOrchestrator {
    /// Start the worker and return a handle to it.
    pub fn spawn<D, G>(
        db: Arc<D>,
        sync: Arc<RepositorySync<G>>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>)
    where
        D: Database + 'static,
        G: GitOps + Send + Sync + 'static,
    {
        let (sender, mut receiver) = mpsc::channel::<SyncJob>(capacity.max(1));
        let assets_pending = Arc::new(AtomicBool::new(false));
        let pending = Arc::clone(&assets_pending);

        let worker = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                let include_assets = job.include_assets | pending.swap(false, Ordering::AcqRel);
                let ok = sync
                    .publish(db.as_ref(), None, Some(&job.message), include_assets)
                    .await;
                if ok {
                    debug!(message = %job.message, "Sync job finished");
                } else {
                    warn!(message = %job.message, "Sync job did not reach the remote");
                }
            }
            info!("Sync worker stopped");
        });

        (
            Self {
                sender,
                assets_pending,
            },
            worker,
        )
    }

    /// Queue a publish. A full queue drops the job: the queued jobs will
    /// export the newer state anyway, and pick up its asset request.
    pub fn trigger(&self, message: impl Into<String>, include_assets: bool) {
        let job = SyncJob {
            message: message.into(),
            include_assets,
        };

        match self.sender.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                if job.include_assets {
                    self.assets_pending.store(true, Ordering::Release);
                }
                warn!(
                    message = %job.message,
                    include_assets = job.include_assets,
                    "Sync queue full, dropping job"
                );
            }
            Err(TrySendError::Closed(job)) => {
                warn!(message = %job.message, "Sync worker stopped, dropping job");
            }
        }
    }
}
