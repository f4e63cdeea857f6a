//! Bounded pool of render workers.
//!
//! [`RenderPool`] owns a fixed set of worker tasks, each listening on its own
//! bounded [`mpsc`] channel. Dispatch is round-robin and never waits: if the
//! chosen worker's queue is full the next one is tried, and when every queue
//! is full the job is rejected with [`Error::Saturated`]. The triggering
//! request therefore still returns immediately, either accepted or refused.

use super::{
    job::{RenderJob, RenderRequest},
    worker::worker_loop,
};
use crate::server::store::ReportStore;
use core::time::Duration;
use croplink_core::{Error, Result};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    time::timeout,
};
use tokio_util::sync::CancellationToken;

pub struct RenderPool {
    workers: Vec<mpsc::Sender<RenderRequest>>,
    next_worker: AtomicUsize,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl RenderPool {
    /// Spawns `num_workers` workers with `queue_depth` slots each.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        num_workers: usize,
        queue_depth: usize,
        store: Arc<dyn ReportStore>,
        shutdown_timeout: Duration,
    ) -> Self {
        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let (tx, rx) = mpsc::channel(queue_depth.max(1));
            workers.push(tx);
            tokio::spawn(worker_loop(worker_id, rx, Arc::clone(&store)));
        }

        Self {
            workers,
            next_worker: AtomicUsize::new(0),
            shutdown_token: CancellationToken::new(),
            shutdown_timeout,
        }
    }

    /// Returns the index of the next worker to receive work (round-robin).
    pub fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Queues `job` on the first worker with room, starting at the
    /// round-robin position.
    ///
    /// # Errors
    ///
    /// - [`Error::ServiceShutdown`] once shutdown has started.
    /// - [`Error::Saturated`] if every worker queue is full.
    /// - [`Error::ChannelError`] if a worker has stopped.
    pub fn try_dispatch(&self, job: RenderJob) -> Result<()> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }

        let start = self.next_worker_index();
        let mut request = RenderRequest::Render(job);
        for offset in 0..self.workers.len() {
            let worker_idx = (start + offset) % self.workers.len();
            match self.workers[worker_idx].try_send(request) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(returned)) => request = returned,
                Err(TrySendError::Closed(_)) => {
                    return Err(Error::ChannelError {
                        context: format!("Render worker {worker_idx} channel closed"),
                    });
                }
            }
        }

        tracing::warn!(workers = self.workers.len(), "All render queues are full");
        Err(Error::Saturated)
    }

    /// Stops accepting jobs and shuts the workers down.
    ///
    /// Each worker finishes the jobs already in its queue, then acknowledges.
    /// Workers that do not acknowledge within the shutdown timeout are left
    /// behind; their renders may be cut short when the runtime stops.
    pub async fn shutdown(&self) {
        tracing::info!("Refusing new renders");
        self.shutdown_token.cancel();

        let acks = self.workers.iter().enumerate().map(|(i, worker)| async move {
            let (tx, rx) = oneshot::channel();
            let drained = timeout(self.shutdown_timeout, async {
                worker
                    .send(RenderRequest::Shutdown { response: tx })
                    .await
                    .map_err(|e| e.to_string())?;
                rx.await.map_err(|e| e.to_string())
            })
            .await;

            match drained {
                Ok(Ok(())) => tracing::trace!("Render worker {i} shutdown acknowledged"),
                Ok(Err(e)) => tracing::error!("Render worker {i} returned error: {e}"),
                Err(_) => tracing::warn!("Render worker {i} shutdown timed out"),
            }
        });

        futures::future::join_all(acks).await;

        tracing::info!("Render pool shutdown complete");
    }
}
