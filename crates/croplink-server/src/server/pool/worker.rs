use super::job::RenderRequest;
use crate::server::store::ReportStore;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Worker task that renders queued reports one at a time.
///
/// Runs until it receives [`RenderRequest::Shutdown`] or its channel closes.
/// Jobs queued before the shutdown message are still rendered, since the
/// channel is FIFO.
pub async fn worker_loop(
    worker_id: usize,
    mut rx: mpsc::Receiver<RenderRequest>,
    store: Arc<dyn ReportStore>,
) {
    tracing::trace!("Render worker {worker_id} started");

    while let Some(request) = rx.recv().await {
        match request {
            RenderRequest::Render(job) => job.run(store.as_ref()).await,
            RenderRequest::Shutdown { response } => {
                tracing::debug!("Render worker {worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    tracing::error!("Render worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    tracing::trace!("Render worker {worker_id} stopped");
}
