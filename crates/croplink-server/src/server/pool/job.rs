use crate::server::{
    render::render_into,
    store::ReportStore,
    telemetry::{
        decrement_renders_inflight, increment_renders_completed, increment_renders_failed,
        record_render_duration,
    },
};
use croplink_core::{dataset::ReportDataset, types::ReportFileName};
use std::time::Instant;
use tokio::sync::oneshot;

/// One report to render and store.
#[derive(Debug)]
pub struct RenderJob {
    pub name: ReportFileName,
    pub dataset: ReportDataset,
}

impl RenderJob {
    pub const fn new(name: ReportFileName, dataset: ReportDataset) -> Self {
        Self { name, dataset }
    }

    /// Renders and stores the report.
    ///
    /// The outcome goes to the log and to metrics only. There is no channel
    /// back to the request that dispatched the job: on failure no file
    /// appears and downloads keep answering `NotFound`.
    #[tracing::instrument(name = "render", skip_all, fields(file = %self.name, rows = self.dataset.len()))]
    pub async fn run(self, store: &dyn ReportStore) {
        let start = Instant::now();
        match render_into(store, &self.name, self.dataset).await {
            Ok(bytes) => {
                increment_renders_completed();
                record_render_duration(start.elapsed().as_secs_f64() * 1_000.0);
                tracing::info!(bytes, backend = store.backend_tag(), "Report rendered");
            }
            Err(e) => {
                increment_renders_failed();
                tracing::error!(error = %e, "Report render failed, no file will be produced");
            }
        }
        decrement_renders_inflight();
    }
}

/// Messages accepted by a render worker.
#[derive(Debug)]
pub enum RenderRequest {
    Render(RenderJob),
    Shutdown { response: oneshot::Sender<()> },
}
