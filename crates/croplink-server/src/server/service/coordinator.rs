//! Report generation and retrieval.
//!
//! [`ReportCoordinator`] owns the two halves of the polling flow:
//!
//! - [`start_generation`](ReportCoordinator::start_generation) validates the
//!   request, fetches the rows, draws a fresh stamp and dispatches the
//!   render. It answers as soon as the render is handed off.
//! - [`fetch_generated_file`](ReportCoordinator::fetch_generated_file)
//!   rebuilds the key from the raw request values and opens the newest file
//!   carrying it.
//!
//! Per key there are only two observable states: no file yet, or one or
//! more files. In-progress and failed renders look the same as "no file
//! yet".

use crate::server::{
    config::ServerConfig,
    history::HistorySource,
    pool::{RenderDispatcher, job::RenderJob},
    store::{ReportStore, StoredReport},
    telemetry::{
        increment_downloads_missing, increment_downloads_served, increment_reports_requested,
    },
};
use croplink_core::{
    Error, Result,
    dataset::ReportDataset,
    stamp::StampGenerator,
    types::{ReportFileName, ReportKey, ReportKind, ReportRequest},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const IN_PROGRESS_MESSAGE: &str = "Report generation in progress...";

/// Report parameters exactly as received on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportParams {
    pub kind: ReportKind,
    pub entity_a: String,
    pub entity_b: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl ReportParams {
    /// Parses dates and identifiers; used by the trigger side.
    pub fn request(&self) -> Result<ReportRequest> {
        ReportRequest::parse(
            self.kind,
            &self.entity_a,
            &self.entity_b,
            self.start_date.as_deref(),
            self.end_date.as_deref(),
        )
    }

    /// Keeps the raw date text; used by the download side.
    pub fn raw_key(&self) -> Result<ReportKey> {
        ReportKey::from_raw(
            self.kind,
            &self.entity_a,
            &self.entity_b,
            self.start_date.as_deref(),
            self.end_date.as_deref(),
        )
    }
}

/// Answer to a generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub message: String,
    pub download_url: String,
}

#[derive(Clone)]
pub struct ReportCoordinator {
    history: Arc<dyn HistorySource>,
    store: Arc<dyn ReportStore>,
    dispatcher: Arc<RenderDispatcher>,
    stamps: Arc<StampGenerator>,
    public_base_url: Arc<str>,
}

impl ReportCoordinator {
    /// Must be called from within a Tokio runtime when `render_workers > 0`.
    pub fn new(
        config: &ServerConfig,
        history: Arc<dyn HistorySource>,
        store: Arc<dyn ReportStore>,
    ) -> Self {
        let dispatcher = RenderDispatcher::from_config(config, Arc::clone(&store));
        Self {
            history,
            store,
            dispatcher: Arc::new(dispatcher),
            stamps: Arc::new(StampGenerator::default()),
            public_base_url: Arc::from(config.public_base_url.trim_end_matches('/')),
        }
    }

    /// Starts a render for `params` and returns without waiting for it.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for malformed identifiers or dates.
    /// - `NotFound` if the system of record has no such series.
    /// - `Saturated` / `ServiceShutdown` if the render pool refuses the job.
    ///
    /// A render that fails after dispatch is not an error here; see
    /// [`RenderJob::run`].
    #[tracing::instrument(skip_all, fields(kind = %params.kind, entity_a = %params.entity_a, entity_b = %params.entity_b))]
    pub async fn start_generation(&self, params: &ReportParams) -> Result<Acknowledgement> {
        let request = params.request()?;
        let dataset = self.history.fetch(&request).await?;

        let name = ReportFileName::new(request.key(), self.stamps.next_stamp());
        tracing::info!(file = %name, rows = dataset.len(), "Dispatching report render");
        self.dispatcher.dispatch(RenderJob::new(name, dataset))?;
        increment_reports_requested();

        Ok(Acknowledgement {
            message: IN_PROGRESS_MESSAGE.to_string(),
            download_url: self.download_url(&request),
        })
    }

    /// Opens the newest generated file for `params`.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for identifiers or date text unfit for a file name.
    /// - `NotFound` when no file exists yet for the key. A failed render
    ///   also ends up here.
    /// - `Storage` when the report directory cannot be listed or read.
    #[tracing::instrument(skip_all, fields(kind = %params.kind, entity_a = %params.entity_a, entity_b = %params.entity_b))]
    pub async fn fetch_generated_file(&self, params: &ReportParams) -> Result<StoredReport> {
        let key = params.raw_key()?;
        let Some(name) = self.latest_file_name(&key).await? else {
            increment_downloads_missing();
            tracing::debug!(key = %key, "No generated report yet");
            return Err(Error::not_found(format!("generated report for {key}")));
        };

        let report = self.store.open(&name).await?;
        increment_downloads_served();
        tracing::info!(file = %report.name, bytes = report.len, "Serving report");
        Ok(report)
    }

    /// Name of the newest file for `key`, by embedded stamp.
    ///
    /// Listing order is ignored; names that do not carry a valid stamp for
    /// this exact key are skipped.
    pub async fn latest_file_name(&self, key: &ReportKey) -> Result<Option<String>> {
        let names = self.store.list(&key.file_prefix()).await?;
        Ok(names
            .into_iter()
            .filter_map(|name| ReportFileName::stamp_of(key, &name).map(|stamp| (stamp, name)))
            .max_by_key(|(stamp, _)| *stamp)
            .map(|(_, name)| name))
    }

    /// Rows behind a report, for the JSON history endpoint.
    pub async fn history(&self, params: &ReportParams) -> Result<ReportDataset> {
        let request = params.request()?;
        self.history.fetch(&request).await
    }

    /// Polling URL for `request`, carrying canonical date text so it always
    /// rebuilds the trigger-side key.
    pub fn download_url(&self, request: &ReportRequest) -> String {
        let mut url = format!(
            "{}/v1/reports/{}/{}/{}/download",
            self.public_base_url,
            request.kind(),
            request.entity_a(),
            request.entity_b()
        );
        let query: Vec<String> = [
            ("start_date", request.start_text()),
            ("end_date", request.end_text()),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| format!("{field}={v}")))
        .collect();
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.join("&"));
        }
        url
    }

    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }
}
