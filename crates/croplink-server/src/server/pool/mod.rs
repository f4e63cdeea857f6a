//! Background rendering.
//!
//! Rendering is dispatched without the triggering request waiting for it.
//! Two modes are available:
//!
//! - [`RenderDispatcher::Detached`]: every render is its own spawned task,
//!   and the `JoinHandle` is dropped on the spot. Nothing bounds how many
//!   renders run at once; a burst of triggers becomes a burst of concurrent
//!   xlsx serializations.
//! - [`RenderDispatcher::Pool`]: a fixed [`RenderPool`](manager::RenderPool)
//!   with bounded queues. Triggers beyond capacity get `503` instead of
//!   piling up.
//!
//! In both modes the render outcome is only logged and counted.
//!
//! ## Structure
//!
//! - [`job`] - the unit of work and the worker message type.
//! - [`manager`] - the bounded pool.
//! - [`worker`] - the worker loop.

pub mod job;
pub mod manager;
pub mod worker;

use crate::server::{
    config::ServerConfig,
    store::ReportStore,
    telemetry::{decrement_renders_inflight, increment_renders_inflight},
};
use core::time::Duration;
use croplink_core::Result;
use job::RenderJob;
use manager::RenderPool;
use std::sync::Arc;

pub enum RenderDispatcher {
    Detached { store: Arc<dyn ReportStore> },
    Pool(RenderPool),
}

impl RenderDispatcher {
    /// Picks the mode from `render_workers` (`0` = detached).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_config(config: &ServerConfig, store: Arc<dyn ReportStore>) -> Self {
        if config.render_workers == 0 {
            tracing::warn!("RENDER_WORKERS=0: renders run as unbounded detached tasks");
            Self::Detached { store }
        } else {
            Self::Pool(RenderPool::spawn(
                config.render_workers,
                config.render_queue_depth,
                store,
                Duration::from_secs(config.shutdown_timeout),
            ))
        }
    }

    /// Hands `job` off and returns without waiting for it.
    pub fn dispatch(&self, job: RenderJob) -> Result<()> {
        increment_renders_inflight();
        let dispatched = match self {
            Self::Detached { store } => {
                let store = Arc::clone(store);
                // The handle is dropped: nobody observes completion.
                drop(tokio::spawn(async move { job.run(store.as_ref()).await }));
                Ok(())
            }
            Self::Pool(pool) => pool.try_dispatch(job),
        };
        if dispatched.is_err() {
            decrement_renders_inflight();
        }
        dispatched
    }

    pub async fn shutdown(&self) {
        match self {
            // Detached renders cannot be tracked; the runtime drops whatever
            // is still running when it stops.
            Self::Detached { .. } => {}
            Self::Pool(pool) => pool.shutdown().await,
        }
    }
}
