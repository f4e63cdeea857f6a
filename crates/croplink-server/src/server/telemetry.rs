//! # Telemetry
//!
//! Structured logs are always on: a `tracing_subscriber` registry with an
//! `EnvFilter` (default `info`) and a human-readable fmt layer.
//!
//! ## Feature matrix
//!
//! - `metrics`: OpenTelemetry counters and histograms for the report flow.
//! - `stdout`: exports those metrics to stdout every 5 seconds.
//!
//! ## Render failures
//!
//! Renders are fire-and-forget. A failed render produces no file and no
//! client ever hears about it, so `renders_failed` and the error log are the
//! only place such failures show up.
//!
//! ```bash
//! cargo run --features metrics,stdout
//! ```

// Disallow using `stdout` without `metrics`
#[cfg(all(feature = "stdout", not(feature = "metrics")))]
compile_error!("The 'stdout' feature requires the 'metrics' feature to be enabled.");

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "metrics")]
use opentelemetry::{
    InstrumentationScope, KeyValue,
    metrics::{Counter, Histogram, Meter, UpDownCounter},
};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::{Resource, metrics as sdkmetrics};
#[cfg(feature = "metrics")]
use opentelemetry_semantic_conventions as semvcns;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

pub struct TelemetryProviders {
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and stops exporters. Called once on shutdown.
    pub fn shutdown(&self) {
        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics();

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        );

    #[cfg(feature = "metrics")]
    let registry = {
        let scope = InstrumentationScope::builder("croplink")
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_schema_url(semvcns::SCHEMA_URL)
            .build();
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        init_metric_handles(opentelemetry::global::meter_with_scope(scope));

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(feature = "metrics")]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("croplink-server")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> sdkmetrics::SdkMeterProvider {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::MetricExporter;
        let exporter = MetricExporter::default();
        let reader = sdkmetrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();

        builder.with_reader(reader)
    };

    builder.build()
}

#[cfg(feature = "metrics")]
static REPORTS_REQUESTED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static RENDERS_INFLIGHT: OnceLock<UpDownCounter<i64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static RENDERS_COMPLETED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static RENDERS_FAILED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static RENDER_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static DOWNLOADS_SERVED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static DOWNLOADS_MISSING: OnceLock<Counter<u64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = REPORTS_REQUESTED.set(
        meter
            .u64_counter("reports_requested")
            .with_description("Accepted report generation requests")
            .build(),
    );

    let _ = RENDERS_INFLIGHT.set(
        meter
            .i64_up_down_counter("renders_inflight")
            .with_description("Renders dispatched but not yet finished")
            .build(),
    );

    let _ = RENDERS_COMPLETED.set(
        meter
            .u64_counter("renders_completed")
            .with_description("Report files written")
            .build(),
    );

    let _ = RENDERS_FAILED.set(
        meter
            .u64_counter("renders_failed")
            .with_description("Renders that produced no file")
            .build(),
    );

    let _ = RENDER_DURATION_MS.set(
        meter
            .f64_histogram("render_duration")
            .with_unit("ms")
            .with_description("Serialization plus storage time per report")
            .build(),
    );

    let _ = DOWNLOADS_SERVED.set(
        meter
            .u64_counter("downloads_served")
            .with_description("Report downloads that found a file")
            .build(),
    );

    let _ = DOWNLOADS_MISSING.set(
        meter
            .u64_counter("downloads_missing")
            .with_description("Report downloads answered with 404")
            .build(),
    );
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "metrics")]
pub fn increment_reports_requested() {
    if let Some(counter) = REPORTS_REQUESTED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_reports_requested() {}

#[cfg(feature = "metrics")]
pub fn increment_renders_inflight() {
    if let Some(counter) = RENDERS_INFLIGHT.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_renders_inflight() {}

#[cfg(feature = "metrics")]
pub fn decrement_renders_inflight() {
    if let Some(counter) = RENDERS_INFLIGHT.get() {
        counter.add(-1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn decrement_renders_inflight() {}

#[cfg(feature = "metrics")]
pub fn increment_renders_completed() {
    if let Some(counter) = RENDERS_COMPLETED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_renders_completed() {}

#[cfg(feature = "metrics")]
pub fn increment_renders_failed() {
    if let Some(counter) = RENDERS_FAILED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_renders_failed() {}

#[cfg(feature = "metrics")]
pub fn record_render_duration(duration_ms: f64) {
    if let Some(histogram) = RENDER_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_render_duration(_duration_ms: f64) {}

#[cfg(feature = "metrics")]
pub fn increment_downloads_served() {
    if let Some(counter) = DOWNLOADS_SERVED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_downloads_served() {}

#[cfg(feature = "metrics")]
pub fn increment_downloads_missing() {
    if let Some(counter) = DOWNLOADS_MISSING.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_downloads_missing() {}
