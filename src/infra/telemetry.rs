use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "md2pdf_jobs_started_total",
            Unit::Count,
            "Total number of render jobs that reached the engine stage."
        );
        describe_counter!(
            "md2pdf_jobs_completed_total",
            Unit::Count,
            "Total number of render jobs that produced a PDF."
        );
        describe_counter!(
            "md2pdf_jobs_aborted_total",
            Unit::Count,
            "Total number of render jobs cancelled before completion."
        );
        describe_counter!(
            "md2pdf_jobs_failed_total",
            Unit::Count,
            "Total number of render jobs that failed."
        );
        describe_histogram!(
            "md2pdf_render_ms",
            Unit::Milliseconds,
            "End-to-end latency of successful render jobs in milliseconds."
        );
        describe_gauge!(
            "md2pdf_jobs_in_flight",
            Unit::Count,
            "Current number of render jobs holding a work directory."
        );
    });
}
