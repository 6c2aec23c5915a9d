use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
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
            "cambio_convert_total",
            Unit::Count,
            "Total number of conversion requests, labelled by endpoint and outcome."
        );
        describe_counter!(
            "cambio_url_rejected_total",
            Unit::Count,
            "Total number of render URLs rejected by address validation."
        );
        describe_counter!(
            "cambio_asset_fetch_failed_total",
            Unit::Count,
            "Total number of page assets that could not be fetched."
        );
        describe_histogram!(
            "cambio_render_fetch_ms",
            Unit::Milliseconds,
            "Headless browser fetch latency in milliseconds."
        );
        describe_histogram!(
            "cambio_render_compose_ms",
            Unit::Milliseconds,
            "Document composition latency in milliseconds."
        );
        describe_histogram!(
            "cambio_convert_ms",
            Unit::Milliseconds,
            "End-to-end conversion latency in milliseconds."
        );
    });
}
