use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::crawl::{
    METRIC_BATCH_SIZE, METRIC_CRAWL_FAILED_TOTAL, METRIC_CRAWL_MS, METRIC_CRAWL_TOTAL,
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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CRAWL_TOTAL,
            Unit::Count,
            "Total number of URLs crawled, labelled by single or batch mode."
        );
        describe_counter!(
            METRIC_CRAWL_FAILED_TOTAL,
            Unit::Count,
            "Total number of URLs whose page fetch failed."
        );
        describe_histogram!(
            METRIC_CRAWL_MS,
            Unit::Milliseconds,
            "Crawl request latency in milliseconds."
        );
        describe_histogram!(
            METRIC_BATCH_SIZE,
            Unit::Count,
            "Number of URLs per batch crawl request."
        );
    });
}
