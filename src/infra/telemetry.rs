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
            "rivus_feed_cache_hit_total",
            Unit::Count,
            "Total number of ranked-feed pages served from the cache."
        );
        describe_counter!(
            "rivus_feed_cache_miss_total",
            Unit::Count,
            "Total number of ranked-feed requests that required an upstream fetch."
        );
        describe_counter!(
            "rivus_ranker_fetch_total",
            Unit::Count,
            "Total number of calls made to the ranking service."
        );
        describe_histogram!(
            "rivus_ranker_fetch_ms",
            Unit::Milliseconds,
            "Ranking service fetch latency in milliseconds."
        );
        describe_counter!(
            "rivus_posts_ingested_total",
            Unit::Count,
            "Total number of posts inserted by the ingestion worker."
        );
    });
}
