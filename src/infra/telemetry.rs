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
            "showcase_cache_hit_total",
            Unit::Count,
            "Read-through lookups answered from the cache."
        );
        describe_counter!(
            "showcase_cache_miss_total",
            Unit::Count,
            "Read-through lookups that ran the fetcher."
        );
        describe_counter!(
            "showcase_cache_backend_error_total",
            Unit::Count,
            "Cache backend calls that failed and were degraded to no-ops."
        );
        describe_counter!(
            "showcase_cache_evict_total",
            Unit::Count,
            "Entries evicted from the in-process cache due to capacity."
        );
        describe_counter!(
            "showcase_snapshot_write_total",
            Unit::Count,
            "Snapshot writes by result."
        );
        describe_histogram!(
            "showcase_sync_flush_ms",
            Unit::Milliseconds,
            "Duration of one coordinator flush batch in milliseconds."
        );
        describe_counter!(
            "showcase_sync_coalesced_total",
            Unit::Count,
            "Pending updates superseded before their flush."
        );
        describe_histogram!(
            "showcase_preload_ms",
            Unit::Milliseconds,
            "Homepage preload latency in milliseconds."
        );
        describe_counter!(
            "showcase_preload_fallback_total",
            Unit::Count,
            "Preload resources that fell past the repository, by resource and tier."
        );
    });
}
