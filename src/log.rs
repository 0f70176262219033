use lazy_static::initialize;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use crate::env::{get_env_bool, ENV_CONFIG};

/// Installs the global subscriber. Filtering comes from `RUST_LOG`, `LOG_JSON` switches to JSON
/// lines for the log collector, `LOG_PERF` adds span close timings.
pub fn init() {
    // Read directly, the config is loaded once the subscriber can log what it reads.
    let log_json = get_env_bool("LOG_JSON").unwrap_or(false);
    let log_perf = get_env_bool("LOG_PERF").unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);

    let builder = if log_perf {
        builder.with_span_events(FmtSpan::CLOSE)
    } else {
        builder
    };

    if log_json {
        builder.json().init();
    } else {
        builder.init();
    };

    initialize(&ENV_CONFIG);
}
