use crate::cli::TracingFormat;
use crate::config::Config;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Build the filter: `RUST_LOG` wins, otherwise the configured level applies
/// to this crate and everything else stays at `warn`.
pub fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,storefront={log_level}")))
}

/// Configure and initialize logging for the application.
pub fn setup_logging(config: &Config, tracing_format: TracingFormat) {
    let filter = env_filter(&config.log_level);

    match tracing_format {
        TracingFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .compact()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
        TracingFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
