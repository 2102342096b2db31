use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Human-readable logging for local/interactive runs. Honors `RUST_LOG`, defaulting to `info`.
pub fn init_logging() {
    let subscriber = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer());
    let _ = subscriber.try_init();
}

/// Structured JSON logging for production deployments, so the operational supervisor can parse
/// `SystemFailure` events out of the log stream.
pub fn init_json_logging() {
    let subscriber = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json().with_current_span(true).with_span_list(true));
    let _ = subscriber.try_init();
}
