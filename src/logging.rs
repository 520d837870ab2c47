use tracing_subscriber::EnvFilter;

/// Initialize logging with tracing-subscriber.
///
/// `RUST_LOG` wins when set; otherwise `log_level` is used.
pub fn init(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .without_time()
        .init();
}
