use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset: workspace crates at the given
/// level, everything else at `warn`.
pub fn default_filter(level: &str) -> String {
    format!(
        "warn,server={level},services={level},db={level},deployment={level},local_deployment={level},utils={level}"
    )
}

/// Install the global tracing subscriber.
///
/// When `with_sentry` is set, error events are also forwarded to Sentry.
pub fn init_tracing(level: &str, with_sentry: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    let sentry_layer = if with_sentry {
        Some(sentry_tracing::layer())
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(sentry_layer)
        .init();
}
