//! Optional Sentry error reporting, enabled by `SENTRY_DSN`.

use sentry::ClientInitGuard;
use tracing::info;

/// Initialise the Sentry client when a DSN is configured.
///
/// The returned guard must be held for the lifetime of the process; dropping it
/// flushes pending events.
pub fn init_once(dsn: Option<&str>, environment: &str) -> Option<ClientInitGuard> {
    let dsn = dsn.filter(|d| !d.trim().is_empty())?;
    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(environment.to_string().into()),
            ..Default::default()
        },
    ));
    info!(environment = environment, "Sentry error reporting enabled");
    Some(guard)
}
