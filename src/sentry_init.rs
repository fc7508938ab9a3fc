use once_cell::sync::Lazy;
use regex::Regex;
use sentry::{ClientInitGuard, ClientOptions};
use std::env;
use std::sync::Arc;
use tracing::info;

// Pre-compiled patterns for stripping personal data from reports
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("Invalid email regex pattern")
});
static WINDOWS_PATH_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:[A-Za-z]:|\\\\[^\\\s]+)\\[^\s:"'|]*"#).expect("Invalid path regex pattern")
});
static UNIX_PATH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:^|[\s('"])(/[^\s:"'|]+)"#).expect("Invalid path regex pattern"));

/// Initialize Sentry crash reporting
///
/// # Environment Variables
/// - `SENTRY_DSN`: Sentry Data Source Name (required)
/// - `SENTRY_ENVIRONMENT`: Environment name (default: "development")
/// - `SENTRY_RELEASE`: Release version (default: from Cargo.toml)
///
/// Returns `None` when no DSN is configured. The guard must outlive the
/// program's work.
pub fn init() -> Option<ClientInitGuard> {
    let dsn = match env::var("SENTRY_DSN").ok() {
        Some(d) if !d.is_empty() => d,
        _ => {
            info!("Sentry DSN not configured - crash reporting disabled");
            return None;
        }
    };

    let environment = env::var("SENTRY_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
    let release = env::var("SENTRY_RELEASE")
        .unwrap_or_else(|_| format!("{}@{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")));

    let guard = sentry::init((
        dsn,
        ClientOptions {
            release: Some(release.into()),
            environment: Some(environment.into()),
            attach_stacktrace: true,
            send_default_pii: false,
            before_send: Some(Arc::new(before_send_filter)),
            ..Default::default()
        },
    ));

    info!(
        "Sentry crash reporting initialized (environment: {})",
        guard.options().environment.as_deref().unwrap_or("unknown")
    );

    Some(guard)
}

/// File paths and user names routinely appear in error text; strip them
/// before anything leaves the machine.
fn before_send_filter(mut event: sentry::protocol::Event<'static>) -> Option<sentry::protocol::Event<'static>> {
    if let Some(message) = event.message.as_mut() {
        *message = redact(message);
    }

    for exception in &mut event.exception.values {
        if let Some(value) = exception.value.as_mut() {
            *value = redact(value);
        }
    }

    for breadcrumb in &mut event.breadcrumbs.values {
        if let Some(message) = breadcrumb.message.as_mut() {
            *message = redact(message);
        }
    }

    event.user = None;
    event.tags.insert("app_version".into(), env!("CARGO_PKG_VERSION").into());
    event.tags.insert("platform".into(), std::env::consts::OS.into());

    Some(event)
}

pub(crate) fn redact(message: &str) -> String {
    let cleaned = EMAIL_REGEX.replace_all(message, "[EMAIL_REDACTED]");
    let cleaned = WINDOWS_PATH_REGEX.replace_all(&cleaned, "[PATH_REDACTED]");
    UNIX_PATH_REGEX
        .replace_all(&cleaned, |caps: &regex::Captures| {
            let whole = &caps[0];
            let prefix = &whole[..whole.len() - caps[1].len()];
            format!("{}[PATH_REDACTED]", prefix)
        })
        .into_owned()
}

/// Report a print run that had failures.
pub fn capture_run_failure(folder: &str, failed: usize, attempted: usize) {
    sentry::with_scope(
        |scope| {
            scope.set_tag("event_type", "print_run_failure");
            scope.set_extra("failed", failed.into());
            scope.set_extra("attempted", attempted.into());
        },
        || {
            sentry::capture_message(
                &format!(
                    "Print run for '{}' had {} of {} files fail",
                    redact(folder),
                    failed,
                    attempted
                ),
                sentry::Level::Warning,
            );
        },
    );
}
