use tracing_subscriber::EnvFilter;

/// Maps a configured level name onto a filter directive. Unknown names fall
/// back to `info`.
pub(crate) fn level_directive(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "error" => "error",
        "warn" | "warning" => "warn",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    }
}

/// Initialize tracing/logging for the application.
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies. Safe to call
/// more than once.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(default_level)));

    // try_init so tests and repeated callers don't panic on a second install
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
