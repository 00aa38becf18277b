use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "PHOTO_PROMPT_LOG";

/// Installs the global subscriber. Logs go to stderr because stdout carries
/// protocol frames. Calling this more than once is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}
