//! Console reporting on top of `tracing`.
//!
//! Info and debug lines go to stdout, warnings and errors to stderr. Debug
//! lines only appear with `--debug`, or when `LAUNCHER_LOG` asks for them.

use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive (e.g. `debug`).
pub const LOG_ENV: &str = "LAUNCHER_LOG";

/// Install the global subscriber. Call once at startup.
pub fn init(debug: bool) {
    let directive = filter_directive(debug, std::env::var(LOG_ENV).ok().as_deref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let writer = std::io::stderr
        .with_max_level(tracing::Level::WARN)
        .or_else(std::io::stdout);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .init();
}

/// `--debug` wins; otherwise the environment, otherwise `info`.
fn filter_directive(debug: bool, env: Option<&str>) -> String {
    if debug {
        return "debug".to_string();
    }
    match env.map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => "info".to_string(),
    }
}
