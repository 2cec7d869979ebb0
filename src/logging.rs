use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the stderr subscriber. `RUST_LOG` overrides the default level;
/// `verbose` raises the default to `debug`.
///
/// Stdout stays reserved for the JSON command output.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);

    // A second init (tests, embedding callers) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init();
}
