use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Pick the filter directive: `RUST_LOG` wins, then `--verbose`, then the configured level.
pub fn filter_directive(rust_log: Option<&str>, verbose: bool, configured: &str) -> String {
    match rust_log.filter(|value| !value.trim().is_empty()) {
        Some(value) => value.to_string(),
        None if verbose => "debug".to_string(),
        None => configured.to_string(),
    }
}

/// Install the stderr subscriber. Stdout is left to results.
pub fn init(verbose: bool, configured_level: &str) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(rust_log.as_deref(), verbose, configured_level);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
