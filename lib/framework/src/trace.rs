use tracing_subscriber::EnvFilter;

/// Installs the global subscriber, logs are written to stderr, so stdout
/// stays clean for the rendered targets.
///
/// `levels` uses the `EnvFilter` directive syntax, e.g. `info,framework=debug`.
pub fn init(color: bool, levels: &str) {
    let filter = match EnvFilter::try_new(levels) {
        Ok(filter) => filter,
        Err(err) => {
            eprintln!("invalid log level {levels:?}, {err}, fallback to \"info\"");
            EnvFilter::new("info")
        }
    };

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(color)
        .with_writer(std::io::stderr)
        .try_init();

    // tests call this more than once
    if let Err(err) = result {
        debug!(message = "global subscriber already installed", %err);
    }
}
