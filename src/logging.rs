use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Map the number of `-v` flags to a default level.
pub fn verbosity_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Log to stderr, so the program we exec keeps a clean stdout. `RUST_LOG` refines the default
/// level chosen by `verbose`.
pub fn configure_logging(verbose: u8) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(verbosity_level(verbose).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::Uptime::default())
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_by_default() {
        assert_eq!(verbosity_level(0), LevelFilter::WARN);
        assert_eq!(verbosity_level(1), LevelFilter::DEBUG);
        assert_eq!(verbosity_level(7), LevelFilter::TRACE);
    }
}
