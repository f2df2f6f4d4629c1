//! Tracing setup for the cpapnight binary and the crate's tests.
//!
//! Logs go to stderr so report and JSON output on stdout stay clean.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Level when neither RUST_LOG nor `-v` is given
pub const DEFAULT_LEVEL: &str = "warn";

/// Map a `-v` count to a level: none warn, one info, more debug
pub fn level_for_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => DEFAULT_LEVEL,
        1 => "info",
        _ => "debug",
    }
}

/// Initialize logging at the default level
pub fn init() {
    init_with_level(DEFAULT_LEVEL)
}

/// Initialize logging with `default_level` for this crate and the binary.
///
/// Other crates stay at warn. RUST_LOG, when set, replaces the whole filter.
pub fn init_with_level(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,cpap_core={0},cpapnight={0}",
            default_level
        ))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

/// Initialize logging for tests; output is captured per test
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("cpap_core=debug"))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_verbosity() {
        assert_eq!(level_for_verbosity(0), "warn");
        assert_eq!(level_for_verbosity(1), "info");
        assert_eq!(level_for_verbosity(2), "debug");
        assert_eq!(level_for_verbosity(5), "debug");
    }
}
