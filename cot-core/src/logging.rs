//! Log output setup.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Maps a verbosity (-2 quietest, +2 most verbose) to a log level.
pub fn level_for_verbosity(verbosity: i8) -> Level {
    match verbosity {
        i8::MIN..=-2 => Level::ERROR,
        -1 => Level::WARN,
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Installs a `fmt` subscriber for the process.
///
/// `RUST_LOG` wins when set; otherwise `verbosity` picks the level. Calling
/// this again once a subscriber is installed does nothing.
pub fn init_logging(verbosity: i8) {
    let filter = EnvFilter::builder()
        .with_default_directive(level_for_verbosity(verbosity).into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_verbosity() {
        assert_eq!(level_for_verbosity(-5), Level::ERROR);
        assert_eq!(level_for_verbosity(-2), Level::ERROR);
        assert_eq!(level_for_verbosity(-1), Level::WARN);
        assert_eq!(level_for_verbosity(0), Level::INFO);
        assert_eq!(level_for_verbosity(1), Level::DEBUG);
        assert_eq!(level_for_verbosity(2), Level::TRACE);
        assert_eq!(level_for_verbosity(9), Level::TRACE);
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging(0);
        init_logging(2);
        tracing::info!("still logging");
    }
}
