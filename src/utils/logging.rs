//! Structured logging setup.
//!
//! Installs a `tracing_subscriber` fmt subscriber configured from
//! [`LoggingConfig`]. Safe to call more than once; only the first call wins.

use tracing::debug;
use tracing_subscriber::FmtSubscriber;

use crate::config::LoggingConfig;

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let installed = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids)
        .try_init()
        .is_ok();

    if installed {
        debug!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }
}
