//! Tracing setup for hosts embedding the engine.
//!
//! Library code only emits through `tracing`; this module is the one place
//! that installs a subscriber. Hosts with their own subscriber skip it.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{LogFormat, LoggingConfig};

/// Install a global subscriber from the logging config.
///
/// Returns `false` when a subscriber is already installed (tests, embedding
/// hosts), which is not an error.
pub fn init(verbosity: u8, logging: &LoggingConfig) -> bool {
    if !logging.stdout {
        return false;
    }

    let mut filter = EnvFilter::builder()
        .with_default_directive(level_from_verbosity(verbosity).into())
        .with_env_var("LIVEDATA_LOG")
        .from_env_lossy();
    if let Some(extra) = &logging.filter {
        for directive in extra.split(',').filter(|d| !d.is_empty()) {
            if let Ok(parsed) = directive.parse() {
                filter = filter.add_directive(parsed);
            }
        }
    }

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let result = match logging.stdout_format {
        LogFormat::Pretty => builder.pretty().finish().try_init(),
        LogFormat::Compact => builder.compact().finish().try_init(),
        LogFormat::Json => builder.json().finish().try_init(),
    };
    result.is_ok()
}

fn level_from_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_from_verbosity(0), LevelFilter::WARN);
        assert_eq!(level_from_verbosity(1), LevelFilter::INFO);
        assert_eq!(level_from_verbosity(2), LevelFilter::DEBUG);
        assert_eq!(level_from_verbosity(9), LevelFilter::TRACE);
    }

    #[test]
    fn disabled_stdout_is_a_noop() {
        let logging = LoggingConfig {
            stdout: false,
            ..LoggingConfig::default()
        };
        assert!(!init(0, &logging));
    }
}
