//! Engine configuration: logging knobs and operational limits.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub limits: Limits,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub stdout_format: LogFormat,
    /// Extra `EnvFilter` directives appended after the verbosity default.
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            stdout_format: LogFormat::Compact,
            filter: None,
        }
    }
}

/// Operational bounds consulted by the session engine.
///
/// Every wire-facing decode path takes a `Limits` reference so a hostile
/// peer cannot make the engine allocate unboundedly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Limits {
    /// Idle time before a session thread takes a hibernation tick.
    pub hibernate_after_ms: u64,
    /// Maximum queued messages per session mailbox.
    pub max_mailbox_depth: usize,
    /// Maximum operations accepted when decoding a compressed patch.
    pub max_patch_ops: usize,
    /// Maximum length of a client event name.
    pub max_event_name_len: usize,
    /// Maximum length of a topic string.
    pub max_topic_len: usize,
    /// Maximum nesting depth of sub-component expansion.
    pub max_component_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            hibernate_after_ms: 15_000,
            max_mailbox_depth: 10_000,
            max_patch_ops: 10_000,
            max_event_name_len: 255,
            max_topic_len: 255,
            max_component_depth: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let parsed: Config = serde_json::from_str(r#"{"limits":{"max_patch_ops":7}}"#).unwrap();
        assert_eq!(parsed.limits.max_patch_ops, 7);
        assert_eq!(parsed.limits.hibernate_after_ms, 15_000);
        assert!(parsed.logging.stdout);
    }
}
