//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::Database`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upper bound on full passes a `destroy_all` may take over the
    /// type-set before giving up. Each pass enumerates the set once, so
    /// more than one pass only happens under concurrent writers.
    pub destroy_all_max_passes: usize,

    /// Whether lenient-mode lookup misses are reported through `tracing`.
    pub report_missing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            destroy_all_max_passes: 8,
            report_missing: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `destroy_all` pass bound.
    #[must_use]
    pub const fn destroy_all_max_passes(mut self, passes: usize) -> Self {
        self.destroy_all_max_passes = passes;
        self
    }

    /// Sets whether lenient lookup misses are reported.
    #[must_use]
    pub const fn report_missing(mut self, value: bool) -> Self {
        self.report_missing = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.destroy_all_max_passes, 8);
        assert!(config.report_missing);
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.destroy_all_max_passes, 8);

        let config: Config = serde_json::from_str(r#"{"report_missing": false}"#).unwrap();
        assert!(!config.report_missing);
        assert_eq!(config.destroy_all_max_passes, 8);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .destroy_all_max_passes(2)
            .report_missing(false);
        assert_eq!(config.destroy_all_max_passes, 2);
        assert!(!config.report_missing);
    }
}
