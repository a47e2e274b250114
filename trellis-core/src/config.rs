//! Runtime configuration.
//!
//! A [`RuntimeConfig`] can be built in code through [`RuntimeBuilder`], parsed
//! from JSON, or picked up from the environment by test harnesses.

use serde::{Deserialize, Serialize};

use crate::reactive::Runtime;

/// Environment variable consulted by [`RuntimeConfig::from_env`].
pub const DIAGNOSTICS_ENV: &str = "TRELLIS_DIAGNOSTICS";

const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 64;

/// Settings for a single [`Runtime`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Start with the diagnostic event log enabled.
    pub diagnostics: bool,

    /// Initial capacity reserved for the diagnostic log.
    pub diagnostics_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            diagnostics: false,
            diagnostics_capacity: DEFAULT_DIAGNOSTICS_CAPACITY,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Defaults, with diagnostics switched on when `TRELLIS_DIAGNOSTICS` is
    /// `1`, `true`, `yes` or `on`.
    pub fn from_env() -> Self {
        let diagnostics = std::env::var(DIAGNOSTICS_ENV)
            .map(|value| parse_flag(&value))
            .unwrap_or(false);
        Self {
            diagnostics,
            ..Self::default()
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Fluent builder for a [`Runtime`].
///
/// ```
/// use trellis_core::Runtime;
///
/// let runtime = Runtime::builder().diagnostics(true).build();
/// assert!(runtime.diagnostics().is_enabled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: RuntimeConfig) -> Self {
        Self { config }
    }

    /// Enable or disable the diagnostic log.
    pub fn diagnostics(mut self, enabled: bool) -> Self {
        self.config.diagnostics = enabled;
        self
    }

    /// Reserve room for this many diagnostic events up front.
    pub fn diagnostics_capacity(mut self, capacity: usize) -> Self {
        self.config.diagnostics_capacity = capacity;
        self
    }

    /// The configuration built so far.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Create the runtime.
    pub fn build(self) -> Runtime {
        Runtime::with_config(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_diagnostics() {
        let config = RuntimeConfig::default();
        assert!(!config.diagnostics);
        assert_eq!(config.diagnostics_capacity, DEFAULT_DIAGNOSTICS_CAPACITY);
    }

    #[test]
    fn json_fills_missing_fields() {
        let config = RuntimeConfig::from_json(r#"{ "diagnostics": true }"#).unwrap();
        assert!(config.diagnostics);
        assert_eq!(config.diagnostics_capacity, DEFAULT_DIAGNOSTICS_CAPACITY);
    }

    #[test]
    fn json_rejects_unknown_fields() {
        assert!(RuntimeConfig::from_json(r#"{ "diagnostic": true }"#).is_err());
    }

    #[test]
    fn flag_parsing() {
        for on in ["1", "true", "TRUE", " yes ", "on"] {
            assert!(parse_flag(on), "{on:?} should enable");
        }
        for off in ["", "0", "false", "off", "nope"] {
            assert!(!parse_flag(off), "{off:?} should disable");
        }
    }

    #[test]
    fn builder_overrides() {
        let builder = RuntimeBuilder::new()
            .diagnostics(true)
            .diagnostics_capacity(8);
        assert_eq!(
            builder.config(),
            &RuntimeConfig {
                diagnostics: true,
                diagnostics_capacity: 8,
            }
        );
    }
}
