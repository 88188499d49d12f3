//! Client configuration.

use serde::Deserialize;
use thiserror::Error;

/// Default capacity of the receive-error channel.
pub const DEFAULT_ERROR_BUFFER: usize = 10;

/// Configuration errors raised while reading the environment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("{0} environment variable must be set")]
    Missing(&'static str),

    /// An environment variable could not be parsed.
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Description of the accepted values.
        expected: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Settings for a [`PubSub`](crate::PubSub) client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Broker project the client works in. Used in log fields.
    pub project_id: String,
    /// Create missing topics in `ensure_topics` instead of failing.
    pub create_topic: bool,
    /// Capacity of the receive-error channel.
    pub error_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            create_topic: false,
            error_buffer: DEFAULT_ERROR_BUFFER,
        }
    }
}

impl ClientConfig {
    /// Creates a configuration for `project_id` with defaults otherwise.
    #[must_use]
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    /// Toggles topic creation.
    #[must_use]
    pub fn with_create_topic(mut self, create: bool) -> Self {
        self.create_topic = create;
        self
    }

    /// Sets the receive-error channel capacity. Zero is raised to one.
    #[must_use]
    pub fn with_error_buffer(mut self, capacity: usize) -> Self {
        self.error_buffer = capacity.max(1);
        self
    }

    /// Reads the configuration from the process environment.
    ///
    /// - `SHIP_PROJECT_ID` (required)
    /// - `SHIP_CREATE_TOPIC` (`true`/`false`, default `false`)
    /// - `SHIP_ERROR_BUFFER` (positive integer, default 10)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is missing or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is missing or malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let project_id = lookup("SHIP_PROJECT_ID")
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::Missing("SHIP_PROJECT_ID"))?;

        let mut config = Self::new(project_id);

        if let Some(value) = lookup("SHIP_CREATE_TOPIC") {
            config.create_topic = match value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "SHIP_CREATE_TOPIC",
                        expected: "true or false",
                        value,
                    });
                }
            };
        }

        if let Some(value) = lookup("SHIP_ERROR_BUFFER") {
            let capacity = value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|capacity| *capacity > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    name: "SHIP_ERROR_BUFFER",
                    expected: "a positive integer",
                    value: value.clone(),
                })?;
            config.error_buffer = capacity;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_from_lookup_applies_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[("SHIP_PROJECT_ID", "demo")])).unwrap();

        assert_eq!(config, ClientConfig::new("demo"));
        assert!(!config.create_topic);
        assert_eq!(config.error_buffer, DEFAULT_ERROR_BUFFER);
    }

    #[test]
    fn test_from_lookup_reads_all_variables() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("SHIP_PROJECT_ID", "demo"),
            ("SHIP_CREATE_TOPIC", "TRUE"),
            ("SHIP_ERROR_BUFFER", "32"),
        ]))
        .unwrap();

        assert!(config.create_topic);
        assert_eq!(config.error_buffer, 32);
    }

    #[test]
    fn test_from_lookup_requires_project_id() {
        let err = ClientConfig::from_lookup(lookup(&[])).unwrap_err();

        assert_eq!(err, ConfigError::Missing("SHIP_PROJECT_ID"));
        assert_eq!(
            err.to_string(),
            "SHIP_PROJECT_ID environment variable must be set"
        );
    }

    #[test]
    fn test_from_lookup_rejects_bad_flag() {
        let err = ClientConfig::from_lookup(lookup(&[
            ("SHIP_PROJECT_ID", "demo"),
            ("SHIP_CREATE_TOPIC", "maybe"),
        ]))
        .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "SHIP_CREATE_TOPIC",
                ..
            }
        ));
    }

    #[test]
    fn test_from_lookup_rejects_zero_error_buffer() {
        let err = ClientConfig::from_lookup(lookup(&[
            ("SHIP_PROJECT_ID", "demo"),
            ("SHIP_ERROR_BUFFER", "0"),
        ]))
        .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "SHIP_ERROR_BUFFER",
                ..
            }
        ));
    }

    #[test]
    fn test_deserialize_fills_missing_fields() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"project_id":"demo","create_topic":true}"#).unwrap();

        assert!(config.create_topic);
        assert_eq!(config.error_buffer, DEFAULT_ERROR_BUFFER);
    }

    #[test]
    fn test_with_error_buffer_raises_zero_to_one() {
        let config = ClientConfig::new("demo").with_error_buffer(0);

        assert_eq!(config.error_buffer, 1);
    }
}
