//! Configuration traits and utilities.

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::LoggingConfig;
use crate::error::{AdapterError, Result};

/// Trait for service configuration types.
///
/// Implement this trait for the service configuration struct to get
/// automatic loading, validation, and access to common config fields.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use sensorhub_framework::{AdapterError, LoggingConfig, ServiceConfig};
///
/// #[derive(Debug, Deserialize)]
/// pub struct MyConfig {
///     pub logging: LoggingConfig,
///     pub targets: Vec<String>,
/// }
///
/// impl ServiceConfig for MyConfig {
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
///
///     fn validate(&self) -> Result<(), AdapterError> {
///         if self.targets.is_empty() {
///             return Err(AdapterError::validation("At least one target required"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait ServiceConfig: Sized + DeserializeOwned {
    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Validate the configuration.
    ///
    /// Called automatically after loading. Override to add custom validation.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Parse configuration from a JSON5 string and validate it.
    fn parse(content: &str) -> Result<Self> {
        let config: Self = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(AdapterError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }
}

/// Check that a millisecond setting is non-zero and return it as a `Duration`.
pub fn positive_millis(name: &str, value: u64) -> Result<Duration> {
    if value == 0 {
        return Err(AdapterError::validation(format!("{} must be > 0", name)));
    }
    Ok(Duration::from_millis(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        #[serde(default)]
        logging: LoggingConfig,
        interval_ms: u64,
    }

    impl ServiceConfig for TestConfig {
        fn logging(&self) -> &LoggingConfig {
            &self.logging
        }

        fn validate(&self) -> Result<()> {
            positive_millis("interval_ms", self.interval_ms).map(|_| ())
        }
    }

    #[test]
    fn test_config_not_found() {
        let result = TestConfig::load("/nonexistent/path.json5");
        assert!(matches!(result, Err(AdapterError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_config_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{ interval_ms: 500, logging: {{ level: \"debug\" }} }}").unwrap();

        let config = TestConfig::load(file.path()).unwrap();
        assert_eq!(config.interval_ms, 500);
        assert_eq!(config.logging().level, "debug");
    }

    #[test]
    fn test_config_validation_runs_on_parse() {
        let result = TestConfig::parse("{ interval_ms: 0 }");
        assert!(matches!(result, Err(AdapterError::ConfigValidation(_))));
    }

    #[test]
    fn test_config_parse_error() {
        let result = TestConfig::parse("{ interval_ms: ");
        assert!(matches!(result, Err(AdapterError::ConfigParse(_))));
    }
}
