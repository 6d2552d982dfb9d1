//! Error types for configuration operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
///
/// Every variant is fatal at startup: the forwarder never enters its loop
/// with a configuration that failed to load or validate.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field was absent or blank.
    #[error("missing configuration field")]
    MissingField {
        /// Section that should contain the field.
        section: &'static str,
        /// Name of the missing field.
        field: &'static str,
    },
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Section that failed validation.
        section: &'static str,
        /// Field that failed validation.
        field: &'static str,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Reading the configuration file failed.
    #[error("failed to read configuration file")]
    Read {
        /// Path that could not be read.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// The configuration file was not valid YAML for the expected shape.
    #[error("failed to parse configuration file")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Source YAML error.
        source: serde_yaml::Error,
    },
}

impl ConfigError {
    pub(crate) const fn missing(section: &'static str, field: &'static str) -> Self {
        Self::MissingField { section, field }
    }

    pub(crate) fn invalid(
        section: &'static str,
        field: &'static str,
        value: Option<String>,
        reason: &'static str,
    ) -> Self {
        Self::InvalidField {
            section,
            field,
            value,
            reason,
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn messages_are_constant_with_context_fields() {
        let missing = ConfigError::MissingField {
            section: "forwarder",
            field: "url",
        };
        assert_eq!(missing.to_string(), "missing configuration field");

        let invalid = ConfigError::invalid(
            "host",
            "transport",
            Some("zeromq".to_string()),
            "unsupported",
        );
        assert_eq!(invalid.to_string(), "invalid configuration field");
        assert!(matches!(
            invalid,
            ConfigError::InvalidField {
                value: Some(ref value),
                reason: "unsupported",
                ..
            } if value == "zeromq"
        ));

        let read = ConfigError::Read {
            path: PathBuf::from("/etc/stashline.yaml"),
            source: io::Error::other("denied"),
        };
        assert!(read.source().is_some());
    }
}
