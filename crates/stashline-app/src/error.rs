//! # Design
//!
//! - Centralize application-level errors for bootstrap and the run loop.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded or validated.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: stashline_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: stashline_telemetry::TelemetryError,
    },
    /// The forwarder failed to start or stopped on a fatal error.
    #[error("forwarder operation failed")]
    Forwarder {
        /// Operation identifier.
        operation: &'static str,
        /// Source forwarder error.
        source: stashline_forwarder::ForwarderError,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: stashline_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: stashline_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn forwarder(
        operation: &'static str,
        source: stashline_forwarder::ForwarderError,
    ) -> Self {
        Self::Forwarder { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn app_error_helpers_build_variants() {
        let config = AppError::config(
            "config.load",
            stashline_config::ConfigError::MissingField {
                section: "forwarder",
                field: "url",
            },
        );
        assert!(matches!(
            config,
            AppError::Config {
                operation: "config.load",
                ..
            }
        ));
        assert_eq!(config.to_string(), "configuration operation failed");
        assert!(config.source().is_some());

        let forwarder = AppError::forwarder(
            "forwarder.run",
            stashline_forwarder::ForwarderError::Subscription {
                source: stashline_events::SubscriptionError::Closed {
                    role: stashline_events::BusRole::Master,
                },
            },
        );
        assert_eq!(forwarder.to_string(), "forwarder operation failed");
        assert!(forwarder.source().is_some());
    }
}
