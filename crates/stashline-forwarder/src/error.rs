//! Error types for the forwarding loop and the delivery sink.

use stashline_config::ConfigError;
use stashline_events::SubscriptionError;
use stashline_telemetry::DeliveryFailureKind;
use thiserror::Error;

use crate::http::{HttpClientError, ResponseBody};

/// Result alias for forwarder operations.
pub type ForwarderResult<T> = Result<T, ForwarderError>;

/// Fatal errors that stop (or prevent) the forwarding loop.
#[derive(Debug, Error)]
pub enum ForwarderError {
    /// Settings failed validation before the loop started.
    #[error("invalid forwarder configuration")]
    Configuration {
        /// Underlying configuration error.
        #[from]
        source: ConfigError,
    },
    /// A tag pattern could not be compiled.
    #[error("invalid tag pattern")]
    InvalidPattern {
        /// Pattern as configured.
        pattern: String,
        /// Underlying regex compilation error.
        source: regex::Error,
    },
    /// The HTTP client could not be constructed.
    #[error("failed to build http client")]
    HttpClient {
        /// Underlying client error.
        source: reqwest::Error,
    },
    /// The bus subscription failed to open or was lost.
    #[error("event subscription failed")]
    Subscription {
        /// Underlying subscription error.
        #[from]
        source: SubscriptionError,
    },
    /// The forwarding task panicked or was aborted.
    #[error("forwarder task failed")]
    Join {
        /// Underlying join error.
        source: tokio::task::JoinError,
    },
}

/// Non-fatal failure to deliver one event.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The event data could not be encoded as JSON.
    #[error("failed to serialize event data")]
    Serialize {
        /// Underlying serde error.
        source: serde_json::Error,
    },
    /// The request did not produce a response.
    #[error("delivery request failed")]
    Transport {
        /// Destination endpoint.
        url: String,
        /// Attempts made before giving up.
        attempts: u32,
        /// Underlying client error.
        source: HttpClientError,
    },
    /// The endpoint answered with a non-success status.
    #[error("delivery rejected by endpoint")]
    Status {
        /// Destination endpoint.
        url: String,
        /// HTTP status code returned.
        status: u16,
        /// Attempts made before giving up.
        attempts: u32,
        /// Decoded response body.
        body: ResponseBody,
    },
}

impl DeliveryError {
    /// Metrics label for this failure.
    #[must_use]
    pub const fn kind(&self) -> DeliveryFailureKind {
        match self {
            Self::Serialize { .. } => DeliveryFailureKind::Serialize,
            Self::Transport { .. } => DeliveryFailureKind::Transport,
            Self::Status { .. } => DeliveryFailureKind::Status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stashline_events::BusRole;
    use std::error::Error as _;

    #[test]
    fn messages_are_constant_with_sources() {
        let err = ForwarderError::from(SubscriptionError::Closed {
            role: BusRole::Minion,
        });
        assert_eq!(err.to_string(), "event subscription failed");
        assert!(err.source().is_some());

        let err = ForwarderError::from(ConfigError::MissingField {
            section: "forwarder",
            field: "url",
        });
        assert!(matches!(err, ForwarderError::Configuration { .. }));

        let status = DeliveryError::Status {
            url: "http://127.0.0.1/".into(),
            status: 503,
            attempts: 1,
            body: ResponseBody::Empty,
        };
        assert_eq!(status.to_string(), "delivery rejected by endpoint");
        assert_eq!(status.kind(), DeliveryFailureKind::Status);
    }
}
