//! Subscription error primitives.
//!
//! Every variant is fatal for the subscriber: the forwarding loop stops and
//! the error propagates to the host.

use std::io;

use thiserror::Error;

use crate::subscription::{BusRole, Transport};

/// Result alias for bus subscription operations.
pub type SubscriptionResult<T> = Result<T, SubscriptionError>;

/// Errors raised while opening or reading a bus subscription.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// No bus is available for the requested role.
    #[error("event bus unavailable")]
    Unavailable {
        /// Role that was requested.
        role: BusRole,
    },
    /// The requested transport cannot be used on this platform.
    #[error("unsupported event bus transport")]
    UnsupportedTransport {
        /// Transport that was requested.
        transport: Transport,
        /// Machine-readable reason for the rejection.
        reason: &'static str,
    },
    /// Connecting to the bus endpoint failed.
    #[error("failed to connect to event bus")]
    Connect {
        /// Role whose bus was targeted.
        role: BusRole,
        /// Socket path or address that was dialled.
        endpoint: String,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Reading from an established subscription failed.
    #[error("event bus read failed")]
    Read {
        /// Socket path or address being read.
        endpoint: String,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The bus closed the subscription.
    #[error("event bus subscription closed")]
    Closed {
        /// Role whose subscription ended.
        role: BusRole,
    },
}

impl SubscriptionError {
    /// Short label used in structured logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "unavailable",
            Self::UnsupportedTransport { .. } => "unsupported_transport",
            Self::Connect { .. } => "connect",
            Self::Read { .. } => "read",
            Self::Closed { .. } => "closed",
        }
    }
}
