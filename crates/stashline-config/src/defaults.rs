//! Fallback values applied when the configuration leaves a field unset.
//!
//! # Design
//! - Keep every default in one place so the loader and docs agree.
//! - Bus defaults mirror the host platform's stock layout.

use std::time::Duration;

/// Host identity used when none is configured (resolves to the worker role).
pub const DEFAULT_HOST_ID: &str = "stashline";
/// Parent directory of the per-role bus socket directories.
pub const DEFAULT_SOCK_ROOT: &str = "/var/run/salt";
/// Per-request HTTP timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Attempts per event; one attempt keeps delivery at-most-once.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;
/// Upper bound accepted for `delivery.max_attempts`.
pub const MAX_ATTEMPTS_LIMIT: u32 = 10;
/// Initial pause between delivery attempts.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(250);
/// Ceiling for the exponential retry backoff.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(10);
/// Log level used when neither the file nor `RUST_LOG` sets one.
pub const DEFAULT_LOG_LEVEL: &str = "info";
