//! Typed configuration models.
//!
//! # Design
//! - `ConfigDocument` mirrors the YAML file one-to-one; every field is
//!   optional so files and environment overlays can be partial.
//! - `StashlineConfig` is the validated, immutable view handed to the
//!   forwarder at start.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stashline_events::{BusRole, SubscriptionRequest, TcpPorts, Transport};
use url::Url;

use crate::defaults::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BACKOFF, DEFAULT_TIMEOUT, MAX_RETRY_BACKOFF,
};
use crate::error::{ConfigError, ConfigResult};

/// Raw configuration document as read from YAML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDocument {
    /// Host identity and bus location.
    #[serde(default)]
    pub host: HostSection,
    /// Destination endpoint and filters.
    #[serde(default)]
    pub forwarder: ForwarderSection,
    /// Delivery timeouts and retry policy.
    #[serde(default)]
    pub delivery: DeliverySection,
    /// Log level and output format.
    #[serde(default)]
    pub logging: LoggingSection,
}

/// `host` section of the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostSection {
    /// Host identity; `*_master` selects the coordinator bus.
    pub id: Option<String>,
    /// Directory holding the bus IPC sockets.
    pub sock_dir: Option<PathBuf>,
    /// Bus transport name (`ipc` or `tcp`).
    pub transport: Option<String>,
    /// Coordinator publish port for the TCP transport.
    pub tcp_master_pub_port: Option<u16>,
    /// Worker publish port for the TCP transport.
    pub tcp_pub_port: Option<u16>,
}

/// `forwarder` section of the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForwarderSection {
    /// Destination endpoint.
    pub url: Option<String>,
    /// Tag glob patterns.
    pub tags: Option<Vec<String>>,
    /// Allowed function names.
    pub funs: Option<Vec<String>>,
}

/// `delivery` section of the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeliverySection {
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Attempts per event.
    pub max_attempts: Option<u32>,
    /// Initial pause between attempts in milliseconds.
    pub retry_backoff_ms: Option<u64>,
}

/// `logging` section of the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Log level directive (e.g. `info`, `stashline_forwarder=debug`).
    pub level: Option<String>,
    /// Output format (`json` or `pretty`).
    pub format: Option<String>,
}

/// Validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashlineConfig {
    /// Host identity and bus location.
    pub host: HostOptions,
    /// Destination endpoint and filters.
    pub forwarder: ForwarderSettings,
    /// Delivery policy.
    pub delivery: DeliveryPolicy,
    /// Logging preferences.
    pub logging: LoggingSettings,
}

/// Host options previously read from process-wide state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOptions {
    /// Host identity string.
    pub id: String,
    /// Directory holding the bus IPC sockets.
    pub sock_dir: PathBuf,
    /// Bus transport.
    pub transport: Transport,
    /// Loopback publish ports for the TCP transport.
    pub tcp_ports: TcpPorts,
}

impl HostOptions {
    /// Bus role derived from the host identity.
    #[must_use]
    pub fn role(&self) -> BusRole {
        BusRole::from_host_id(&self.id)
    }

    /// Subscription request targeting this host's bus.
    #[must_use]
    pub fn subscription_request(&self) -> SubscriptionRequest {
        SubscriptionRequest::new(self.role(), self.sock_dir.clone())
            .with_transport(self.transport)
            .with_tcp_ports(self.tcp_ports)
    }
}

/// Destination and filters for the forwarding loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwarderSettings {
    /// Destination endpoint.
    pub url: Url,
    /// Tag glob patterns; empty accepts every tag.
    pub tags: Vec<String>,
    /// Allowed function names; empty accepts every function.
    pub funs: Vec<String>,
}

impl ForwarderSettings {
    /// Build settings from the engine's `url`, `funs`, and `tags` options.
    ///
    /// # Errors
    ///
    /// Returns an error when `url` is blank or not an absolute HTTP(S) URL.
    /// Patterns and function names are kept exactly as given.
    pub fn new(
        url: &str,
        funs: Option<Vec<String>>,
        tags: Option<Vec<String>>,
    ) -> ConfigResult<Self> {
        Ok(Self {
            url: crate::validate::parse_url(url)?,
            tags: tags.unwrap_or_default(),
            funs: funs.unwrap_or_default(),
        })
    }

    /// Build settings from a raw `forwarder` section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when `url` is absent, otherwise
    /// the errors of [`ForwarderSettings::new`].
    pub fn from_section(section: ForwarderSection) -> ConfigResult<Self> {
        let url = section
            .url
            .ok_or_else(|| ConfigError::missing("forwarder", "url"))?;
        Self::new(&url, section.funs, section.tags)
    }
}

/// Timeouts and retry behaviour for the delivery sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Attempts per event; `1` disables retries.
    pub max_attempts: u32,
    /// Pause before the first retry; doubled for each further retry.
    pub retry_backoff: Duration,
}

impl DeliveryPolicy {
    /// Pause to observe after the failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.retry_backoff
            .saturating_mul(1_u32 << exponent)
            .min(MAX_RETRY_BACKOFF)
    }

    /// Returns `true` when another attempt is allowed after `attempt`.
    #[must_use]
    pub const fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Logging preferences resolved from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Level directive passed to the tracing filter.
    pub level: String,
    /// Requested output format; `None` defers to the build profile.
    pub format: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = DeliveryPolicy {
            timeout: Duration::from_secs(1),
            max_attempts: 5,
            retry_backoff: Duration::from_millis(400),
        };
        assert_eq!(policy.backoff_after(1), Duration::from_millis(400));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(800));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(1_600));
        assert_eq!(policy.backoff_after(40), MAX_RETRY_BACKOFF);
        assert!(policy.allows_retry_after(4));
        assert!(!policy.allows_retry_after(5));
    }

    #[test]
    fn default_policy_is_single_attempt() {
        let policy = DeliveryPolicy::default();
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.allows_retry_after(1));
    }

    #[test]
    fn host_options_build_role_scoped_request() {
        let host = HostOptions {
            id: "salt_master".into(),
            sock_dir: PathBuf::from("/run/salt/master"),
            transport: Transport::Ipc,
            tcp_ports: TcpPorts::default(),
        };
        assert_eq!(host.role(), BusRole::Master);
        let request = host.subscription_request();
        assert_eq!(
            request.ipc_path(),
            PathBuf::from("/run/salt/master/master_event_pub.ipc")
        );
    }

    #[test]
    fn forwarder_settings_mirror_engine_options() {
        let settings = ForwarderSettings::new(
            "http://logstash.local:8080/salt",
            Some(vec!["net.traceroute".into()]),
            None,
        )
        .expect("settings should validate");
        assert_eq!(settings.url.as_str(), "http://logstash.local:8080/salt");
        assert!(settings.tags.is_empty());
        assert_eq!(settings.funs, vec!["net.traceroute".to_string()]);

        assert!(matches!(
            ForwarderSettings::new("  ", None, None),
            Err(ConfigError::MissingField { field: "url", .. })
        ));
    }

    #[test]
    fn forwarder_settings_from_section_requires_url() {
        assert!(matches!(
            ForwarderSettings::from_section(ForwarderSection::default()),
            Err(ConfigError::MissingField {
                section: "forwarder",
                field: "url"
            })
        ));

        let settings = ForwarderSettings::from_section(ForwarderSection {
            url: Some("https://logstash.local/salt".into()),
            tags: Some(vec!["salt/job/*/new".into()]),
            funs: None,
        })
        .expect("section should validate");
        assert_eq!(settings.tags, vec!["salt/job/*/new".to_string()]);
        assert!(settings.funs.is_empty());
    }
}
