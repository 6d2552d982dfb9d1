//! Conversion of a raw [`ConfigDocument`] into validated settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use stashline_events::{BusRole, TcpPorts, Transport};
use url::Url;

use crate::defaults::{
    DEFAULT_HOST_ID, DEFAULT_LOG_LEVEL, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BACKOFF,
    DEFAULT_SOCK_ROOT, DEFAULT_TIMEOUT, MAX_ATTEMPTS_LIMIT,
};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{
    ConfigDocument, DeliveryPolicy, DeliverySection, ForwarderSection, ForwarderSettings,
    HostOptions, HostSection, LoggingSection, LoggingSettings, StashlineConfig,
};

const LOG_FORMATS: [&str; 2] = ["json", "pretty"];

/// Validate a raw document and apply defaults.
///
/// # Errors
///
/// Returns [`ConfigError::MissingField`] when `forwarder.url` is absent and
/// [`ConfigError::InvalidField`] for any value outside its accepted range.
pub fn validate(document: ConfigDocument) -> ConfigResult<StashlineConfig> {
    let ConfigDocument {
        host,
        forwarder,
        delivery,
        logging,
    } = document;
    Ok(StashlineConfig {
        host: validate_host(host)?,
        forwarder: validate_forwarder(forwarder)?,
        delivery: validate_delivery(&delivery)?,
        logging: validate_logging(logging)?,
    })
}

fn validate_host(section: HostSection) -> ConfigResult<HostOptions> {
    let id = match section.id {
        Some(id) if id.trim().is_empty() => {
            return Err(ConfigError::invalid("host", "id", Some(id), "blank"));
        }
        Some(id) => id.trim().to_string(),
        None => DEFAULT_HOST_ID.to_string(),
    };
    let role = BusRole::from_host_id(&id);

    let sock_dir = match section.sock_dir {
        Some(dir) if dir.as_os_str().is_empty() => {
            return Err(ConfigError::invalid("host", "sock_dir", None, "blank"));
        }
        Some(dir) => dir,
        None => default_sock_dir(role),
    };

    let transport = match section.transport {
        Some(raw) => raw
            .parse::<Transport>()
            .map_err(|_| ConfigError::invalid("host", "transport", Some(raw), "unsupported"))?,
        None => Transport::default(),
    };

    let defaults = TcpPorts::default();
    let tcp_ports = TcpPorts {
        master_pub: non_zero_port("tcp_master_pub_port", section.tcp_master_pub_port)?
            .unwrap_or(defaults.master_pub),
        minion_pub: non_zero_port("tcp_pub_port", section.tcp_pub_port)?
            .unwrap_or(defaults.minion_pub),
    };

    Ok(HostOptions {
        id,
        sock_dir,
        transport,
        tcp_ports,
    })
}

/// Socket directory used when `host.sock_dir` is unset.
#[must_use]
pub fn default_sock_dir(role: BusRole) -> PathBuf {
    Path::new(DEFAULT_SOCK_ROOT).join(role.as_str())
}

fn non_zero_port(field: &'static str, port: Option<u16>) -> ConfigResult<Option<u16>> {
    match port {
        Some(0) => Err(ConfigError::invalid(
            "host",
            field,
            Some("0".to_string()),
            "must_be_positive",
        )),
        other => Ok(other),
    }
}

fn validate_forwarder(section: ForwarderSection) -> ConfigResult<ForwarderSettings> {
    ForwarderSettings::from_section(section)
}

pub(crate) fn parse_url(raw: &str) -> ConfigResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::missing("forwarder", "url"));
    }
    let url = Url::parse(trimmed).map_err(|_| {
        ConfigError::invalid("forwarder", "url", Some(trimmed.to_string()), "malformed")
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ConfigError::invalid(
            "forwarder",
            "url",
            Some(trimmed.to_string()),
            "unsupported_scheme",
        )),
    }
}

fn validate_delivery(section: &DeliverySection) -> ConfigResult<DeliveryPolicy> {
    let timeout = match section.timeout_secs {
        Some(0) => {
            return Err(ConfigError::invalid(
                "delivery",
                "timeout_secs",
                Some("0".to_string()),
                "must_be_positive",
            ));
        }
        Some(secs) => Duration::from_secs(secs),
        None => DEFAULT_TIMEOUT,
    };
    let max_attempts = section.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
    if max_attempts == 0 || max_attempts > MAX_ATTEMPTS_LIMIT {
        return Err(ConfigError::invalid(
            "delivery",
            "max_attempts",
            Some(max_attempts.to_string()),
            "out_of_range",
        ));
    }
    let retry_backoff = section
        .retry_backoff_ms
        .map_or(DEFAULT_RETRY_BACKOFF, Duration::from_millis);
    Ok(DeliveryPolicy {
        timeout,
        max_attempts,
        retry_backoff,
    })
}

fn validate_logging(section: LoggingSection) -> ConfigResult<LoggingSettings> {
    let level = match section.level {
        Some(level) if level.trim().is_empty() => {
            return Err(ConfigError::invalid("logging", "level", Some(level), "blank"));
        }
        Some(level) => level.trim().to_string(),
        None => DEFAULT_LOG_LEVEL.to_string(),
    };
    let format = match section.format {
        Some(raw) => {
            let normalized = raw.trim().to_ascii_lowercase();
            if !LOG_FORMATS.contains(&normalized.as_str()) {
                return Err(ConfigError::invalid(
                    "logging",
                    "format",
                    Some(raw),
                    "unsupported",
                ));
            }
            Some(normalized)
        }
        None => None,
    };
    Ok(LoggingSettings { level, format })
}
