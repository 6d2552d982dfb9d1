//! Configuration loading: YAML document plus environment overlay.
//!
//! # Design
//! - Precedence is defaults < file < environment; command-line logging
//!   flags are layered on top by the binary.
//! - Environment lookup is injected so tests never mutate process state.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{ConfigDocument, StashlineConfig};
use crate::validate::validate;

/// Destination endpoint override.
pub const ENV_URL: &str = "STASHLINE_URL";
/// Comma-separated tag glob patterns.
pub const ENV_TAGS: &str = "STASHLINE_TAGS";
/// Comma-separated allowed function names.
pub const ENV_FUNS: &str = "STASHLINE_FUNS";
/// Host identity override.
pub const ENV_ID: &str = "STASHLINE_ID";
/// Bus socket directory override.
pub const ENV_SOCK_DIR: &str = "STASHLINE_SOCK_DIR";
/// Bus transport override.
pub const ENV_TRANSPORT: &str = "STASHLINE_TRANSPORT";

/// Load configuration from an optional file and the process environment.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed, or when the
/// merged document fails validation.
pub fn load_config(path: Option<&Path>) -> ConfigResult<StashlineConfig> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Load configuration using a caller-supplied environment lookup.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed, or when the
/// merged document fails validation.
pub fn load_config_with<F>(path: Option<&Path>, lookup: F) -> ConfigResult<StashlineConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut document = match path {
        Some(path) => load_document(path)?,
        None => ConfigDocument::default(),
    };
    apply_env(&mut document, lookup);
    validate(document)
}

/// Read and parse a YAML configuration document.
///
/// An empty file yields the default document.
///
/// # Errors
///
/// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
pub fn load_document(path: &Path) -> ConfigResult<ConfigDocument> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loaded configuration file");
    if raw.trim().is_empty() {
        return Ok(ConfigDocument::default());
    }
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Overlay environment variables onto a document.
pub fn apply_env<F>(document: &mut ConfigDocument, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_URL) {
        document.forwarder.url = Some(url);
    }
    if let Some(tags) = lookup(ENV_TAGS) {
        document.forwarder.tags = Some(split_list(&tags));
    }
    if let Some(funs) = lookup(ENV_FUNS) {
        document.forwarder.funs = Some(split_list(&funs));
    }
    if let Some(id) = lookup(ENV_ID) {
        document.host.id = Some(id);
    }
    if let Some(dir) = lookup(ENV_SOCK_DIR) {
        document.host.sock_dir = Some(PathBuf::from(dir));
    }
    if let Some(transport) = lookup(ENV_TRANSPORT) {
        document.host.transport = Some(transport);
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ToString::to_string)
        .collect()
}
