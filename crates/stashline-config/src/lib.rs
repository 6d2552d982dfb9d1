#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![warn(unreachable_pub, clippy::all, clippy::pedantic, clippy::nursery)]

//! Configuration loading and validation for Stashline.
//!
//! Layout: `model.rs` (raw document and validated settings), `loader.rs`
//! (YAML file + environment overlay), `validate.rs` (document → settings),
//! `defaults.rs` (fallback values), `error.rs` (`ConfigError`).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_with};
pub use model::{
    ConfigDocument, DeliveryPolicy, ForwarderSection, ForwarderSettings, HostOptions,
    LoggingSettings, StashlineConfig,
};
pub use validate::validate;
