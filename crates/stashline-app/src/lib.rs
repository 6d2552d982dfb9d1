#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![warn(unreachable_pub, clippy::all, clippy::pedantic, clippy::nursery)]

//! Stashline application bootstrap wiring.
//!
//! Layout: `cli.rs` (command-line surface), `bootstrap.rs` (configuration,
//! logging, and forwarder wiring), `signals.rs` (shutdown signals),
//! `error.rs` (application errors).

/// Application bootstrap and dependency wiring.
pub mod bootstrap;
/// Command-line arguments.
pub mod cli;
/// Application-level errors.
pub mod error;
/// Process shutdown signals.
pub mod signals;

pub use bootstrap::run_app;
pub use cli::Cli;
pub use error::{AppError, AppResult};
