#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![warn(unreachable_pub, clippy::all, clippy::pedantic, clippy::nursery)]

//! Binary entrypoint that loads configuration and runs the event forwarder
//! until a shutdown signal arrives.

use clap::Parser;
use stashline_app::{AppResult, Cli, run_app};

/// Runs the forwarder and blocks until shutdown.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app(Cli::parse()).await
}
