use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments for the `stashline` binary.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "stashline",
    version,
    about = "Forward event bus traffic to a Logstash HTTP input"
)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, short = 'c', env = "STASHLINE_CONFIG")]
    pub config: Option<PathBuf>,
    /// Log level directive; `RUST_LOG` still takes precedence.
    #[arg(long)]
    pub log_level: Option<String>,
    /// Log output format.
    #[arg(long, value_parser = ["json", "pretty"])]
    pub log_format: Option<String>,
}
