//! Bootstrap wiring for the Stashline binary.
//!
//! Loads configuration, installs logging, and runs the forwarder until a
//! shutdown signal arrives or the subscription fails.

use std::future::Future;
use std::io;
use std::sync::Arc;

use stashline_config::{StashlineConfig, load_config_with};
use stashline_events::{EventBusClient, SocketBusClient};
use stashline_forwarder::{Forwarder, ForwarderDeps, HttpClient, ReqwestClient};
use stashline_telemetry::{
    DEFAULT_LOG_LEVEL, GlobalContextGuard, LoggingConfig, Metrics, build_sha, init_logging,
    log_format_from_name,
};
use tracing::{error, info, warn};

use crate::cli::Cli;
use crate::error::{AppError, AppResult};
use crate::signals::wait_for_shutdown_signal;

/// Dependencies required to bootstrap the forwarder.
pub(crate) struct BootstrapDependencies {
    pub(crate) config: StashlineConfig,
    pub(crate) metrics: Metrics,
    pub(crate) bus: Arc<dyn EventBusClient>,
    pub(crate) http: Arc<dyn HttpClient>,
}

impl BootstrapDependencies {
    /// Resolve configuration from the CLI and environment and build the
    /// production bus and HTTP clients.
    pub(crate) fn from_cli(cli: &Cli) -> AppResult<Self> {
        let config = resolve_config(cli, |key| std::env::var(key).ok())?;
        Self::from_config(config)
    }

    pub(crate) fn from_config(config: StashlineConfig) -> AppResult<Self> {
        let metrics =
            Metrics::new().map_err(|source| AppError::telemetry("metrics.init", source))?;
        let http = ReqwestClient::new(config.delivery.timeout)
            .map_err(|source| AppError::forwarder("http_client.init", source))?;
        Ok(Self {
            config,
            metrics,
            bus: Arc::new(SocketBusClient::new()),
            http: Arc::new(http),
        })
    }
}

/// Resolve configuration and apply the command-line logging overrides.
pub(crate) fn resolve_config<F>(cli: &Cli, lookup: F) -> AppResult<StashlineConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = load_config_with(cli.config.as_deref(), lookup)
        .map_err(|source| AppError::config("config.load", source))?;
    if let Some(level) = cli.log_level.as_deref().map(str::trim)
        && !level.is_empty()
    {
        config.logging.level = level.to_string();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = Some(format.to_ascii_lowercase());
    }
    Ok(config)
}

/// Entry point for the Stashline binary.
///
/// # Errors
///
/// Returns an error if configuration fails to load, logging cannot be
/// installed, or the forwarder stops on a fatal error.
pub async fn run_app(cli: Cli) -> AppResult<()> {
    let dependencies = match BootstrapDependencies::from_cli(&cli) {
        Ok(dependencies) => dependencies,
        Err(err) => {
            // Logging settings from the file are unavailable here.
            let _ = init_logging(&fallback_logging(&cli));
            error!(error = %err, operation = operation_of(&err), "stashline failed to start");
            return Err(err);
        }
    };

    let logging = LoggingConfig {
        level: &dependencies.config.logging.level,
        format: log_format_from_name(dependencies.config.logging.format.as_deref()),
        build_sha: build_sha(),
    };
    init_logging(&logging).map_err(|source| AppError::telemetry("logging.init", source))?;
    let _context = GlobalContextGuard::new(dependencies.config.host.role().as_str());

    let result = run_app_with(dependencies, wait_for_shutdown_signal()).await;
    if let Err(err) = &result {
        error!(error = %err, operation = operation_of(err), "stashline stopped on error");
    }
    result
}

/// Logging settings taken from the command line alone, used when the
/// configuration itself cannot be loaded.
pub(crate) fn fallback_logging(cli: &Cli) -> LoggingConfig<'_> {
    let level = cli
        .log_level
        .as_deref()
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_LOG_LEVEL);
    LoggingConfig {
        level,
        format: log_format_from_name(cli.log_format.as_deref()),
        build_sha: build_sha(),
    }
}

/// Run the forwarder against pre-built dependencies until `shutdown`
/// resolves or the forwarder stops by itself.
pub(crate) async fn run_app_with<S>(
    dependencies: BootstrapDependencies,
    shutdown: S,
) -> AppResult<()>
where
    S: Future<Output = io::Result<()>>,
{
    let BootstrapDependencies {
        config,
        metrics,
        bus,
        http,
    } = dependencies;

    info!(
        host_id = %config.host.id,
        role = config.host.role().as_str(),
        url = %config.forwarder.url,
        tags = config.forwarder.tags.len(),
        funs = config.forwarder.funs.len(),
        "starting event forwarder"
    );

    let forwarder = Forwarder::new(
        &config,
        ForwarderDeps {
            bus,
            http,
            metrics: metrics.clone(),
        },
    )
    .map_err(|source| AppError::forwarder("forwarder.init", source))?;

    let handle = forwarder.spawn();
    let cancel = handle.cancellation_token();
    let mut running = std::pin::pin!(handle.wait());
    let mut shutdown = std::pin::pin!(shutdown);

    let result = tokio::select! {
        result = &mut running => result,
        signal = &mut shutdown => {
            match signal {
                Ok(()) => info!("shutdown signal received"),
                Err(err) => warn!(error = %err, "signal listener failed; shutting down"),
            }
            cancel.cancel();
            running.await
        }
    };

    let snapshot = metrics.snapshot();
    info!(
        received = snapshot.events_received_total,
        forwarded = snapshot.events_forwarded_total,
        filtered = snapshot.events_filtered_total,
        failures = snapshot.delivery_failures_total,
        lagged = snapshot.bus_lagged_events_total,
        "event forwarder stopped"
    );

    result.map_err(|source| AppError::forwarder("forwarder.run", source))
}

const fn operation_of(err: &AppError) -> &'static str {
    match err {
        AppError::Config { operation, .. }
        | AppError::Telemetry { operation, .. }
        | AppError::Forwarder { operation, .. } => operation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    use serde_json::json;
    use stashline_config::ConfigError;
    use stashline_events::{SubscriptionError, SubscriptionItem};
    use stashline_forwarder::ForwarderError;
    use stashline_telemetry::LogFormat;
    use stashline_test_support::fixtures::event;
    use stashline_test_support::mocks::{ScriptEnd, ScriptedBusClient};

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_config(contents: &str) -> anyhow::Result<tempfile::NamedTempFile> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(contents.as_bytes())?;
        Ok(file)
    }

    fn scripted(
        config: StashlineConfig,
        bus: &ScriptedBusClient,
    ) -> anyhow::Result<BootstrapDependencies> {
        let mut dependencies = BootstrapDependencies::from_config(config)?;
        dependencies.bus = Arc::new(bus.clone());
        Ok(dependencies)
    }

    fn base_config() -> anyhow::Result<StashlineConfig> {
        let file = write_config(
            "forwarder:\n  url: http://127.0.0.1:9/salt\ndelivery:\n  timeout_secs: 1\n",
        )?;
        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            ..Cli::default()
        };
        Ok(resolve_config(&cli, no_env)?)
    }

    #[test]
    fn cli_overrides_logging_settings() -> anyhow::Result<()> {
        let file = write_config(
            "forwarder:\n  url: http://logstash.local/salt\nlogging:\n  level: warn\n  format: pretty\n",
        )?;
        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            log_level: Some("debug".into()),
            log_format: Some("json".into()),
        };
        let config = resolve_config(&cli, no_env)?;
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format.as_deref(), Some("json"));

        let untouched = resolve_config(
            &Cli {
                config: Some(file.path().to_path_buf()),
                log_level: Some("  ".into()),
                log_format: None,
            },
            no_env,
        )?;
        assert_eq!(untouched.logging.level, "warn");
        assert_eq!(untouched.logging.format.as_deref(), Some("pretty"));
        Ok(())
    }

    #[test]
    fn fallback_logging_uses_cli_settings() {
        let cli = Cli::default();
        let defaults = fallback_logging(&cli);
        assert_eq!(defaults.level, DEFAULT_LOG_LEVEL);
        assert_eq!(defaults.format, LogFormat::infer());

        let cli = Cli {
            config: None,
            log_level: Some(" debug ".into()),
            log_format: Some("json".into()),
        };
        let logging = fallback_logging(&cli);
        assert_eq!(logging.level, "debug");
        assert_eq!(logging.format, LogFormat::Json);
    }

    #[test]
    fn missing_url_is_a_config_error() {
        let err = resolve_config(&Cli::default(), no_env).expect_err("url is required");
        assert!(matches!(
            err,
            AppError::Config {
                operation: "config.load",
                source: ConfigError::MissingField { field: "url", .. }
            }
        ));
        assert_eq!(operation_of(&err), "config.load");
    }

    #[tokio::test]
    async fn shutdown_signal_stops_forwarder_cleanly() -> anyhow::Result<()> {
        let bus = ScriptedBusClient::new(Vec::new());
        let dependencies = scripted(base_config()?, &bus)?;

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_app_with(dependencies, async { Ok(()) }),
        )
        .await?;
        assert!(result.is_ok());
        assert_eq!(bus.opens(), 1);
        assert_eq!(bus.closes(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn failing_signal_listener_still_shuts_down() -> anyhow::Result<()> {
        let bus = ScriptedBusClient::new(Vec::new());
        let dependencies = scripted(base_config()?, &bus)?;

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_app_with(dependencies, async {
                Err(io::Error::other("no signal handlers"))
            }),
        )
        .await?;
        assert!(result.is_ok());
        assert_eq!(bus.closes(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn subscription_loss_surfaces_as_forwarder_error() -> anyhow::Result<()> {
        let bus = ScriptedBusClient::with_items(
            vec![SubscriptionItem::Event(event(
                "other/tag",
                &json!({"fun": "test.ping"}),
            ))],
            ScriptEnd::Closed,
        );
        let mut config = base_config()?;
        config.forwarder.tags = vec!["salt/job/*".into()];
        let dependencies = scripted(config, &bus)?;
        let metrics = dependencies.metrics.clone();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_app_with(dependencies, std::future::pending()),
        )
        .await?;
        assert!(matches!(
            result,
            Err(AppError::Forwarder {
                operation: "forwarder.run",
                source: ForwarderError::Subscription {
                    source: SubscriptionError::Closed { .. }
                }
            })
        ));
        assert_eq!(bus.closes(), 1);
        assert_eq!(metrics.snapshot().events_filtered_total, 1);
        Ok(())
    }
}
