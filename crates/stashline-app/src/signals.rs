//! Shutdown signal handling.
//!
//! On Unix the binary stops on SIGINT, SIGTERM, or SIGQUIT, with
//! [`tokio::signal::ctrl_c`] awaited as a fallback. Elsewhere only
//! [`tokio::signal::ctrl_c`] is awaited.

/// Complete when the process receives a termination signal.
///
/// # Errors
///
/// Returns an error when the signal handlers cannot be registered.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Complete when the process receives Ctrl-C.
///
/// # Errors
///
/// Returns an error when the signal handler cannot be registered.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
