use std::future::Future;

use anyhow::Result;

/// Resolves with the signal's name once the process is asked to stop.
///
/// Handlers are installed when this is called, not when the future is first
/// polled, so a signal arriving during startup still stops the worker
/// gracefully. SIGINT, SIGTERM and SIGQUIT all mean: stop claiming, let running
/// jobs finish.
#[cfg(unix)]
pub fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
            _ = quit.recv() => "SIGQUIT",
        }
    })
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "ctrl-c",
            Err(e) => {
                tracing::error!("Failed to listen for ctrl-c: {}", e);
                std::future::pending().await
            }
        }
    })
}
