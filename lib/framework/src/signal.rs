use tokio::signal::unix::{SignalKind, signal};

use crate::CancelHandle;

/// Waits for SIGINT or SIGTERM, then cancels `handle`.
///
/// A second signal after that terminates the process immediately.
pub async fn cancel_on_signal(handle: CancelHandle) -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    };
    info!(message = "Signal received", signal = name);

    handle.cancel();

    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
    warn!(message = "Second signal received, exit immediately");

    std::process::exit(exitcode::SOFTWARE)
}
