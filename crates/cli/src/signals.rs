//! Operator interrupt handling.

use anyhow::{Context, Result};
use tracing::info;

use branchsync_core::interact::CancelFlag;

/// Register SIGINT/SIGTERM handlers that raise `flag`.
///
/// Once installed, an interrupt no longer kills the process outright: the
/// engine sees the flag at its next check and unwinds through restoration.
pub fn install_cancel_handler(flag: CancelFlag) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("received SIGINT (Ctrl+C), cancelling");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, cancelling");
                }
            }
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received Ctrl+C, cancelling");
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        });
    }

    Ok(())
}
