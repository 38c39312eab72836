use std::io;

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Returns a token that is cancelled on the first SIGINT or SIGTERM (Ctrl-C
/// on non-unix targets). On unix the handlers are installed before this
/// returns, so a signal sent right afterwards is not missed.
pub fn shutdown_on_signal() -> io::Result<CancellationToken> {
    let token = CancellationToken::new();
    let trigger = token.clone();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
            trigger.cancel();
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C"),
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                return;
            }
        }
        trigger.cancel();
    });

    Ok(token)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn token_stays_live_without_signal() {
        let token = shutdown_on_signal().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!token.is_cancelled());
    }
}
