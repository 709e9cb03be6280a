//! Reads messages as JSON lines on stdin and writes one JSON reply per line.

use app::telemetry::{init_tracing, install_metrics};
use app::{AppConfig, UserService, USERS};
use event_store::InMemoryEventStore;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, shutting down");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}

#[tokio::main]
async fn main() -> app::Result<()> {
    // 1. Configuration and telemetry
    let config = AppConfig::from_env();
    init_tracing(&config)?;
    let metrics_handle = install_metrics()?;

    // 2. Event store, engine and read models
    let service = UserService::start(InMemoryEventStore::new(), config.engine.clone()).await?;

    // 3. Dispatch input lines until EOF or a shutdown signal
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            () = &mut shutdown => break,
        };
        let Some(line) = line? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = service.handle_line(&line).await;
        let mut out = serde_json::to_vec(&reply)?;
        out.push(b'\n');
        if let Err(err) = stdout.write_all(&out).await.and(stdout.flush().await) {
            tracing::error!(error = %err, "stdout closed");
            break;
        }
    }

    tracing::info!(users = service.documents.count(USERS).await, "stopped");
    tracing::debug!(metrics = %metrics_handle.render(), "final metrics");
    Ok(())
}
