use crate::server::{self, AppState};
use outsync_core::config::Settings;
use outsync_core::OutputEngine;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn run(
    root: PathBuf,
    settings: Settings,
    terminal: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let port = settings.port;
    let engine = Arc::new(OutputEngine::new(root, settings));

    info!("Indexing workspace at {}...", engine.root().display());
    engine.enable().await;

    // Start background watcher
    engine.clone().watch().await?;
    info!("File watcher started. Ready for changes.");

    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
        }
        signal_token.cancel();
    });

    let state = if terminal {
        AppState::with_terminal(engine.clone())
    } else {
        AppState::with_stdout(engine.clone())
    };
    let state = Arc::new(state);
    let result = server::run_http_server(state, port, cancel_token).await;

    engine.shutdown();
    info!("Listener stopped.");
    result?;
    Ok(())
}
