use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use classgrid::board::{Board, ShellCommand};
use classgrid::config::Config;
use classgrid::store::{InMemoryStore, Seed};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let config = Config::from_env();
    classgrid::observability::init(config.metrics_port)?;

    let seed = match &config.seed_path {
        Some(path) => serde_json::from_str::<Seed>(&std::fs::read_to_string(path)?)?,
        None => Seed::default(),
    };
    info!("classgrid starting");
    info!("  seed: {} rooms, {} blocks", seed.rooms.len(), seed.blocks.len());
    info!(
        "  view: {} day(s) from {}, {}..{}",
        config.geometry.visible_days,
        config.geometry.first_day,
        classgrid::model::format_hhmm(config.geometry.min_time),
        classgrid::model::format_hhmm(config.geometry.max_time)
    );
    info!("  read_only: {}", config.gesture.read_only);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let store = Arc::new(InMemoryStore::from_seed(seed));
    let (board, mut notices) = Board::mount(store, config.geometry, config.gesture)?;

    // Notices go out as JSON lines on stdout.
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(notice) = notices.recv().await {
            let mut line = match serde_json::to_vec(&notice) {
                Ok(line) => line,
                Err(e) => {
                    warn!("unserializable notice: {e}");
                    continue;
                }
            };
            line.push(b'\n');
            if stdout.write_all(&line).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    // Graceful shutdown: stop reading on SIGTERM/ctrl-c or stdin EOF
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    warn!("SIGTERM handler unavailable: {e}");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("stdin read error: {e}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ShellCommand>(&line) {
                    Ok(command) => board.send(command)?,
                    Err(e) => warn!("ignoring malformed command: {e}"),
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    board.unmount().await;
    writer.await?;
    info!("classgrid stopped");
    Ok(())
}
