use anyhow::{Context, Result};
use common::{Command, Response, ReviewError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot, watch};

use crate::player::PlayerRequest;

pub async fn start(
    socket_path: PathBuf,
    player_tx: mpsc::Sender<PlayerRequest>,
    shutdown_tx: Arc<watch::Sender<bool>>,
) -> Result<()> {
    // Remove old socket if it exists
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)
            .with_context(|| format!("Failed to remove stale socket {}", socket_path.display()))?;
    }

    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("Failed to bind {}", socket_path.display()))?;
    log::info!("IPC server listening on: {}", socket_path.display());

    let mut shutdown = shutdown_tx.subscribe();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,

            accept_result = listener.accept() => match accept_result {
                Ok((stream, _addr)) => {
                    let player_tx = player_tx.clone();
                    let shutdown_tx = shutdown_tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, player_tx, shutdown_tx).await {
                            log::error!("Error handling client: {}", e);
                        }
                    });
                }
                Err(e) => {
                    log::error!("Error accepting connection: {}", e);
                }
            },
        }
    }

    // Clean up socket
    let _ = std::fs::remove_file(&socket_path);
    log::info!("IPC server stopped");
    Ok(())
}

async fn handle_client(
    stream: UnixStream,
    player_tx: mpsc::Sender<PlayerRequest>,
    shutdown_tx: Arc<watch::Sender<bool>>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<Command>(&line) {
            Ok(command) => handle_command(command, &player_tx, &shutdown_tx).await,
            Err(e) => {
                log::warn!("Invalid command: {}", e);
                Response::Error(ReviewError::Ipc(format!("Invalid command: {}", e)))
            }
        };

        // Send response
        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        line.clear();
    }

    Ok(())
}

async fn handle_command(
    command: Command,
    player_tx: &mpsc::Sender<PlayerRequest>,
    shutdown_tx: &watch::Sender<bool>,
) -> Response {
    match command {
        Command::Ping => Response::Pong,

        Command::Kill => {
            log::info!("Received kill command, shutting down...");
            shutdown_tx.send_replace(true);
            Response::Ok
        }

        command => {
            let (reply, reply_rx) = oneshot::channel();
            if player_tx.send(PlayerRequest { command, reply }).await.is_err() {
                return Response::Error(ReviewError::Ipc("player is not running".to_string()));
            }
            reply_rx.await.unwrap_or_else(|_| {
                Response::Error(ReviewError::Ipc("player dropped the request".to_string()))
            })
        }
    }
}
