//! Unix domain socket broadcast for session events

#![cfg(target_family = "unix")]

use crate::error::{Error, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const CHANNEL_CAPACITY: usize = 128;

/// Streams JSON lines to every connected Unix domain socket client.
///
/// Clients that fall behind skip the lines they missed.
pub struct UnixBroadcast {
    sender: broadcast::Sender<Arc<String>>,
    accept_task: JoinHandle<()>,
    socket_path: PathBuf,
}

impl UnixBroadcast {
    /// Bind to `path`, replacing a stale socket file, and spawn the accept loop.
    pub async fn bind(path: &Path) -> Result<Arc<Self>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_context(e, format!("create directory {}", parent.display())))?;
        }

        if path.exists() {
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| io_context(e, format!("remove stale socket {}", path.display())))?;
        }

        let listener = UnixListener::bind(path)
            .map_err(|e| io_context(e, format!("bind Unix socket {}", path.display())))?;

        let (sender, _) = broadcast::channel::<Arc<String>>(CHANNEL_CAPACITY);
        let accept_sender = sender.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        tracing::debug!("Unix socket client connected");
                        tokio::spawn(handle_client(stream, accept_sender.subscribe()));
                    }
                    Err(err) => tracing::warn!("Unix socket accept error: {err}"),
                }
            }
        });

        tracing::info!("Publishing scan events on {}", path.display());
        Ok(Arc::new(Self {
            sender,
            accept_task,
            socket_path: path.to_path_buf(),
        }))
    }

    /// Path the listener is bound to
    pub fn path(&self) -> &Path {
        &self.socket_path
    }

    /// Broadcast a JSON value to all connected listeners.
    ///
    /// Having no listeners is not an error.
    pub fn send_value(&self, value: &Value) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender
            .send(Arc::new(payload))
            .map(|_| ())
            .map_err(|err| Error::Other(format!("Failed to broadcast to Unix socket clients: {err}")))
    }
}

impl Drop for UnixBroadcast {
    fn drop(&mut self) {
        self.accept_task.abort();
        if let Err(err) = std::fs::remove_file(&self.socket_path) {
            tracing::debug!(
                "Failed to cleanup Unix socket {}: {err}",
                self.socket_path.display()
            );
        }
    }
}

fn io_context(err: std::io::Error, action: String) -> Error {
    Error::Io(std::io::Error::new(err.kind(), format!("Failed to {action}: {err}")))
}

async fn handle_client(mut stream: UnixStream, mut rx: broadcast::Receiver<Arc<String>>) {
    loop {
        let payload = match rx.recv().await {
            Ok(payload) => payload,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Unix socket client lagged, skipped {skipped} events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let line = format!("{payload}\n");
        if let Err(err) = stream.write_all(line.as_bytes()).await {
            tracing::debug!("Unix socket client write error: {err}");
            break;
        }
        if let Err(err) = stream.flush().await {
            tracing::debug!("Unix socket flush error: {err}");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn clients_receive_json_lines() {
        let dir = std::env::temp_dir().join(format!("pdfscan-sock-{}", uuid::Uuid::new_v4()));
        let path = dir.join("events.sock");
        let broadcast = UnixBroadcast::bind(&path).await.unwrap();

        let client = UnixStream::connect(&path).await.unwrap();
        let mut lines = BufReader::new(client).lines();

        // The accept loop subscribes asynchronously
        while broadcast.sender.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }
        broadcast.send_value(&json!({ "event": "ping" })).unwrap();

        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(line, r#"{"event":"ping"}"#);

        drop(broadcast);
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(dir);
    }
}
