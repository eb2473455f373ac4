//! Control socket: server (during `plget download`) and client (for `plget stop`).
//! Protocol: one line per command; only "shutdown" is understood.

use anyhow::Result;
use plget_core::control::ShutdownCoordinator;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixListener;

/// Spawns a task that listens on `path` and requests shutdown on a "shutdown"
/// line. Other lines are logged and ignored.
pub fn spawn_control_listener(
    shutdown: Arc<ShutdownCoordinator>,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)?;
    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let shutdown = Arc::clone(&shutdown);
                    tokio::spawn(async move {
                        let mut reader = BufReader::new(stream).lines();
                        while let Ok(Some(line)) = reader.next_line().await {
                            match line.trim() {
                                "shutdown" => {
                                    tracing::info!("shutdown requested over control socket");
                                    shutdown.request_shutdown();
                                }
                                "" => {}
                                other => tracing::debug!(line = other, "unknown control command"),
                            }
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

/// Sends "shutdown\n" to the control socket. Returns false if no socket exists.
pub async fn send_shutdown(socket_path: &Path) -> Result<bool> {
    if !socket_path.exists() {
        return Ok(false);
    }
    let mut stream = tokio::net::UnixStream::connect(socket_path).await?;
    tokio::io::AsyncWriteExt::write_all(&mut stream, b"shutdown\n").await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn shutdown_line_reaches_coordinator() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.sock");
        let shutdown = ShutdownCoordinator::shared();
        let handle = spawn_control_listener(Arc::clone(&shutdown), &path).unwrap();

        assert!(send_shutdown(&path).await.unwrap());
        tokio::time::timeout(Duration::from_secs(5), shutdown.wait_for_shutdown())
            .await
            .expect("shutdown not delivered");
        assert!(shutdown.is_shutdown_requested());
        handle.abort();
    }

    #[tokio::test]
    async fn missing_socket_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!send_shutdown(&dir.path().join("nope.sock")).await.unwrap());
    }
}
