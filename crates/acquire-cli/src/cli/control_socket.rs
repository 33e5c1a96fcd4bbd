//! Control socket: served by a foreground `acquire start`/`resume`, used by
//! `acquire pause` and `acquire cancel` from another shell.
//!
//! Protocol: one request per line, `pause <id>` or `cancel <id>`; the server
//! answers each with `ok` or `error: <message>`.

use acquire_core::control::ControlRequest;
use acquire_core::Engine;
use anyhow::{Context, Result};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

/// Listening socket; stops serving and unlinks the path when dropped.
pub struct ControlListener {
    path: PathBuf,
    task: JoinHandle<()>,
}

impl ControlListener {
    /// Bind `path` (replacing a stale socket file) and serve requests against `engine`.
    pub fn bind(engine: Engine, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        match std::fs::remove_file(&path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "remove stale socket: {}", e)
            }
            _ => {}
        }
        let listener = UnixListener::bind(&path)
            .with_context(|| format!("bind control socket {}", path.display()))?;
        tracing::debug!(path = %path.display(), "control socket listening");

        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        tokio::spawn(serve(engine.clone(), stream));
                    }
                    Err(e) => tracing::debug!("control socket accept: {}", e),
                }
            }
        });
        Ok(Self { path, task })
    }
}

impl Drop for ControlListener {
    fn drop(&mut self) {
        self.task.abort();
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn serve(engine: Engine, stream: UnixStream) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let reply = match ControlRequest::parse(&line) {
            None => format!("error: unknown request {:?}", line.trim()),
            Some(req) => {
                tracing::info!(request = %req, "control request");
                let result = match req {
                    ControlRequest::Pause(id) => engine.pause(id).await,
                    ControlRequest::Cancel(id) => engine.cancel(id).await,
                };
                match result {
                    Ok(()) => "ok".to_string(),
                    Err(e) => format!("error: {e}"),
                }
            }
        };
        if write.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
            break;
        }
    }
}

/// True if a process is accepting connections on `path`.
pub async fn is_live(path: &Path) -> bool {
    UnixStream::connect(path).await.is_ok()
}

/// Send `req` and return the server's reply line, or `None` when no process
/// is listening.
pub async fn send_request(path: &Path, req: ControlRequest) -> Result<Option<String>> {
    let stream = match UnixStream::connect(path).await {
        Ok(s) => s,
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
            ) =>
        {
            return Ok(None)
        }
        Err(e) => return Err(e).context("connect to control socket"),
    };
    let (read, mut write) = stream.into_split();
    write.write_all(format!("{req}\n").as_bytes()).await?;
    let reply = BufReader::new(read)
        .lines()
        .next_line()
        .await?
        .context("control socket closed without a reply")?;
    Ok(Some(reply))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_listener_means_no_reply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.sock");
        assert!(!is_live(&path).await);
        let reply = send_request(&path, ControlRequest::Pause(1)).await.unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn stale_socket_file_is_not_live() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.sock");
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());
        assert!(!is_live(&path).await);
        assert!(send_request(&path, ControlRequest::Cancel(2))
            .await
            .unwrap()
            .is_none());
    }
}
