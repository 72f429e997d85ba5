use super::codec::{read_frame, write_frame};
use super::IpcError;
use crate::model::WireMessage;
use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

/// Callback invoked once per inbound frame. A `Some` return is written back to
/// the sender of that frame.
pub type MessageHandler = Arc<dyn Fn(Bytes) -> Option<Bytes> + Send + Sync>;

/// A named local endpoint.
///
/// Clones share the send-and-wait lock, so at most one correlated request is in
/// flight per channel regardless of how many clones exist.
#[derive(Debug, Clone)]
pub struct LocalChannel {
    name: String,
    path: PathBuf,
    wait_lock: Arc<Mutex<()>>,
}

impl LocalChannel {
    pub fn new(socket_dir: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: socket_dir.join(format!("{name}.sock")),
            wait_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn connect(&self) -> Result<UnixStream, IpcError> {
        UnixStream::connect(&self.path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => IpcError::Unreachable {
                endpoint: self.name.clone(),
                source: e,
            },
            _ => self.io_error(e),
        })
    }

    fn io_error(&self, source: io::Error) -> IpcError {
        IpcError::Io {
            endpoint: self.name.clone(),
            source,
        }
    }

    /// Whether something currently accepts connections on this endpoint.
    pub async fn is_reachable(&self) -> bool {
        self.connect().await.is_ok()
    }

    /// Deliver one record without waiting for anything back.
    pub async fn send_and_forget(&self, message: &WireMessage) -> Result<(), IpcError> {
        let payload = message.encode()?;
        let mut stream = self.connect().await?;
        debug!(endpoint = %self.name, bytes = payload.len(), "sending");
        write_frame(&mut stream, &payload)
            .await
            .map_err(|e| self.io_error(e))?;
        stream.shutdown().await.map_err(|e| self.io_error(e))
    }

    /// Deliver one record and wait for exactly one reply.
    ///
    /// Returns `Ok(None)` when the peer answers with an empty frame or closes the
    /// connection without answering.
    pub async fn send_and_wait(
        &self,
        message: &WireMessage,
        timeout: Option<Duration>,
    ) -> Result<Option<Bytes>, IpcError> {
        let payload = message.encode()?;
        let _guard = self.wait_lock.lock().await;

        let exchange = async {
            let mut stream = self.connect().await?;
            debug!(endpoint = %self.name, bytes = payload.len(), "sending and waiting");
            write_frame(&mut stream, &payload)
                .await
                .map_err(|e| self.io_error(e))?;
            stream.shutdown().await.map_err(|e| self.io_error(e))?;
            let reply = read_frame(&mut stream)
                .await
                .map_err(|e| self.io_error(e))?;
            Ok::<_, IpcError>(reply.filter(|r| !r.is_empty()))
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| IpcError::Timeout {
                    endpoint: self.name.clone(),
                    timeout: limit,
                })?,
            None => exchange.await,
        }
    }

    /// Accept connections on this endpoint until the returned handle is stopped
    /// or dropped. Must be called from within a Tokio runtime.
    pub fn listen<F>(&self, on_message: F) -> Result<ListenHandle, IpcError>
    where
        F: Fn(Bytes) -> Option<Bytes> + Send + Sync + 'static,
    {
        let listener = self.bind()?;
        let handler: MessageHandler = Arc::new(on_message);
        let name = self.name.clone();

        let task = tokio::spawn(async move {
            // Connection tasks live in the set so aborting the accept loop tears them down too.
            let mut connections = JoinSet::new();
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => {
                            connections.spawn(serve_connection(stream, handler.clone(), name.clone()));
                        }
                        Err(e) => {
                            warn!(endpoint = %name, "accept failed: {e}");
                            tokio::time::sleep(Duration::from_millis(50)).await;
                        }
                    },
                    Some(_) = connections.join_next(), if !connections.is_empty() => {}
                }
            }
        });

        Ok(ListenHandle {
            task,
            path: self.path.clone(),
        })
    }

    fn bind(&self) -> Result<UnixListener, IpcError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }
        if self.path.exists() {
            // A live peer means another client owns the endpoint; otherwise the file is stale.
            if std::os::unix::net::UnixStream::connect(&self.path).is_ok() {
                return Err(IpcError::Busy {
                    endpoint: self.name.clone(),
                });
            }
            std::fs::remove_file(&self.path).map_err(|e| self.io_error(e))?;
        }
        UnixListener::bind(&self.path).map_err(|e| self.io_error(e))
    }
}

async fn serve_connection(stream: UnixStream, handler: MessageHandler, endpoint: String) {
    let (mut reader, mut writer) = stream.into_split();
    loop {
        let payload = match read_frame(&mut reader).await {
            Ok(Some(payload)) => payload,
            Ok(None) => break,
            Err(e) => {
                debug!(%endpoint, "dropping connection: {e}");
                break;
            }
        };
        if let Some(reply) = handler(payload) {
            if let Err(e) = write_frame(&mut writer, &reply).await {
                debug!(%endpoint, "could not deliver reply: {e}");
                break;
            }
        }
    }
}

/// Keeps a listener alive. Stopping (or dropping) it ends the accept loop, any
/// open connections, and removes the socket file.
#[derive(Debug)]
pub struct ListenHandle {
    task: JoinHandle<()>,
    path: PathBuf,
}

impl ListenHandle {
    pub fn stop(self) {}
}

impl Drop for ListenHandle {
    fn drop(&mut self) {
        self.task.abort();
        let _ = std::fs::remove_file(&self.path);
    }
}
