// src/transport/ipc.rs

use super::{Acceptor, BoxedStream};
use crate::error::ZmqError;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};

pub(crate) struct IpcAcceptor {
  listener: UnixListener,
  path: PathBuf,
  uri: String,
}

impl IpcAcceptor {
  /// Binds a unix socket. A leftover socket file nobody listens on is replaced.
  pub(crate) fn bind(path: PathBuf, uri: &str) -> Result<Self, ZmqError> {
    let listener = match UnixListener::bind(&path) {
      Ok(l) => l,
      Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
        if std::os::unix::net::UnixStream::connect(&path).is_ok() {
          return Err(ZmqError::AddrInUse(uri.to_string()));
        }
        tracing::debug!(path = ?path, "Removing stale IPC socket file");
        std::fs::remove_file(&path).map_err(|e| ZmqError::from_io_endpoint(e, uri))?;
        UnixListener::bind(&path).map_err(|e| ZmqError::from_io_endpoint(e, uri))?
      }
      Err(e) => return Err(ZmqError::from_io_endpoint(e, uri)),
    };
    tracing::info!(uri, "IPC listener bound");
    Ok(Self {
      listener,
      path,
      uri: uri.to_string(),
    })
  }
}

#[async_trait]
impl Acceptor for IpcAcceptor {
  async fn accept(&mut self) -> io::Result<(BoxedStream, String)> {
    let (stream, _) = self.listener.accept().await?;
    Ok((Box::new(stream), self.uri.clone()))
  }

  fn local_uri(&self) -> String {
    self.uri.clone()
  }
}

impl Drop for IpcAcceptor {
  fn drop(&mut self) {
    if let Err(e) = std::fs::remove_file(&self.path) {
      tracing::trace!(path = ?self.path, error = %e, "IPC socket file not removed");
    }
  }
}

pub(crate) async fn connect(path: &Path, uri: &str) -> Result<(BoxedStream, String), ZmqError> {
  let stream = UnixStream::connect(path)
    .await
    .map_err(|e| ZmqError::from_io_endpoint(e, uri))?;
  Ok((Box::new(stream), uri.to_string()))
}
