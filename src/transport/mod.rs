// src/transport/mod.rs

//! Byte-stream transports and the tasks that drive them.

pub(crate) mod connecter;
pub(crate) mod endpoint;
#[cfg(feature = "inproc")]
pub(crate) mod inproc;
#[cfg(feature = "ipc")]
pub(crate) mod ipc;
pub(crate) mod listener;
pub(crate) mod tcp;

use crate::error::ZmqError;
use crate::socket::options::SocketOptions;
use async_trait::async_trait;
use endpoint::Endpoint;
use std::io;
use std::net::SocketAddr;
#[cfg(feature = "ipc")]
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};

/// Any connected, bidirectional byte stream a session can run over.
pub(crate) trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteStream for T {}

pub(crate) type BoxedStream = Box<dyn ByteStream>;

/// A bound listening transport.
#[async_trait]
pub(crate) trait Acceptor: Send {
  /// Waits for the next inbound connection; returns it with the peer's address.
  async fn accept(&mut self) -> io::Result<(BoxedStream, String)>;

  /// The resolved URI, e.g. with the OS-assigned port filled in.
  fn local_uri(&self) -> String;
}

/// A resolved address to connect to.
#[derive(Debug, Clone)]
pub(crate) enum ConnectTarget {
  Tcp(SocketAddr),
  #[cfg(feature = "ipc")]
  Ipc(PathBuf),
}

/// Binds a listening transport for `endpoint`.
pub(crate) async fn listen(endpoint: &Endpoint, options: &SocketOptions) -> Result<Box<dyn Acceptor>, ZmqError> {
  match endpoint {
    Endpoint::Tcp { host, port, uri } => Ok(Box::new(tcp::TcpAcceptor::bind(host, *port, uri, options).await?)),
    #[cfg(feature = "ipc")]
    Endpoint::Ipc(path, uri) => Ok(Box::new(ipc::IpcAcceptor::bind(path.clone(), uri)?)),
    #[cfg(feature = "inproc")]
    Endpoint::Inproc(_) => Err(ZmqError::Internal("inproc endpoints are not handled by I/O threads".into())),
  }
}

/// Resolves the address a connecter should dial.
pub(crate) async fn resolve(endpoint: &Endpoint) -> Result<ConnectTarget, ZmqError> {
  match endpoint {
    Endpoint::Tcp { host, port, uri } => tcp::resolve(host, *port, uri).await.map(ConnectTarget::Tcp),
    #[cfg(feature = "ipc")]
    Endpoint::Ipc(path, _) => Ok(ConnectTarget::Ipc(path.clone())),
    #[cfg(feature = "inproc")]
    Endpoint::Inproc(_) => Err(ZmqError::Internal("inproc endpoints are not handled by I/O threads".into())),
  }
}

/// Opens one connection, bounded by CONNECT_TIMEOUT.
pub(crate) async fn connect(
  target: &ConnectTarget,
  uri: &str,
  options: &SocketOptions,
) -> Result<(BoxedStream, String), ZmqError> {
  let attempt = async {
    match target {
      ConnectTarget::Tcp(addr) => tcp::connect(*addr, uri, options).await,
      #[cfg(feature = "ipc")]
      ConnectTarget::Ipc(path) => ipc::connect(path, uri).await,
    }
  };
  match options.connect_timeout {
    Some(limit) => tokio::time::timeout(limit, attempt).await.map_err(|_| ZmqError::Timeout)?,
    None => attempt.await,
  }
}
