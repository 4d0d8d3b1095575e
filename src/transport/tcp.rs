// src/transport/tcp.rs

use super::{Acceptor, BoxedStream};
use crate::error::ZmqError;
use crate::socket::options::SocketOptions;
use async_trait::async_trait;
use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Per-stream TCP settings taken from socket options.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TcpTransportConfig {
  /// -1 leaves the OS default, 0 disables, 1 enables.
  keepalive: i32,
  keepalive_time: Option<Duration>,
  keepalive_interval: Option<Duration>,
  keepalive_count: Option<u32>,
}

impl From<&SocketOptions> for TcpTransportConfig {
  fn from(options: &SocketOptions) -> Self {
    let secs = |v: i32| (v > 0).then(|| Duration::from_secs(v as u64));
    Self {
      keepalive: options.tcp_keepalive,
      keepalive_time: secs(options.tcp_keepalive_idle),
      keepalive_interval: secs(options.tcp_keepalive_intvl),
      keepalive_count: (options.tcp_keepalive_cnt > 0).then_some(options.tcp_keepalive_cnt as u32),
    }
  }
}

pub(crate) struct TcpAcceptor {
  listener: TcpListener,
  uri: String,
  config: TcpTransportConfig,
}

impl TcpAcceptor {
  pub(crate) async fn bind(host: &str, port: u16, uri: &str, options: &SocketOptions) -> Result<Self, ZmqError> {
    let addr = match host {
      "*" => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
      _ => resolve(host, port, uri).await?,
    };
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket
      .bind(&addr.into())
      .map_err(|e| ZmqError::from_io_endpoint(e, uri))?;
    socket
      .listen(options.backlog.min(i32::MAX as u32) as i32)
      .map_err(|e| ZmqError::from_io_endpoint(e, uri))?;
    let listener = TcpListener::from_std(socket.into())?;
    let local = listener.local_addr()?;
    tracing::info!(uri, %local, "TCP listener bound");
    Ok(Self {
      listener,
      uri: format!("tcp://{}", local),
      config: TcpTransportConfig::from(options),
    })
  }
}

#[async_trait]
impl Acceptor for TcpAcceptor {
  async fn accept(&mut self) -> io::Result<(BoxedStream, String)> {
    let (stream, peer) = self.listener.accept().await?;
    apply_tcp_socket_options(&stream, &self.config)?;
    Ok((Box::new(stream), format!("tcp://{}", peer)))
  }

  fn local_uri(&self) -> String {
    self.uri.clone()
  }
}

/// Resolves `host:port`, preferring a literal address over DNS.
pub(crate) async fn resolve(host: &str, port: u16, uri: &str) -> Result<SocketAddr, ZmqError> {
  if let Ok(ip) = host.parse::<IpAddr>() {
    return Ok(SocketAddr::new(ip, port));
  }
  let mut addrs = tokio::net::lookup_host((host, port))
    .await
    .map_err(|e| ZmqError::EndpointResolutionFailed(format!("{}: {}", uri, e)))?;
  addrs
    .next()
    .ok_or_else(|| ZmqError::EndpointResolutionFailed(uri.to_string()))
}

pub(crate) async fn connect(addr: SocketAddr, uri: &str, options: &SocketOptions) -> Result<(BoxedStream, String), ZmqError> {
  let stream = TcpStream::connect(addr)
    .await
    .map_err(|e| ZmqError::from_io_endpoint(e, uri))?;
  apply_tcp_socket_options(&stream, &TcpTransportConfig::from(options))?;
  let peer = stream.peer_addr().map(|a| format!("tcp://{}", a)).unwrap_or_else(|_| uri.to_string());
  Ok((Box::new(stream), peer))
}

fn apply_tcp_socket_options(stream: &TcpStream, config: &TcpTransportConfig) -> io::Result<()> {
  let socket_ref = SockRef::from(stream);
  socket_ref.set_nodelay(true)?;

  match config.keepalive {
    0 => socket_ref.set_keepalive(false)?,
    1 => {
      let mut keepalive = TcpKeepalive::new();
      if let Some(time) = config.keepalive_time {
        keepalive = keepalive.with_time(time);
      }
      #[cfg(any(unix, target_os = "windows"))]
      if let Some(interval) = config.keepalive_interval {
        keepalive = keepalive.with_interval(interval);
      }
      #[cfg(unix)]
      if let Some(count) = config.keepalive_count {
        keepalive = keepalive.with_retries(count);
      }
      socket_ref.set_tcp_keepalive(&keepalive)?;
      tracing::trace!(?keepalive, "Applied TCP keepalive");
    }
    _ => {}
  }
  Ok(())
}
