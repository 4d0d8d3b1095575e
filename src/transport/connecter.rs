// src/transport/connecter.rs

use crate::error::ZmqError;
use crate::runtime::command::SocketLink;
use crate::runtime::pipe::Pipe;
use crate::runtime::signal::Signal;
use crate::session::{Session, SessionEnd};
use crate::socket::events::SocketEvent;
use crate::socket::options::SocketOptions;
use crate::transport::endpoint::Endpoint;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Where an outbound connection is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
  Resolving,
  Connecting,
  Handshaking,
  Connected,
  Disconnected,
  /// Waiting `backoff` before the next attempt.
  Reconnecting { backoff: Duration },
  Closed,
}

/// Snapshot returned by [`Socket::connection_status`](crate::Socket::connection_status).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
  pub endpoint: String,
  pub state: ConnectionState,
  /// Connection attempts made so far.
  pub attempts: u32,
  pub last_error: Option<String>,
}

/// Status cell shared between a socket and its connecter task.
#[derive(Debug, Clone)]
pub(crate) struct SharedStatus {
  inner: Arc<RwLock<ConnectionStatus>>,
}

impl SharedStatus {
  pub(crate) fn new(endpoint: &str) -> Self {
    Self {
      inner: Arc::new(RwLock::new(ConnectionStatus {
        endpoint: endpoint.to_string(),
        state: ConnectionState::Resolving,
        attempts: 0,
        last_error: None,
      })),
    }
  }

  /// Updates the state. `Closed` is final.
  pub(crate) fn set_state(&self, state: ConnectionState) {
    let mut status = self.inner.write();
    if status.state != ConnectionState::Closed {
      status.state = state;
    }
  }

  pub(crate) fn record_attempt(&self) {
    self.inner.write().attempts += 1;
  }

  pub(crate) fn record_error(&self, error: &ZmqError) {
    self.inner.write().last_error = Some(error.to_string());
  }

  pub(crate) fn snapshot(&self) -> ConnectionStatus {
    self.inner.read().clone()
  }
}

/// Reconnect delays: `base`, doubling up to `max` when `max` is non-zero.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
  base: Duration,
  max: Duration,
  current: Duration,
}

impl Backoff {
  pub(crate) fn new(base: Duration, max: Duration) -> Self {
    Self {
      base,
      max: if max.is_zero() { max } else { max.max(base) },
      current: base,
    }
  }

  pub(crate) fn next_delay(&mut self) -> Duration {
    let delay = self.current;
    if !self.max.is_zero() {
      self.current = (self.current * 2).min(self.max);
    }
    delay
  }

  pub(crate) fn reset(&mut self) {
    self.current = self.base;
  }
}

/// Task that owns one outbound endpoint: dials, runs a session, and redials
/// after failures or disconnects until stopped.
pub(crate) struct Connecter {
  pub link: SocketLink,
  pub endpoint: Endpoint,
  pub options: Arc<RwLock<SocketOptions>>,
  /// Session end of a pipe that outlives individual connections.
  pub pipe: Option<(Pipe, Signal)>,
  pub status: SharedStatus,
  pub cancel: CancellationToken,
}

/// How long a connecter keeps delivering after its socket let go of the pipe.
#[derive(Debug, Clone, Copy)]
enum Linger {
  Until(Instant),
  Forever,
}

impl Linger {
  /// Linger left for the next session.
  fn remaining(self) -> Option<Duration> {
    match self {
      Linger::Until(deadline) => Some(deadline.saturating_duration_since(Instant::now())),
      Linger::Forever => None,
    }
  }
}

impl Connecter {
  pub(crate) async fn run(mut self) {
    let uri = self.endpoint.uri();
    let socket_id = self.link.socket_id;
    let mut backoff = {
      let options = self.options.read();
      Backoff::new(options.reconnect_ivl.unwrap_or_default(), options.reconnect_ivl_max)
    };
    // Set once cancelled with messages still queued for the peer.
    let mut lingering: Option<Linger> = None;
    // The persistent pipe has carried an earlier connection.
    let mut resumed = false;
    tracing::debug!(socket_id, endpoint = %uri, "Connecter started");

    loop {
      if self.pipe_abandoned() {
        tracing::debug!(socket_id, endpoint = %uri, "Socket released the pipe, connecter stopping");
        break;
      }
      if lingering.is_none() && self.cancel.is_cancelled() {
        match self.linger_after_close() {
          Some(linger) => {
            tracing::debug!(socket_id, endpoint = %uri, ?linger, "Lingering to deliver queued messages");
            lingering = Some(linger);
          }
          None => break,
        }
      }
      let dialed = tokio::select! {
        biased;
        _ = self.stopped(lingering) => {
          if lingering.is_some() {
            break;
          }
          continue;
        }
        dialed = self.dial(&uri) => dialed,
      };

      match dialed {
        Ok((stream, peer_addr)) => {
          tracing::debug!(socket_id, endpoint = %uri, %peer_addr, "Connected");
          self.link.monitor.emit(SocketEvent::Connected {
            endpoint: uri.clone(),
            peer_addr,
          });
          self.status.set_state(ConnectionState::Handshaking);
          let mut options = self.options.read().clone();
          let cancel = match lingering {
            None => self.cancel.child_token(),
            Some(linger) => {
              options.linger = linger.remaining();
              CancellationToken::new()
            }
          };
          let session = Session::new(
            self.link.clone(),
            options,
            uri.clone(),
            self.pipe.take(),
            cancel,
            Some(self.status.clone()),
          )
          .resuming(resumed);
          let (end, pipe) = match lingering {
            Some(Linger::Until(deadline)) => match tokio::time::timeout_at(deadline, session.run(stream)).await {
              Ok(result) => result,
              Err(_) => {
                tracing::debug!(socket_id, endpoint = %uri, "Linger expired during session");
                break;
              }
            },
            _ => session.run(stream).await,
          };
          self.pipe = pipe;
          match end {
            SessionEnd::Stopped => break,
            SessionEnd::Disconnected(error) => {
              if let Some(e) = &error {
                self.status.record_error(e);
              }
              tracing::debug!(socket_id, endpoint = %uri, error = ?error, "Disconnected");
              self.status.set_state(ConnectionState::Disconnected);
              self.link.monitor.emit(SocketEvent::Disconnected { endpoint: uri.clone() });
              backoff.reset();
              resumed = true;
            }
            SessionEnd::HandshakeFailed(e) => {
              self.status.record_error(&e);
            }
          }
        }
        Err(e) => {
          tracing::debug!(socket_id, endpoint = %uri, error = %e, "Connect attempt failed");
          self.status.record_error(&e);
          self.link.monitor.emit(SocketEvent::ConnectDelayed {
            endpoint: uri.clone(),
            error_msg: e.to_string(),
          });
        }
      }

      if lingering.is_none() && self.cancel.is_cancelled() {
        continue;
      }
      if self.options.read().reconnect_ivl.is_none() {
        tracing::debug!(socket_id, endpoint = %uri, "Reconnection disabled");
        self.link.monitor.emit(SocketEvent::ConnectFailed {
          endpoint: uri.clone(),
          error_msg: "reconnection disabled".into(),
        });
        break;
      }
      let delay = backoff.next_delay();
      self.status.set_state(ConnectionState::Reconnecting { backoff: delay });
      self.link.monitor.emit(SocketEvent::ConnectRetried {
        endpoint: uri.clone(),
        interval: delay,
      });
      tokio::select! {
        biased;
        _ = self.stopped(lingering) => {
          if lingering.is_some() {
            break;
          }
        }
        _ = tokio::time::sleep(delay) => {}
      }
    }

    self.status.set_state(ConnectionState::Closed);
    if let Some((pipe, _)) = self.pipe.take() {
      pipe.close();
    }
    tracing::debug!(socket_id, endpoint = %uri, "Connecter stopped");
  }

  /// Resolves when the connecter should give up: on cancellation, or once
  /// lingering, when the linger runs out.
  async fn stopped(&self, lingering: Option<Linger>) {
    match lingering {
      None => self.cancel.cancelled().await,
      Some(Linger::Until(deadline)) => tokio::time::sleep_until(deadline).await,
      Some(Linger::Forever) => std::future::pending().await,
    }
  }

  /// Whether to keep redialing after the socket closed: only while it left
  /// messages in the pipe and LINGER is not zero.
  fn linger_after_close(&self) -> Option<Linger> {
    let (pipe, _) = self.pipe.as_ref()?;
    if !pipe.is_write_closed() || !pipe.has_pending() {
      return None;
    }
    match self.options.read().linger {
      Some(limit) if limit.is_zero() => None,
      Some(limit) => Some(Linger::Until(Instant::now() + limit)),
      None => Some(Linger::Forever),
    }
  }

  /// The socket closed its end of the queue; nothing is left to deliver.
  fn pipe_abandoned(&self) -> bool {
    self.pipe.as_ref().is_some_and(|(pipe, _)| pipe.is_exhausted())
  }

  async fn dial(&self, uri: &str) -> Result<(super::BoxedStream, String), ZmqError> {
    self.status.set_state(ConnectionState::Resolving);
    let target = super::resolve(&self.endpoint).await?;
    self.status.set_state(ConnectionState::Connecting);
    self.status.record_attempt();
    let options = self.options.read().clone();
    match options.connect_timeout {
      Some(limit) => tokio::time::timeout(limit, super::connect(&target, uri, &options))
        .await
        .map_err(|_| ZmqError::Timeout)?,
      None => super::connect(&target, uri, &options).await,
    }
  }
}
