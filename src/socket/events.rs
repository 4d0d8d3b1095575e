// src/socket/events.rs

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Significant events occurring within a socket or its connections.
/// Inspired by libzmq socket monitor events.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SocketEvent {
  // --- Listener Events ---
  /// Socket has started listening successfully on the endpoint.
  Listening { endpoint: String },
  /// Socket failed to bind to the endpoint.
  BindFailed { endpoint: String, error_msg: String },
  /// Accepted a new connection. `peer_addr` is the address of the remote peer.
  Accepted { endpoint: String, peer_addr: String },
  /// Failed to accept a new connection.
  AcceptFailed { endpoint: String, error_msg: String },

  // --- Connecter Events ---
  /// Transport-level connection established. The handshake follows.
  Connected { endpoint: String, peer_addr: String },
  /// A connection attempt failed and a retry is scheduled.
  ConnectDelayed { endpoint: String, error_msg: String },
  /// Retrying the connection after `interval`.
  ConnectRetried { endpoint: String, interval: Duration },
  /// Connecting was abandoned (reconnection disabled or the peer is incompatible).
  ConnectFailed { endpoint: String, error_msg: String },

  // --- General Connection/Session Events ---
  /// A listener stopped.
  Closed { endpoint: String },
  /// An established connection went away.
  Disconnected { endpoint: String },

  // --- Handshake ---
  HandshakeFailed { endpoint: String, error_msg: String },
  HandshakeSucceeded { endpoint: String },
}

/// Channel sender used for monitor events.
pub type MonitorSender = async_channel::Sender<SocketEvent>;
/// Channel receiver used for monitor events.
pub type MonitorReceiver = async_channel::Receiver<SocketEvent>;

/// Default capacity for the monitor channel.
pub const DEFAULT_MONITOR_CAPACITY: usize = 100;

/// Shared slot through which a socket and its I/O-side tasks publish events.
///
/// Events are dropped when no monitor is attached or its channel is full.
#[derive(Debug, Clone, Default)]
pub(crate) struct Monitor {
  tx: Arc<RwLock<Option<MonitorSender>>>,
}

impl Monitor {
  pub(crate) fn attach(&self, capacity: usize) -> MonitorReceiver {
    let (tx, rx) = async_channel::bounded(capacity.max(1));
    if let Some(old) = self.tx.write().replace(tx) {
      old.close();
    }
    rx
  }

  pub(crate) fn emit(&self, event: SocketEvent) {
    if let Some(tx) = self.tx.read().as_ref() {
      if let Err(e) = tx.try_send(event) {
        tracing::trace!(error = %e, "Monitor event dropped");
      }
    }
  }

  pub(crate) fn detach(&self) {
    if let Some(old) = self.tx.write().take() {
      old.close();
    }
  }
}
