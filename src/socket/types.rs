// src/socket/types.rs

use crate::error::ZmqError;
use crate::message::Msg;
use crate::poller::PollEvents;
use crate::socket::core::{SocketCore, Wait};
use crate::socket::events::{MonitorReceiver, DEFAULT_MONITOR_CAPACITY};
use crate::socket::options::{self, option_id};
use crate::transport::connecter::ConnectionStatus;
use static_assertions::assert_impl_all;
use std::fmt;
use std::sync::Arc;

/// The messaging pattern of a socket.
///
/// Discriminants are the socket-type bytes carried in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
  /// Exclusive one-to-one link.
  Pair,
  /// Publish messages to subscribers (Pub-Sub pattern).
  Pub,
  /// Subscribe to messages from publishers (Pub-Sub pattern).
  Sub,
  /// Send requests and receive replies (Req-Rep pattern).
  Req,
  /// Receive requests and send replies (Req-Rep pattern).
  Rep,
  /// Asynchronous request-reply, load-balancing outgoing (Dealer-Router pattern).
  Dealer,
  /// Asynchronous request-reply, routing by identity (Dealer-Router pattern).
  Router,
  /// Collect messages from a pool of distributors (Push-Pull pattern).
  Pull,
  /// Distribute messages to a pool of workers (Push-Pull pattern).
  Push,
  /// PUB that surfaces subscriptions to the user.
  XPub,
  /// SUB that sends subscriptions as messages.
  XSub,
  /// Raw byte streams to non-ZMTP peers.
  Stream,
}

impl SocketType {
  pub fn as_byte(self) -> u8 {
    match self {
      SocketType::Pair => 0,
      SocketType::Pub => 1,
      SocketType::Sub => 2,
      SocketType::Req => 3,
      SocketType::Rep => 4,
      SocketType::Dealer => 5,
      SocketType::Router => 6,
      SocketType::Pull => 7,
      SocketType::Push => 8,
      SocketType::XPub => 9,
      SocketType::XSub => 10,
      SocketType::Stream => 11,
    }
  }

  pub fn from_byte(byte: u8) -> Option<Self> {
    Some(match byte {
      0 => SocketType::Pair,
      1 => SocketType::Pub,
      2 => SocketType::Sub,
      3 => SocketType::Req,
      4 => SocketType::Rep,
      5 => SocketType::Dealer,
      6 => SocketType::Router,
      7 => SocketType::Pull,
      8 => SocketType::Push,
      9 => SocketType::XPub,
      10 => SocketType::XSub,
      11 => SocketType::Stream,
      _ => return None,
    })
  }

  /// Whether a socket of this type may talk to a peer of type `peer`.
  pub fn is_compatible(self, peer: SocketType) -> bool {
    use SocketType::*;
    match self {
      Pair => peer == Pair,
      Pub | XPub => matches!(peer, Sub | XSub),
      Sub | XSub => matches!(peer, Pub | XPub),
      Req => matches!(peer, Rep | Router),
      Rep => matches!(peer, Req | Dealer),
      Dealer => matches!(peer, Rep | Dealer | Router),
      Router => matches!(peer, Req | Dealer | Router),
      Pull => peer == Push,
      Push => peer == Pull,
      Stream => false,
    }
  }

  /// Sockets that key their pipes by the peer's identity.
  pub(crate) fn routes_by_identity(self) -> bool {
    matches!(self, SocketType::Router | SocketType::Stream)
  }
}

/// The public handle for interacting with a socket.
///
/// Handles are cheap to clone and share one underlying socket. Dropping the
/// last clone closes the socket.
#[derive(Clone)]
pub struct Socket {
  core: Arc<SocketCore>,
}

assert_impl_all!(Socket: Send, Sync);

impl Socket {
  pub(crate) fn new(core: Arc<SocketCore>) -> Self {
    Self { core }
  }

  pub(crate) fn core(&self) -> &SocketCore {
    &self.core
  }

  pub fn socket_type(&self) -> SocketType {
    self.core.socket_type
  }

  // --- Endpoints ---

  /// Binds the socket to listen on a local endpoint.
  ///
  /// `tcp://host:*` binds an OS-assigned port; read it back with
  /// [`options::LAST_ENDPOINT`].
  pub async fn bind(&self, endpoint: &str) -> Result<(), ZmqError> {
    self.core.bind(endpoint).await
  }

  /// Connects the socket to a remote endpoint. Network connections are
  /// established (and re-established) in the background.
  pub async fn connect(&self, endpoint: &str) -> Result<(), ZmqError> {
    self.core.connect(endpoint).await
  }

  /// Disconnects from a specific endpoint.
  pub async fn disconnect(&self, endpoint: &str) -> Result<(), ZmqError> {
    self.core.disconnect(endpoint).await
  }

  /// Stops listening on a specific endpoint.
  pub async fn unbind(&self, endpoint: &str) -> Result<(), ZmqError> {
    self.core.unbind(endpoint).await
  }

  // --- Messages ---

  /// Sends one frame. A frame with the MORE flag is staged until the final
  /// frame of its message is sent. Waits per SNDTIMEO.
  pub async fn send(&self, msg: Msg) -> Result<(), ZmqError> {
    self.core.send(msg, None).await
  }

  /// Sends one frame without waiting. Returns false when the message cannot
  /// be routed right now.
  pub fn try_send(&self, msg: Msg) -> Result<bool, ZmqError> {
    match self.core.try_send(msg) {
      Ok(()) => Ok(true),
      Err(ZmqError::WouldBlock) => Ok(false),
      Err(e) => Err(e),
    }
  }

  /// Sends a single-frame UTF-8 message.
  pub async fn send_string(&self, text: &str) -> Result<(), ZmqError> {
    self.core.send(Msg::from(text), None).await
  }

  /// Sends a multipart message, setting MORE on every frame but the last.
  pub async fn send_multipart<I>(&self, frames: I) -> Result<(), ZmqError>
  where
    I: IntoIterator<Item = Msg>,
  {
    let mut frames = frames.into_iter().peekable();
    if frames.peek().is_none() {
      return Err(ZmqError::InvalidMessage("multipart message has no frames".into()));
    }
    while let Some(frame) = frames.next() {
      let more = frames.peek().is_some();
      self.core.send(frame.with_more(more), None).await?;
    }
    Ok(())
  }

  /// Receives one frame. Check [`Msg::is_more`] (or RCVMORE) for the rest of
  /// the message. Waits per RCVTIMEO.
  pub async fn recv(&self) -> Result<Msg, ZmqError> {
    self.core.recv(None).await
  }

  /// Receives one frame if one is ready.
  pub fn try_recv(&self) -> Result<Option<Msg>, ZmqError> {
    match self.core.try_recv() {
      Ok(msg) => Ok(Some(msg)),
      Err(ZmqError::WouldBlock) => Ok(None),
      Err(e) => Err(e),
    }
  }

  /// Receives one frame and decodes it as UTF-8.
  pub async fn recv_string(&self) -> Result<String, ZmqError> {
    let msg = self.core.recv(None).await?;
    String::from_utf8(msg.data().to_vec()).map_err(|_| ZmqError::InvalidMessage("frame is not valid UTF-8".into()))
  }

  /// Receives every frame of the next message.
  pub async fn recv_multipart(&self) -> Result<Vec<Msg>, ZmqError> {
    let first = self.core.recv(None).await?;
    let mut more = first.is_more();
    let mut frames = vec![first];
    while more {
      let frame = self.core.recv(Some(Wait::NoWait)).await?;
      more = frame.is_more();
      frames.push(frame);
    }
    Ok(frames)
  }

  // --- Options ---

  /// Sets an option from its raw byte encoding (native-endian `i32` for
  /// integers, raw bytes for binary options).
  pub async fn set_option(&self, option: i32, value: &[u8]) -> Result<(), ZmqError> {
    self.core.set_option(option, value)
  }

  /// Reads an option in its raw byte encoding.
  pub async fn get_option(&self, option: i32) -> Result<Vec<u8>, ZmqError> {
    self.core.get_option(option)
  }

  /// [`Socket::set_option`] addressed by name, e.g. `"SNDHWM"`.
  pub async fn set_option_by_name(&self, name: &str, value: &[u8]) -> Result<(), ZmqError> {
    let id = option_id(name).ok_or_else(|| ZmqError::UnknownOption(name.to_string()))?;
    self.core.set_option(id, value)
  }

  /// [`Socket::get_option`] addressed by name.
  pub async fn get_option_by_name(&self, name: &str) -> Result<Vec<u8>, ZmqError> {
    let id = option_id(name).ok_or_else(|| ZmqError::UnknownOption(name.to_string()))?;
    self.core.get_option(id)
  }

  pub async fn subscribe(&self, topic: &[u8]) -> Result<(), ZmqError> {
    self.core.set_option(options::SUBSCRIBE, topic)
  }

  pub async fn unsubscribe(&self, topic: &[u8]) -> Result<(), ZmqError> {
    self.core.set_option(options::UNSUBSCRIBE, topic)
  }

  // --- Introspection ---

  /// Current readiness, as reported by EVENTS.
  pub fn events(&self) -> Result<PollEvents, ZmqError> {
    self.core.events()
  }

  /// Attaches a monitor, replacing (and closing) any previous one.
  pub async fn monitor(&self, capacity: usize) -> Result<MonitorReceiver, ZmqError> {
    self.core.monitor(capacity)
  }

  pub async fn monitor_default(&self) -> Result<MonitorReceiver, ZmqError> {
    self.core.monitor(DEFAULT_MONITOR_CAPACITY)
  }

  /// Snapshot of a connected endpoint's connection state machine.
  pub fn connection_status(&self, endpoint: &str) -> Option<ConnectionStatus> {
    self.core.connection_status(endpoint)
  }

  // --- Lifecycle ---

  /// Closes the socket for every clone of this handle. Queued outbound
  /// messages are flushed in the background for up to LINGER.
  pub async fn close(&self) -> Result<(), ZmqError> {
    self.core.close();
    Ok(())
  }
}

impl fmt::Debug for Socket {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Socket")
      .field("handle", &self.core.handle)
      .field("socket_type", &self.core.socket_type)
      .finish()
  }
}
