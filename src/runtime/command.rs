// src/runtime/command.rs

use crate::error::ZmqError;
use crate::runtime::event_bus::SystemEvent;
use crate::runtime::mailbox::MailboxSender;
use crate::runtime::pipe::Pipe;
use crate::runtime::signal::Signal;
use crate::socket::core::SocketCore;
use crate::socket::events::Monitor;
use crate::socket::options::{OptionValue, SocketOptions};
use crate::socket::SocketType;
use crate::transport::connecter::SharedStatus;
use crate::transport::endpoint::Endpoint;
use std::sync::Weak;
use tokio::sync::{broadcast, oneshot};

/// What an I/O thread needs to know about the socket that issued a command.
#[derive(Debug, Clone)]
pub(crate) struct SocketLink {
  pub socket_id: usize,
  pub socket_type: SocketType,
  /// The socket's own mailbox, for `AttachPipe`/`DetachPipe`.
  pub mailbox: MailboxSender,
  /// Raised whenever the socket's pipes make progress.
  pub signal: Signal,
  pub monitor: Monitor,
  /// Reaches the socket directly for events it must handle even while idle.
  pub core: Weak<SocketCore>,
}

/// Control messages carried by mailboxes.
///
/// Sockets send the first group to their I/O thread; sessions and inproc
/// peers send `AttachPipe`/`DetachPipe` back to sockets.
#[derive(Debug)]
pub(crate) enum Command {
  Bind {
    link: SocketLink,
    endpoint: Endpoint,
    options: SocketOptions,
    stop_rx: broadcast::Receiver<SystemEvent>,
    /// Receives the resolved endpoint URI (used for LAST_ENDPOINT).
    reply_tx: oneshot::Sender<Result<String, ZmqError>>,
  },
  Connect {
    link: SocketLink,
    endpoint: Endpoint,
    options: SocketOptions,
    stop_rx: broadcast::Receiver<SystemEvent>,
    /// Session end of a pipe created at connect time, with the signal its
    /// socket end raises. `None` when the pipe is created per connection.
    pipe: Option<(Pipe, Signal)>,
    status: SharedStatus,
  },
  Unbind {
    socket_id: usize,
    endpoint: String,
  },
  Disconnect {
    socket_id: usize,
    endpoint: String,
  },
  SetOption {
    socket_id: usize,
    option: i32,
    value: OptionValue,
  },
  CloseSocket {
    socket_id: usize,
  },
  Terminate,

  AttachPipe {
    pipe: Pipe,
  },
  DetachPipe {
    pipe_id: usize,
  },
}

impl Command {
  pub(crate) fn variant_name(&self) -> &'static str {
    match self {
      Command::Bind { .. } => "Bind",
      Command::Connect { .. } => "Connect",
      Command::Unbind { .. } => "Unbind",
      Command::Disconnect { .. } => "Disconnect",
      Command::SetOption { .. } => "SetOption",
      Command::CloseSocket { .. } => "CloseSocket",
      Command::Terminate => "Terminate",
      Command::AttachPipe { .. } => "AttachPipe",
      Command::DetachPipe { .. } => "DetachPipe",
    }
  }
}
