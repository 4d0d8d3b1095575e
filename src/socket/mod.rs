// src/socket/mod.rs

pub(crate) mod core;
pub mod events;
pub mod options;
pub(crate) mod patterns;
pub mod types;

mod dealer_socket;
mod pair_socket;
mod pub_socket;
mod pull_socket;
mod push_socket;
mod rep_socket;
mod req_socket;
mod router_socket;
mod stream_socket;
mod sub_socket;
mod xpub_socket;
mod xsub_socket;

pub use events::{MonitorReceiver, SocketEvent, DEFAULT_MONITOR_CAPACITY};
pub use types::{Socket, SocketType};

use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::pipe::{Parts, Pipe};
use options::OptionValue;
use patterns::PipeSet;
use std::fmt;

/// Routing behaviour of one socket kind.
///
/// Every method runs under the owning socket's state lock and must not block.
/// `send`/`recv` return `WouldBlock` when no progress is possible right now;
/// the caller decides whether to wait.
pub(crate) trait ISocket: Send + fmt::Debug {
  /// Upper bound on attached pipes, if the kind has one.
  fn max_peers(&self) -> Option<usize> {
    None
  }

  /// Takes a newly attached pipe into the routing structures. `pipes` holds
  /// the pipes attached so far. An error refuses the pipe.
  fn attach(&mut self, pipes: &PipeSet, pipe: &Pipe) -> Result<(), ZmqError>;

  /// Forgets a pipe that has gone away.
  fn detach(&mut self, pipe_id: usize);

  /// An attached pipe reached a new peer after a reconnect; per-peer state
  /// such as subscriptions must be sent again.
  fn resumed(&mut self, _pipe: &Pipe) {}

  /// Routes one complete message.
  fn send(&mut self, pipes: &PipeSet, parts: &[Msg]) -> Result<(), ZmqError>;

  /// Produces the next complete message for the user.
  fn recv(&mut self, pipes: &PipeSet) -> Result<Parts, ZmqError>;

  fn has_in(&self, pipes: &PipeSet) -> bool;

  fn has_out(&self, pipes: &PipeSet) -> bool;

  fn set_option(&mut self, _pipes: &PipeSet, option: i32, _value: &OptionValue) -> Result<(), ZmqError> {
    Err(ZmqError::UnsupportedOption(option))
  }

  fn get_option(&self, option: i32) -> Result<OptionValue, ZmqError> {
    Err(ZmqError::UnsupportedOption(option))
  }
}

pub(crate) fn create_pattern(socket_type: SocketType) -> Box<dyn ISocket> {
  match socket_type {
    SocketType::Pair => Box::new(pair_socket::PairSocket::new()),
    SocketType::Pub => Box::new(pub_socket::PubSocket::new()),
    SocketType::Sub => Box::new(sub_socket::SubSocket::new()),
    SocketType::Req => Box::new(req_socket::ReqSocket::new()),
    SocketType::Rep => Box::new(rep_socket::RepSocket::new()),
    SocketType::Dealer => Box::new(dealer_socket::DealerSocket::new()),
    SocketType::Router => Box::new(router_socket::RouterSocket::new()),
    SocketType::Pull => Box::new(pull_socket::PullSocket::new()),
    SocketType::Push => Box::new(push_socket::PushSocket::new()),
    SocketType::XPub => Box::new(xpub_socket::XPubSocket::new()),
    SocketType::XSub => Box::new(xsub_socket::XSubSocket::new()),
    SocketType::Stream => Box::new(stream_socket::StreamSocket::new()),
  }
}

/// First frame of a message, used for topic matching.
pub(crate) fn first_frame(parts: &[Msg]) -> &[u8] {
  parts.first().map(Msg::data).unwrap_or(&[])
}

/// Builds a `0x01 topic` / `0x00 topic` subscription message.
pub(crate) fn subscription_message(subscribe: bool, topic: &[u8]) -> Parts {
  let mut data = Vec::with_capacity(topic.len() + 1);
  data.push(subscribe as u8);
  data.extend_from_slice(topic);
  vec![Msg::from_vec(data)]
}

/// Splits a `0x01 topic` / `0x00 topic` message into `(subscribe, topic)`.
pub(crate) fn parse_subscription(parts: &[Msg]) -> Option<(bool, &[u8])> {
  if parts.len() != 1 {
    return None;
  }
  match parts[0].data().split_first() {
    Some((1, topic)) => Some((true, topic)),
    Some((0, topic)) => Some((false, topic)),
    _ => None,
  }
}
