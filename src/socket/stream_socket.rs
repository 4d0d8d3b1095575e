// src/socket/stream_socket.rs

use crate::error::ZmqError;
use crate::message::{Blob, Msg};
use crate::runtime::pipe::{Parts, Pipe, PipeWrite};
use crate::socket::options::{OptionValue, STREAM_NOTIFY};
use crate::socket::patterns::{FairQueue, PipeSet, RouterMap};
use crate::socket::ISocket;
use std::collections::VecDeque;

/// Raw TCP peers addressed by generated identities. Every message is
/// `[identity, data]`; empty data signals connect/disconnect inbound and
/// requests a close outbound.
#[derive(Debug)]
pub(crate) struct StreamSocket {
  router_map: RouterMap,
  fair_queue: FairQueue,
  notifications: VecDeque<Parts>,
  notify: bool,
}

impl StreamSocket {
  pub(crate) fn new() -> Self {
    Self {
      router_map: RouterMap::new(),
      fair_queue: FairQueue::new(),
      notifications: VecDeque::new(),
      notify: true,
    }
  }

  fn push_notification(&mut self, identity: Blob) {
    if self.notify {
      self
        .notifications
        .push_back(vec![Msg::from_bytes(identity.to_bytes()), Msg::new()]);
    }
  }
}

impl ISocket for StreamSocket {
  fn attach(&mut self, _pipes: &PipeSet, pipe: &Pipe) -> Result<(), ZmqError> {
    let (identity, _) = self.router_map.add_peer(pipe.id(), None, false);
    tracing::debug!(pipe_id = pipe.id(), ?identity, "STREAM peer connected");
    self.fair_queue.add_pipe(pipe.id());
    self.push_notification(identity);
    Ok(())
  }

  fn detach(&mut self, pipe_id: usize) {
    self.fair_queue.remove_pipe(pipe_id);
    if let Some(identity) = self.router_map.remove_pipe(pipe_id) {
      tracing::debug!(pipe_id, ?identity, "STREAM peer disconnected");
      self.push_notification(identity);
    }
  }

  fn send(&mut self, pipes: &PipeSet, parts: &[Msg]) -> Result<(), ZmqError> {
    let [identity, data] = parts else {
      return Err(ZmqError::InvalidMessage("STREAM messages are [identity, data]".into()));
    };
    let pipe = self
      .router_map
      .pipe_for(identity.data())
      .and_then(|id| pipes.get(id))
      .ok_or_else(|| ZmqError::HostUnreachable(format!("{:?}", Blob::from(identity.data()))))?;
    match pipe.try_write(vec![data.clone()]) {
      PipeWrite::Written => Ok(()),
      PipeWrite::Full(_) => Err(ZmqError::WouldBlock),
      PipeWrite::Closed(_) => Err(ZmqError::HostUnreachable(format!("{:?}", Blob::from(identity.data())))),
    }
  }

  fn recv(&mut self, pipes: &PipeSet) -> Result<Parts, ZmqError> {
    if let Some(note) = self.notifications.pop_front() {
      return Ok(note);
    }
    while let Some((pipe_id, parts)) = self.fair_queue.recv(pipes) {
      let Some(identity) = self.router_map.identity_of(pipe_id) else { continue };
      let mut out = Vec::with_capacity(parts.len() + 1);
      out.push(Msg::from_bytes(identity.to_bytes()));
      out.extend(parts);
      return Ok(out);
    }
    Err(ZmqError::WouldBlock)
  }

  fn has_in(&self, pipes: &PipeSet) -> bool {
    !self.notifications.is_empty() || self.fair_queue.has_in(pipes)
  }

  fn has_out(&self, _pipes: &PipeSet) -> bool {
    true
  }

  fn set_option(&mut self, _pipes: &PipeSet, option: i32, value: &OptionValue) -> Result<(), ZmqError> {
    match option {
      STREAM_NOTIFY => self.notify = value.as_bool(),
      _ => return Err(ZmqError::UnsupportedOption(option)),
    }
    Ok(())
  }
}
