// src/socket/router_socket.rs

use crate::error::ZmqError;
use crate::message::{Blob, Msg};
use crate::runtime::pipe::{Parts, Pipe, PipeWrite};
use crate::socket::options::{OptionValue, ROUTER_HANDOVER, ROUTER_MANDATORY};
use crate::socket::patterns::{FairQueue, PipeSet, RouterMap};
use crate::socket::ISocket;

/// Identity-addressed routing.
///
/// Inbound messages are prefixed with the identity of the pipe they came from;
/// outbound messages name their destination in the first frame.
#[derive(Debug)]
pub(crate) struct RouterSocket {
  router_map: RouterMap,
  fair_queue: FairQueue,
  mandatory: bool,
  handover: bool,
}

impl RouterSocket {
  pub(crate) fn new() -> Self {
    Self {
      router_map: RouterMap::new(),
      fair_queue: FairQueue::new(),
      mandatory: false,
      handover: false,
    }
  }
}

fn unreachable_identity(identity: &[u8]) -> ZmqError {
  ZmqError::HostUnreachable(format!("{:?}", Blob::from(identity)))
}

impl ISocket for RouterSocket {
  fn attach(&mut self, pipes: &PipeSet, pipe: &Pipe) -> Result<(), ZmqError> {
    let (identity, displaced) = self.router_map.add_peer(pipe.id(), pipe.peer_identity(), self.handover);
    if let Some(old) = displaced {
      self.fair_queue.remove_pipe(old);
      if let Some(old_pipe) = pipes.get(old) {
        old_pipe.close();
      }
    }
    tracing::debug!(pipe_id = pipe.id(), ?identity, "ROUTER attached peer");
    self.fair_queue.add_pipe(pipe.id());
    Ok(())
  }

  fn detach(&mut self, pipe_id: usize) {
    self.fair_queue.remove_pipe(pipe_id);
    if let Some(identity) = self.router_map.remove_pipe(pipe_id) {
      tracing::debug!(pipe_id, ?identity, "ROUTER detached peer");
    }
  }

  fn send(&mut self, pipes: &PipeSet, parts: &[Msg]) -> Result<(), ZmqError> {
    let (identity, body) = match parts.split_first() {
      Some((id, body)) if !body.is_empty() => (id, body),
      _ => {
        return Err(ZmqError::InvalidMessage(
          "ROUTER messages need an identity frame followed by a body".into(),
        ))
      }
    };
    let Some(pipe) = self.router_map.pipe_for(identity.data()).and_then(|id| pipes.get(id)) else {
      if self.mandatory {
        return Err(unreachable_identity(identity.data()));
      }
      tracing::trace!(identity = ?Blob::from(identity.data()), "ROUTER dropped message for unknown identity");
      return Ok(());
    };
    match pipe.try_write(body.to_vec()) {
      PipeWrite::Written => Ok(()),
      PipeWrite::Full(_) if self.mandatory => Err(ZmqError::WouldBlock),
      PipeWrite::Closed(_) if self.mandatory => Err(unreachable_identity(identity.data())),
      PipeWrite::Full(_) | PipeWrite::Closed(_) => {
        tracing::trace!(pipe_id = pipe.id(), "ROUTER dropped message for unavailable peer");
        Ok(())
      }
    }
  }

  fn recv(&mut self, pipes: &PipeSet) -> Result<Parts, ZmqError> {
    while let Some((pipe_id, parts)) = self.fair_queue.recv(pipes) {
      let Some(identity) = self.router_map.identity_of(pipe_id) else {
        tracing::warn!(pipe_id, "ROUTER got message from pipe without identity, dropping");
        continue;
      };
      let mut out = Vec::with_capacity(parts.len() + 1);
      out.push(Msg::from_bytes(identity.to_bytes()));
      out.extend(parts);
      return Ok(out);
    }
    Err(ZmqError::WouldBlock)
  }

  fn has_in(&self, pipes: &PipeSet) -> bool {
    self.fair_queue.has_in(pipes)
  }

  fn has_out(&self, pipes: &PipeSet) -> bool {
    !self.mandatory || pipes.iter().any(Pipe::can_write)
  }

  fn set_option(&mut self, _pipes: &PipeSet, option: i32, value: &OptionValue) -> Result<(), ZmqError> {
    match option {
      ROUTER_MANDATORY => self.mandatory = value.as_bool(),
      ROUTER_HANDOVER => self.handover = value.as_bool(),
      _ => return Err(ZmqError::UnsupportedOption(option)),
    }
    Ok(())
  }
}
