// src/socket/pair_socket.rs

use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::pipe::{Parts, Pipe, PipeRead, PipeWrite};
use crate::socket::patterns::PipeSet;
use crate::socket::ISocket;

/// Exclusive connection to exactly one peer.
#[derive(Debug, Default)]
pub(crate) struct PairSocket {
  peer: Option<usize>,
}

impl PairSocket {
  pub(crate) fn new() -> Self {
    Self::default()
  }
}

impl ISocket for PairSocket {
  fn max_peers(&self) -> Option<usize> {
    Some(1)
  }

  fn attach(&mut self, _pipes: &PipeSet, pipe: &Pipe) -> Result<(), ZmqError> {
    if let Some(existing) = self.peer {
      tracing::warn!(existing, refused = pipe.id(), "PAIR socket already has a peer, refusing pipe");
      return Err(ZmqError::TooManyPeers);
    }
    self.peer = Some(pipe.id());
    Ok(())
  }

  fn detach(&mut self, pipe_id: usize) {
    if self.peer == Some(pipe_id) {
      self.peer = None;
    }
  }

  fn send(&mut self, pipes: &PipeSet, parts: &[Msg]) -> Result<(), ZmqError> {
    let pipe = self.peer.and_then(|id| pipes.get(id)).ok_or(ZmqError::WouldBlock)?;
    match pipe.try_write(parts.to_vec()) {
      PipeWrite::Written => Ok(()),
      PipeWrite::Full(_) | PipeWrite::Closed(_) => Err(ZmqError::WouldBlock),
    }
  }

  fn recv(&mut self, pipes: &PipeSet) -> Result<Parts, ZmqError> {
    match self.peer.and_then(|id| pipes.get(id)).map(Pipe::try_read) {
      Some(PipeRead::Message(parts)) => Ok(parts),
      _ => Err(ZmqError::WouldBlock),
    }
  }

  fn has_in(&self, pipes: &PipeSet) -> bool {
    self.peer.and_then(|id| pipes.get(id)).is_some_and(Pipe::has_pending)
  }

  fn has_out(&self, pipes: &PipeSet) -> bool {
    self.peer.and_then(|id| pipes.get(id)).is_some_and(Pipe::can_write)
  }
}
