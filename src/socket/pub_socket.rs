// src/socket/pub_socket.rs

use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::pipe::{Parts, Pipe, PipeRead};
use crate::socket::patterns::{Distributor, PipeSet};
use crate::socket::ISocket;

/// Fan-out to every subscriber. Subscribers filter locally, so every message
/// goes to every pipe with room; full pipes miss the message.
#[derive(Debug)]
pub(crate) struct PubSocket {
  distributor: Distributor,
}

impl PubSocket {
  pub(crate) fn new() -> Self {
    Self {
      distributor: Distributor::new(),
    }
  }

  /// Subscription frames sent upstream by subscribers carry nothing PUB needs.
  fn drain_upstream(&self, pipes: &PipeSet) {
    for pipe in pipes.iter() {
      while let PipeRead::Message(_) = pipe.try_read() {}
    }
  }
}

impl ISocket for PubSocket {
  fn attach(&mut self, _pipes: &PipeSet, pipe: &Pipe) -> Result<(), ZmqError> {
    self.distributor.add_pipe(pipe.id());
    Ok(())
  }

  fn detach(&mut self, pipe_id: usize) {
    self.distributor.remove_pipe(pipe_id);
  }

  fn send(&mut self, pipes: &PipeSet, parts: &[Msg]) -> Result<(), ZmqError> {
    self.drain_upstream(pipes);
    let delivered = self.distributor.send(pipes, parts, |_| true, false)?;
    tracing::trace!(delivered, "PUB distributed message");
    Ok(())
  }

  fn recv(&mut self, _pipes: &PipeSet) -> Result<Parts, ZmqError> {
    Err(ZmqError::InvalidSocketType("PUB sockets cannot receive"))
  }

  fn has_in(&self, _pipes: &PipeSet) -> bool {
    false
  }

  fn has_out(&self, _pipes: &PipeSet) -> bool {
    true
  }
}
