// src/socket/pull_socket.rs

use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::pipe::{Parts, Pipe};
use crate::socket::patterns::{FairQueue, PipeSet};
use crate::socket::ISocket;

#[derive(Debug)]
pub(crate) struct PullSocket {
  fair_queue: FairQueue,
}

impl PullSocket {
  pub(crate) fn new() -> Self {
    Self {
      fair_queue: FairQueue::new(),
    }
  }
}

impl ISocket for PullSocket {
  fn attach(&mut self, _pipes: &PipeSet, pipe: &Pipe) -> Result<(), ZmqError> {
    self.fair_queue.add_pipe(pipe.id());
    Ok(())
  }

  fn detach(&mut self, pipe_id: usize) {
    self.fair_queue.remove_pipe(pipe_id);
  }

  fn send(&mut self, _pipes: &PipeSet, _parts: &[Msg]) -> Result<(), ZmqError> {
    Err(ZmqError::InvalidSocketType("PULL sockets cannot send"))
  }

  fn recv(&mut self, pipes: &PipeSet) -> Result<Parts, ZmqError> {
    self
      .fair_queue
      .recv(pipes)
      .map(|(_, parts)| parts)
      .ok_or(ZmqError::WouldBlock)
  }

  fn has_in(&self, pipes: &PipeSet) -> bool {
    self.fair_queue.has_in(pipes)
  }

  fn has_out(&self, _pipes: &PipeSet) -> bool {
    false
  }
}
