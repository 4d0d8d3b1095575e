// src/socket/dealer_socket.rs

use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::pipe::{Parts, Pipe};
use crate::socket::patterns::{FairQueue, LoadBalancer, PipeSet};
use crate::socket::ISocket;

/// Load-balanced sends, fair-queued receives, no envelope handling.
#[derive(Debug)]
pub(crate) struct DealerSocket {
  load_balancer: LoadBalancer,
  fair_queue: FairQueue,
}

impl DealerSocket {
  pub(crate) fn new() -> Self {
    Self {
      load_balancer: LoadBalancer::new(),
      fair_queue: FairQueue::new(),
    }
  }
}

impl ISocket for DealerSocket {
  fn attach(&mut self, _pipes: &PipeSet, pipe: &Pipe) -> Result<(), ZmqError> {
    self.load_balancer.add_pipe(pipe.id());
    self.fair_queue.add_pipe(pipe.id());
    Ok(())
  }

  fn detach(&mut self, pipe_id: usize) {
    self.load_balancer.remove_pipe(pipe_id);
    self.fair_queue.remove_pipe(pipe_id);
  }

  fn send(&mut self, pipes: &PipeSet, parts: &[Msg]) -> Result<(), ZmqError> {
    self.load_balancer.send(pipes, parts).map(|_| ())
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

  fn has_out(&self, pipes: &PipeSet) -> bool {
    self.load_balancer.has_out(pipes)
  }
}
