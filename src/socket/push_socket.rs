// src/socket/push_socket.rs

use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::pipe::{Parts, Pipe};
use crate::socket::patterns::{LoadBalancer, PipeSet};
use crate::socket::ISocket;

#[derive(Debug)]
pub(crate) struct PushSocket {
  load_balancer: LoadBalancer,
}

impl PushSocket {
  pub(crate) fn new() -> Self {
    Self {
      load_balancer: LoadBalancer::new(),
    }
  }
}

impl ISocket for PushSocket {
  fn attach(&mut self, _pipes: &PipeSet, pipe: &Pipe) -> Result<(), ZmqError> {
    self.load_balancer.add_pipe(pipe.id());
    Ok(())
  }

  fn detach(&mut self, pipe_id: usize) {
    self.load_balancer.remove_pipe(pipe_id);
  }

  fn send(&mut self, pipes: &PipeSet, parts: &[Msg]) -> Result<(), ZmqError> {
    self.load_balancer.send(pipes, parts).map(|_| ())
  }

  fn recv(&mut self, _pipes: &PipeSet) -> Result<Parts, ZmqError> {
    Err(ZmqError::InvalidSocketType("PUSH sockets cannot receive"))
  }

  fn has_in(&self, _pipes: &PipeSet) -> bool {
    false
  }

  fn has_out(&self, pipes: &PipeSet) -> bool {
    self.load_balancer.has_out(pipes)
  }
}
