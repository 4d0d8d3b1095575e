// src/socket/rep_socket.rs

use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::pipe::{Parts, Pipe, PipeWrite};
use crate::socket::patterns::{FairQueue, PipeSet};
use crate::socket::ISocket;

/// The request currently being served: which pipe it came from and the
/// envelope (every frame up to and including the empty delimiter).
#[derive(Debug)]
struct PendingReply {
  pipe_id: usize,
  envelope: Parts,
}

#[derive(Debug)]
pub(crate) struct RepSocket {
  fair_queue: FairQueue,
  pending: Option<PendingReply>,
}

impl RepSocket {
  pub(crate) fn new() -> Self {
    Self {
      fair_queue: FairQueue::new(),
      pending: None,
    }
  }
}

impl ISocket for RepSocket {
  fn attach(&mut self, _pipes: &PipeSet, pipe: &Pipe) -> Result<(), ZmqError> {
    self.fair_queue.add_pipe(pipe.id());
    Ok(())
  }

  fn detach(&mut self, pipe_id: usize) {
    self.fair_queue.remove_pipe(pipe_id);
  }

  fn send(&mut self, pipes: &PipeSet, parts: &[Msg]) -> Result<(), ZmqError> {
    let Some(pending) = self.pending.take() else {
      return Err(ZmqError::InvalidState("REP socket must receive a request before replying"));
    };
    let Some(pipe) = pipes.get(pending.pipe_id) else {
      tracing::debug!(pipe_id = pending.pipe_id, "REP requester went away, reply dropped");
      return Ok(());
    };
    let mut reply = pending.envelope.clone();
    reply.extend_from_slice(parts);
    match pipe.try_write(reply) {
      PipeWrite::Written => Ok(()),
      PipeWrite::Full(_) => {
        self.pending = Some(pending);
        Err(ZmqError::WouldBlock)
      }
      PipeWrite::Closed(_) => {
        tracing::debug!(pipe_id = pending.pipe_id, "REP requester closed, reply dropped");
        Ok(())
      }
    }
  }

  fn recv(&mut self, pipes: &PipeSet) -> Result<Parts, ZmqError> {
    if self.pending.is_some() {
      return Err(ZmqError::InvalidState("REP socket must reply before receiving again"));
    }
    while let Some((pipe_id, mut parts)) = self.fair_queue.recv(pipes) {
      let Some(delimiter) = parts.iter().position(Msg::is_empty) else {
        tracing::debug!(pipe_id, "REP dropped request without envelope delimiter");
        continue;
      };
      let body = parts.split_off(delimiter + 1);
      if body.is_empty() {
        tracing::debug!(pipe_id, "REP dropped request without body");
        continue;
      }
      self.pending = Some(PendingReply { pipe_id, envelope: parts });
      return Ok(body);
    }
    Err(ZmqError::WouldBlock)
  }

  fn has_in(&self, pipes: &PipeSet) -> bool {
    self.pending.is_none() && self.fair_queue.has_in(pipes)
  }

  fn has_out(&self, pipes: &PipeSet) -> bool {
    self
      .pending
      .as_ref()
      .is_some_and(|p| pipes.get(p.pipe_id).map_or(true, Pipe::can_write))
  }
}
