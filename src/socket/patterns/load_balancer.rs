// src/socket/patterns/load_balancer.rs

use super::PipeSet;
use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::pipe::PipeWrite;
use std::collections::VecDeque;

/// Round-robin distribution of outgoing messages over pipes with room.
#[derive(Debug, Default)]
pub(crate) struct LoadBalancer {
  order: VecDeque<usize>,
}

impl LoadBalancer {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn add_pipe(&mut self, pipe_id: usize) {
    if !self.order.contains(&pipe_id) {
      self.order.push_back(pipe_id);
    }
  }

  pub(crate) fn remove_pipe(&mut self, pipe_id: usize) {
    self.order.retain(|&id| id != pipe_id);
  }

  /// Writes `parts` to the next pipe in turn that accepts it, skipping full
  /// ones. Returns the pipe used, or `WouldBlock` if every pipe is full.
  pub(crate) fn send(&mut self, pipes: &PipeSet, parts: &[Msg]) -> Result<usize, ZmqError> {
    for _ in 0..self.order.len() {
      let Some(pipe_id) = self.order.pop_front() else { break };
      self.order.push_back(pipe_id);
      let Some(pipe) = pipes.get(pipe_id) else { continue };
      if !pipe.can_write() {
        continue;
      }
      match pipe.try_write(parts.to_vec()) {
        PipeWrite::Written => {
          tracing::trace!(pipe_id, "LoadBalancer wrote message");
          return Ok(pipe_id);
        }
        PipeWrite::Full(_) | PipeWrite::Closed(_) => continue,
      }
    }
    Err(ZmqError::WouldBlock)
  }

  pub(crate) fn has_out(&self, pipes: &PipeSet) -> bool {
    self.order.iter().any(|&id| pipes.get(id).is_some_and(|p| p.can_write()))
  }
}
