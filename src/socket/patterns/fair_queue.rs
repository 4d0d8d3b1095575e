// src/socket/patterns/fair_queue.rs

use super::PipeSet;
use crate::runtime::pipe::{Parts, PipeRead};
use std::collections::VecDeque;

/// Round-robin reading across pipes, skipping empty ones, so that no single
/// busy peer can starve the others.
#[derive(Debug, Default)]
pub(crate) struct FairQueue {
  order: VecDeque<usize>,
}

impl FairQueue {
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

  /// Reads the next message, starting after the pipe served last time.
  pub(crate) fn recv(&mut self, pipes: &PipeSet) -> Option<(usize, Parts)> {
    for _ in 0..self.order.len() {
      let pipe_id = self.order.pop_front()?;
      self.order.push_back(pipe_id);
      if let Some(PipeRead::Message(parts)) = pipes.get(pipe_id).map(|p| p.try_read()) {
        return Some((pipe_id, parts));
      }
    }
    None
  }

  pub(crate) fn has_in(&self, pipes: &PipeSet) -> bool {
    self.order.iter().any(|&id| pipes.get(id).is_some_and(|p| p.has_pending()))
  }
}
