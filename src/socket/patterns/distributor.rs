// src/socket/patterns/distributor.rs

use super::PipeSet;
use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::pipe::PipeWrite;

/// Fan-out of one message to many pipes.
#[derive(Debug, Default)]
pub(crate) struct Distributor {
  pipes: Vec<usize>,
}

impl Distributor {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn add_pipe(&mut self, pipe_id: usize) {
    if !self.pipes.contains(&pipe_id) {
      self.pipes.push(pipe_id);
    }
  }

  pub(crate) fn remove_pipe(&mut self, pipe_id: usize) {
    self.pipes.retain(|&id| id != pipe_id);
  }

  pub(crate) fn pipe_ids(&self) -> &[usize] {
    &self.pipes
  }

  /// Writes `parts` to every pipe accepted by `matches`.
  ///
  /// Full pipes are skipped (the message is dropped for that peer) unless
  /// `lossless` is set, in which case nothing is written and `WouldBlock` is
  /// returned while any matching pipe is full. Returns the number of pipes written.
  pub(crate) fn send(
    &self,
    pipes: &PipeSet,
    parts: &[Msg],
    matches: impl Fn(usize) -> bool,
    lossless: bool,
  ) -> Result<usize, ZmqError> {
    let targets: Vec<_> = self
      .pipes
      .iter()
      .filter(|&&id| matches(id))
      .filter_map(|&id| pipes.get(id))
      .collect();
    if lossless && targets.iter().any(|p| !p.can_write() && !p.is_write_closed()) {
      return Err(ZmqError::WouldBlock);
    }
    let mut written = 0;
    for pipe in targets {
      match pipe.try_write(parts.to_vec()) {
        PipeWrite::Written => written += 1,
        PipeWrite::Full(_) => tracing::trace!(pipe_id = pipe.id(), "Distributor dropped message for full pipe"),
        PipeWrite::Closed(_) => {}
      }
    }
    Ok(written)
  }

  pub(crate) fn has_out(&self, pipes: &PipeSet) -> bool {
    self.pipes.iter().all(|&id| pipes.get(id).map_or(true, |p| p.can_write() || p.is_write_closed()))
  }
}
