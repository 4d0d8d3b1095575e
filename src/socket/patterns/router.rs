// src/socket/patterns/router.rs

use crate::message::Blob;
use std::collections::HashMap;

/// Identity <-> pipe mapping for ROUTER and STREAM sockets.
#[derive(Debug)]
pub(crate) struct RouterMap {
  identity_to_pipe: HashMap<Blob, usize>,
  pipe_to_identity: HashMap<usize, Blob>,
  next_generated: u32,
}

impl RouterMap {
  pub(crate) fn new() -> Self {
    Self {
      identity_to_pipe: HashMap::new(),
      pipe_to_identity: HashMap::new(),
      next_generated: rand::random(),
    }
  }

  /// Registers a pipe and returns the identity it is reachable under, plus the
  /// pipe that lost the identity to a handover, if any.
  ///
  /// The peer's requested identity is honoured unless another pipe already
  /// holds it; with `handover` the newcomer takes it over instead.
  pub(crate) fn add_peer(&mut self, pipe_id: usize, requested: Option<&Blob>, handover: bool) -> (Blob, Option<usize>) {
    let mut displaced = None;
    let identity = match requested {
      Some(id) if !id.is_empty() => match self.identity_to_pipe.get(id).copied() {
        None => id.clone(),
        Some(old_pipe) if handover => {
          tracing::debug!(identity = ?id, old_pipe, new_pipe = pipe_id, "Router identity handed over");
          self.pipe_to_identity.remove(&old_pipe);
          displaced = Some(old_pipe);
          id.clone()
        }
        Some(old_pipe) => {
          tracing::warn!(identity = ?id, old_pipe, new_pipe = pipe_id, "Duplicate router identity, generating one");
          self.generate()
        }
      },
      _ => self.generate(),
    };
    self.identity_to_pipe.insert(identity.clone(), pipe_id);
    self.pipe_to_identity.insert(pipe_id, identity.clone());
    (identity, displaced)
  }

  pub(crate) fn remove_pipe(&mut self, pipe_id: usize) -> Option<Blob> {
    let identity = self.pipe_to_identity.remove(&pipe_id)?;
    if self.identity_to_pipe.get(&identity) == Some(&pipe_id) {
      self.identity_to_pipe.remove(&identity);
    }
    Some(identity)
  }

  pub(crate) fn identity_of(&self, pipe_id: usize) -> Option<&Blob> {
    self.pipe_to_identity.get(&pipe_id)
  }

  pub(crate) fn pipe_for(&self, identity: &[u8]) -> Option<usize> {
    self.identity_to_pipe.get(identity).copied()
  }

  /// Five bytes: a zero byte then a big-endian counter.
  fn generate(&mut self) -> Blob {
    loop {
      let n = self.next_generated;
      self.next_generated = self.next_generated.wrapping_add(1);
      let mut id = Vec::with_capacity(5);
      id.push(0u8);
      id.extend_from_slice(&n.to_be_bytes());
      let blob = Blob::from(id);
      if !self.identity_to_pipe.contains_key(&blob) {
        return blob;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn generated_identities_are_five_bytes_and_unique() {
    let mut map = RouterMap::new();
    let (a, _) = map.add_peer(1, None, false);
    let (b, _) = map.add_peer(2, None, false);
    assert_eq!(a.size(), 5);
    assert_eq!(a[0], 0);
    assert_ne!(a, b);
    assert_eq!(map.pipe_for(&a), Some(1));
  }

  #[test]
  fn duplicate_identity_without_handover_keeps_first_owner() {
    let mut map = RouterMap::new();
    let wanted = Blob::from(b"client".to_vec());
    assert_eq!(map.add_peer(1, Some(&wanted), false), (wanted.clone(), None));
    let (other, displaced) = map.add_peer(2, Some(&wanted), false);
    assert_eq!(displaced, None);
    assert_ne!(other, wanted);
    assert_eq!(map.pipe_for(b"client"), Some(1));
  }

  #[test]
  fn handover_moves_identity_to_new_pipe() {
    let mut map = RouterMap::new();
    let wanted = Blob::from(b"client".to_vec());
    map.add_peer(1, Some(&wanted), true);
    assert_eq!(map.add_peer(2, Some(&wanted), true).1, Some(1));
    assert_eq!(map.pipe_for(b"client"), Some(2));
    assert_eq!(map.remove_pipe(1), None);
    assert_eq!(map.remove_pipe(2), Some(wanted));
    assert_eq!(map.pipe_for(b"client"), None);
  }
}
