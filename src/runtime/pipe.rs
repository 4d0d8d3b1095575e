// src/runtime/pipe.rs

//! Bidirectional in-process message queues between a socket and one peer.
//!
//! A pipe is created as a pair of [`Pipe`] endpoints. Each endpoint writes one
//! direction and reads the other; every successful write or read raises the
//! peer's [`Signal`] so a waiting peer re-checks its queues. The unit queued is
//! one complete multipart message, so the high-water mark counts messages and
//! a message is never split by back-pressure.

use crate::message::{Blob, Msg};
use crate::runtime::signal::Signal;
use async_channel::{Receiver, Sender, TryRecvError, TrySendError};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// All frames of one message.
pub(crate) type Parts = Vec<Msg>;

static NEXT_PIPE_ID: AtomicUsize = AtomicUsize::new(1);

pub(crate) fn next_pipe_id() -> usize {
  NEXT_PIPE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Capacity settings for one direction of a pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PipeConfig {
  /// Maximum queued messages, 0 for unlimited.
  pub hwm: usize,
  /// Keep only the newest message.
  pub conflate: bool,
}

impl PipeConfig {
  pub(crate) fn new(hwm: usize, conflate: bool) -> Self {
    Self { hwm, conflate }
  }

  fn channel(&self) -> (Sender<Parts>, Receiver<Parts>) {
    if self.conflate {
      async_channel::bounded(1)
    } else if self.hwm == 0 {
      async_channel::unbounded()
    } else {
      async_channel::bounded(self.hwm)
    }
  }
}

#[derive(Debug)]
pub(crate) enum PipeWrite {
  Written,
  Full(Parts),
  Closed(Parts),
}

#[derive(Debug)]
pub(crate) enum PipeRead {
  Message(Parts),
  Empty,
  Closed,
}

/// One endpoint of a pipe.
pub(crate) struct Pipe {
  id: usize,
  tx: Sender<Parts>,
  /// Second receiver on our outbound queue, used by conflate to evict the oldest message.
  evict: Option<Receiver<Parts>>,
  rx: Receiver<Parts>,
  peer_signal: Signal,
  peer_identity: Option<Blob>,
  endpoint: String,
}

/// Creates a connected pair of endpoints `(a, b)`.
///
/// `a_signal`/`b_signal` belong to the owners of `a` and `b`; `a_to_b` and
/// `b_to_a` size the two directions.
pub(crate) fn pipe_pair(
  a_signal: Signal,
  b_signal: Signal,
  a_to_b: PipeConfig,
  b_to_a: PipeConfig,
  endpoint: &str,
) -> (Pipe, Pipe) {
  let id = next_pipe_id();
  let (ab_tx, ab_rx) = a_to_b.channel();
  let (ba_tx, ba_rx) = b_to_a.channel();
  let ab_evict = a_to_b.conflate.then(|| ab_rx.clone());
  let ba_evict = b_to_a.conflate.then(|| ba_rx.clone());
  let a = Pipe {
    id,
    evict: ab_evict,
    tx: ab_tx,
    rx: ba_rx,
    peer_signal: b_signal,
    peer_identity: None,
    endpoint: endpoint.to_string(),
  };
  let b = Pipe {
    id,
    evict: ba_evict,
    tx: ba_tx,
    rx: ab_rx,
    peer_signal: a_signal,
    peer_identity: None,
    endpoint: endpoint.to_string(),
  };
  tracing::trace!(pipe_id = id, endpoint, ?a_to_b, ?b_to_a, "Created pipe pair");
  (a, b)
}

impl Pipe {
  pub(crate) fn id(&self) -> usize {
    self.id
  }

  pub(crate) fn endpoint(&self) -> &str {
    &self.endpoint
  }

  pub(crate) fn peer_identity(&self) -> Option<&Blob> {
    self.peer_identity.as_ref()
  }

  pub(crate) fn set_peer_identity(&mut self, identity: Option<Blob>) {
    self.peer_identity = identity.filter(|id| !id.is_empty());
  }

  /// Queues a message toward the peer without blocking.
  pub(crate) fn try_write(&self, parts: Parts) -> PipeWrite {
    let result = match self.tx.try_send(parts) {
      Err(TrySendError::Full(parts)) => match &self.evict {
        Some(evict) => {
          let _ = evict.try_recv();
          match self.tx.try_send(parts) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(parts)) => return PipeWrite::Full(parts),
            Err(TrySendError::Closed(parts)) => return PipeWrite::Closed(parts),
          }
        }
        None => return PipeWrite::Full(parts),
      },
      other => other,
    };
    match result {
      Ok(()) => {
        self.peer_signal.raise();
        PipeWrite::Written
      }
      Err(TrySendError::Closed(parts)) => PipeWrite::Closed(parts),
      Err(TrySendError::Full(parts)) => PipeWrite::Full(parts),
    }
  }

  /// Takes the next message from the peer without blocking.
  pub(crate) fn try_read(&self) -> PipeRead {
    match self.rx.try_recv() {
      Ok(parts) => {
        self.peer_signal.raise();
        PipeRead::Message(parts)
      }
      Err(TryRecvError::Empty) => PipeRead::Empty,
      Err(TryRecvError::Closed) => PipeRead::Closed,
    }
  }

  /// True if a write would currently be accepted.
  pub(crate) fn can_write(&self) -> bool {
    !self.tx.is_closed() && (self.evict.is_some() || !self.tx.is_full())
  }

  /// True if a message is waiting to be read.
  pub(crate) fn has_pending(&self) -> bool {
    !self.rx.is_empty()
  }

  /// Messages written by us that the peer has not read yet.
  pub(crate) fn queued_out(&self) -> usize {
    self.tx.len()
  }

  pub(crate) fn is_write_closed(&self) -> bool {
    self.tx.is_closed()
  }

  /// True once the peer has closed and everything it sent has been read.
  pub(crate) fn is_exhausted(&self) -> bool {
    self.rx.is_closed() && self.rx.is_empty()
  }

  /// Closes both directions. Messages already queued toward the peer remain
  /// readable by it.
  pub(crate) fn close(&self) {
    let closed_tx = self.tx.close();
    let closed_rx = self.rx.close();
    if closed_tx || closed_rx {
      tracing::trace!(pipe_id = self.id, endpoint = %self.endpoint, "Pipe endpoint closed");
      self.peer_signal.raise();
    }
  }
}

impl Drop for Pipe {
  fn drop(&mut self) {
    self.close();
  }
}

impl fmt::Debug for Pipe {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Pipe")
      .field("id", &self.id)
      .field("endpoint", &self.endpoint)
      .field("peer_identity", &self.peer_identity)
      .field("queued_out", &self.tx.len())
      .field("queued_in", &self.rx.len())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn msg(s: &str) -> Parts {
    vec![Msg::from(s)]
  }

  fn pair(hwm: usize, conflate: bool) -> (Pipe, Pipe, Signal, Signal) {
    let (sa, sb) = (Signal::new(), Signal::new());
    let (a, b) = pipe_pair(
      sa.clone(),
      sb.clone(),
      PipeConfig::new(hwm, conflate),
      PipeConfig::new(hwm, false),
      "inproc://test",
    );
    (a, b, sa, sb)
  }

  #[test]
  fn hwm_bounds_each_direction() {
    let (a, b, _, _) = pair(3, false);
    for i in 0..3 {
      assert!(matches!(a.try_write(msg(&i.to_string())), PipeWrite::Written));
    }
    assert!(!a.can_write());
    assert!(matches!(a.try_write(msg("overflow")), PipeWrite::Full(_)));
    // The reverse direction is independent.
    assert!(matches!(b.try_write(msg("back")), PipeWrite::Written));

    assert!(matches!(b.try_read(), PipeRead::Message(p) if p[0].data() == b"0"));
    assert!(a.can_write());
  }

  #[test]
  fn zero_hwm_is_unbounded() {
    let (a, _b, _, _) = pair(0, false);
    for _ in 0..10_000 {
      assert!(matches!(a.try_write(msg("x")), PipeWrite::Written));
    }
  }

  #[test]
  fn conflate_keeps_only_newest() {
    let (a, b, _, _) = pair(1000, true);
    for s in ["one", "two", "three"] {
      assert!(matches!(a.try_write(msg(s)), PipeWrite::Written));
    }
    assert!(matches!(b.try_read(), PipeRead::Message(p) if p[0].data() == b"three"));
    assert!(matches!(b.try_read(), PipeRead::Empty));
  }

  #[test]
  fn conflate_is_set_per_direction() {
    let (a, b) = pipe_pair(
      Signal::new(),
      Signal::new(),
      PipeConfig::new(2, false),
      PipeConfig::new(2, true),
      "inproc://test",
    );
    for s in ["one", "two", "three"] {
      assert!(matches!(b.try_write(msg(s)), PipeWrite::Written));
    }
    assert!(matches!(a.try_read(), PipeRead::Message(p) if p[0].data() == b"three"));

    assert!(matches!(a.try_write(msg("x")), PipeWrite::Written));
    assert!(matches!(a.try_write(msg("y")), PipeWrite::Written));
    assert!(matches!(a.try_write(msg("z")), PipeWrite::Full(_)));
    assert!(matches!(b.try_read(), PipeRead::Message(p) if p[0].data() == b"x"));
  }

  #[test]
  fn close_keeps_queued_messages_for_peer() {
    let (a, b, _, _) = pair(10, false);
    a.try_write(msg("last"));
    a.close();
    assert!(b.is_write_closed());
    assert!(matches!(b.try_write(msg("late")), PipeWrite::Closed(_)));
    assert!(matches!(b.try_read(), PipeRead::Message(_)));
    assert!(matches!(b.try_read(), PipeRead::Closed));
    assert!(b.is_exhausted());
  }

  #[test]
  fn dropping_an_endpoint_closes_it() {
    let (a, b, _, _) = pair(10, false);
    drop(a);
    assert!(matches!(b.try_read(), PipeRead::Closed));
  }

  #[tokio::test]
  async fn writes_raise_the_peer_signal() {
    let (a, _b, _sa, sb) = pair(10, false);
    let seen = sb.epoch();
    a.try_write(msg("wake"));
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(50);
    assert!(sb.changed_since(seen, Some(deadline)).await);
  }
}
