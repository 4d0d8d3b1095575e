// src/poller.rs

//! Readiness polling across several sockets.

use crate::error::ZmqError;
use crate::socket::Socket;
use bitflags::bitflags;
use futures::future::select_all;
use std::time::Duration;
use tokio::time::Instant;

bitflags! {
  /// Readiness bits, as reported by EVENTS.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
  pub struct PollEvents: i16 {
    /// At least one message can be received without waiting.
    const POLLIN = 0b0001;
    /// At least one message can be sent without waiting.
    const POLLOUT = 0b0010;
    /// The socket is closed or its context terminated.
    const POLLERR = 0b0100;
  }
}

/// One socket to poll and the events of interest.
#[derive(Debug)]
pub struct PollItem<'a> {
  pub socket: &'a Socket,
  pub events: PollEvents,
  /// Filled in by [`poll`].
  pub revents: PollEvents,
}

impl<'a> PollItem<'a> {
  pub fn new(socket: &'a Socket, events: PollEvents) -> Self {
    Self {
      socket,
      events,
      revents: PollEvents::empty(),
    }
  }
}

/// Waits until at least one item is ready or `timeout` passes (`None` waits
/// forever, zero checks once). Returns the number of ready items; each
/// item's `revents` holds its ready subset of `events`, plus POLLERR for a
/// closed socket.
pub async fn poll(items: &mut [PollItem<'_>], timeout: Option<Duration>) -> Result<usize, ZmqError> {
  let deadline = timeout.map(|t| Instant::now() + t);
  loop {
    let seen: Vec<u64> = items.iter().map(|item| item.socket.core().signal().epoch()).collect();
    let mut ready = 0;
    for item in items.iter_mut() {
      item.revents = match item.socket.core().events() {
        Ok(events) => events & item.events,
        Err(e) if e.is_terminal() => PollEvents::POLLERR,
        Err(e) => return Err(e),
      };
      if !item.revents.is_empty() {
        ready += 1;
      }
    }
    if ready > 0 || timeout.is_some_and(|t| t.is_zero()) {
      return Ok(ready);
    }
    if items.is_empty() {
      if let Some(at) = deadline {
        tokio::time::sleep_until(at).await;
        return Ok(0);
      }
      return Err(ZmqError::InvalidArgument("poll with no items and no timeout".into()));
    }

    let waits = items
      .iter()
      .zip(&seen)
      .map(|(item, &epoch)| Box::pin(item.socket.core().signal().changed_since(epoch, deadline)));
    let (changed, _, _) = select_all(waits).await;
    if !changed {
      return Ok(0);
    }
  }
}
