// src/runtime/event_bus.rs

use tokio::sync::broadcast::{self, Receiver, Sender};

const DEFAULT_EVENT_BUS_CAPACITY: usize = 256;

/// Lifecycle events broadcast to every task running on the I/O threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SystemEvent {
  /// The context is terminating; every task should wind down.
  ContextTerminating,
  /// A socket is closing; its listeners, connecters and sessions should stop.
  SocketClosing { socket_id: usize },
}

impl SystemEvent {
  /// True if the event asks tasks owned by `socket_id` to stop.
  pub(crate) fn stops(&self, socket_id: usize) -> bool {
    match self {
      SystemEvent::ContextTerminating => true,
      SystemEvent::SocketClosing { socket_id: id } => *id == socket_id,
    }
  }
}

/// A self-contained event bus over `tokio::sync::broadcast`.
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
  sender: Sender<SystemEvent>,
}

impl EventBus {
  pub(crate) fn new() -> Self {
    let (sender, _) = broadcast::channel(DEFAULT_EVENT_BUS_CAPACITY);
    tracing::debug!(capacity = DEFAULT_EVENT_BUS_CAPACITY, "Created new EventBus");
    Self { sender }
  }

  /// Publishes an event. Having no subscribers is not an error.
  pub(crate) fn publish(&self, event: SystemEvent) {
    tracing::trace!(event = ?event, "Publishing event");
    let _ = self.sender.send(event);
  }

  pub(crate) fn subscribe(&self) -> Receiver<SystemEvent> {
    self.sender.subscribe()
  }
}

impl Default for EventBus {
  fn default() -> Self {
    Self::new()
  }
}

/// Waits until the bus carries an event that stops `socket_id`'s tasks.
/// A lagged or closed bus counts as a stop.
pub(crate) async fn wait_for_stop(rx: &mut Receiver<SystemEvent>, socket_id: usize) -> SystemEvent {
  loop {
    match rx.recv().await {
      Ok(event) if event.stops(socket_id) => return event,
      Ok(_) => continue,
      Err(broadcast::error::RecvError::Lagged(n)) => {
        tracing::warn!(socket_id, skipped = n, "Event bus receiver lagged, stopping task");
        return SystemEvent::SocketClosing { socket_id };
      }
      Err(broadcast::error::RecvError::Closed) => return SystemEvent::ContextTerminating,
    }
  }
}
