// src/runtime/signal.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct SignalInner {
  notify: Notify,
  epoch: AtomicU64,
}

/// Wake-up signal owned by whoever reads a set of queues (a socket, a session).
///
/// Writers raise it after making progress the owner may be waiting for. A
/// waiter samples [`Signal::epoch`] before checking its queues and then waits
/// with [`Signal::changed_since`], so a raise that lands between the check and
/// the wait is never lost, and every concurrent waiter is woken.
#[derive(Debug, Clone, Default)]
pub(crate) struct Signal {
  inner: Arc<SignalInner>,
}

impl Signal {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn raise(&self) {
    self.inner.epoch.fetch_add(1, Ordering::SeqCst);
    self.inner.notify.notify_waiters();
  }

  pub(crate) fn epoch(&self) -> u64 {
    self.inner.epoch.load(Ordering::SeqCst)
  }

  /// Waits until the signal has been raised after `seen` was sampled, or until
  /// `deadline`. Returns false on expiry.
  pub(crate) async fn changed_since(&self, seen: u64, deadline: Option<Instant>) -> bool {
    loop {
      let notified = self.inner.notify.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();
      if self.epoch() != seen {
        return true;
      }
      match deadline {
        None => notified.await,
        Some(at) => {
          if tokio::time::timeout_at(at, notified).await.is_err() {
            return self.epoch() != seen;
          }
        }
      }
    }
  }
}
