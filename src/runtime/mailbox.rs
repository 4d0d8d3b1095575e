// src/runtime/mailbox.rs

//! Command queues built on `async-channel`.
//!
//! Many producers (user calls, I/O threads, inproc peers) feed one consumer.
//! I/O thread mailboxes are sized at nominal capacity plus [`MAILBOX_SLACK`]
//! so that non-blocking producers can absorb short bursts. A socket's own
//! mailbox is only drained during user calls, so it is never capacity-bound:
//! pipe attachments from peers must not be refused by an idle socket.

use crate::error::ZmqError;
use crate::runtime::command::Command;
use crate::runtime::signal::Signal;
use std::time::Duration;

/// Default nominal capacity for mailboxes.
pub(crate) const DEFAULT_MAILBOX_CAPACITY: usize = 128;
/// Extra room granted on top of the nominal capacity.
pub(crate) const MAILBOX_SLACK: usize = 16;

/// The sending end of a mailbox. Cloneable.
#[derive(Debug, Clone)]
pub(crate) struct MailboxSender {
  tx: async_channel::Sender<Command>,
  signal: Option<Signal>,
}

/// The receiving end of a mailbox.
#[derive(Debug)]
pub(crate) struct MailboxReceiver {
  rx: async_channel::Receiver<Command>,
}

/// Outcome of a receive attempt.
#[derive(Debug)]
pub(crate) enum MailboxRecv {
  Command(Command),
  Empty,
  Closed,
}

/// Creates a mailbox with the given nominal capacity.
pub(crate) fn mailbox(capacity: usize) -> (MailboxSender, MailboxReceiver) {
  let (tx, rx) = async_channel::bounded(capacity.max(1) + MAILBOX_SLACK);
  (MailboxSender { tx, signal: None }, MailboxReceiver { rx })
}

/// Creates a socket mailbox: unbounded, and every successful post raises `signal`.
pub(crate) fn socket_mailbox(signal: Signal) -> (MailboxSender, MailboxReceiver) {
  let (tx, rx) = async_channel::unbounded();
  (
    MailboxSender {
      tx,
      signal: Some(signal),
    },
    MailboxReceiver { rx },
  )
}

impl MailboxSender {
  /// Enqueues without blocking. Fails with `WouldBlock` when capacity and
  /// slack are exhausted; a socket mailbox only fails once closed.
  pub(crate) fn try_post(&self, cmd: Command) -> Result<(), ZmqError> {
    match self.tx.try_send(cmd) {
      Ok(()) => {
        self.raise();
        Ok(())
      }
      Err(async_channel::TrySendError::Full(cmd)) => {
        tracing::warn!(command = cmd.variant_name(), "Mailbox full, command not posted");
        Err(ZmqError::WouldBlock)
      }
      Err(async_channel::TrySendError::Closed(_)) => Err(ZmqError::ContextTerminated),
    }
  }

  /// Enqueues, waiting for room if the mailbox is full.
  pub(crate) async fn post(&self, cmd: Command) -> Result<(), ZmqError> {
    self.tx.send(cmd).await.map_err(|_| ZmqError::ContextTerminated)?;
    self.raise();
    Ok(())
  }

  pub(crate) fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }

  fn raise(&self) {
    if let Some(signal) = &self.signal {
      signal.raise();
    }
  }
}

impl MailboxReceiver {
  pub(crate) fn try_recv(&self) -> MailboxRecv {
    match self.rx.try_recv() {
      Ok(cmd) => MailboxRecv::Command(cmd),
      Err(async_channel::TryRecvError::Empty) => MailboxRecv::Empty,
      Err(async_channel::TryRecvError::Closed) => MailboxRecv::Closed,
    }
  }

  /// Waits up to `timeout` (forever when `None`) for the next command.
  pub(crate) async fn recv_timeout(&self, timeout: Option<Duration>) -> MailboxRecv {
    let recv = self.rx.recv();
    let result = match timeout {
      Some(limit) => match tokio::time::timeout(limit, recv).await {
        Ok(r) => r,
        Err(_) => return MailboxRecv::Empty,
      },
      None => recv.await,
    };
    match result {
      Ok(cmd) => MailboxRecv::Command(cmd),
      Err(_) => MailboxRecv::Closed,
    }
  }

  /// Closes the mailbox; queued commands can still be drained.
  pub(crate) fn close(&self) {
    self.rx.close();
  }
}
