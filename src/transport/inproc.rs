// src/transport/inproc.rs

//! In-process transport: a connect joins two sockets with a pipe directly,
//! without any I/O thread.

use crate::error::ZmqError;
use crate::message::Blob;
use crate::runtime::command::Command;
use crate::runtime::mailbox::MailboxSender;
use crate::runtime::pipe::{pipe_pair, Pipe, PipeConfig};
use crate::runtime::signal::Signal;
use crate::socket::core::SocketCore;
use crate::socket::SocketType;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

#[derive(Debug)]
struct InprocBinding {
  socket_id: usize,
  core: Weak<SocketCore>,
}

/// Context-wide table of bound inproc names.
#[derive(Debug, Default)]
pub(crate) struct InprocRegistry {
  bindings: RwLock<HashMap<String, InprocBinding>>,
}

impl InprocRegistry {
  pub(crate) fn bind(&self, name: &str, socket_id: usize, core: Weak<SocketCore>) -> Result<(), ZmqError> {
    let mut bindings = self.bindings.write();
    if bindings.contains_key(name) {
      return Err(ZmqError::AddrInUse(format!("inproc://{}", name)));
    }
    bindings.insert(name.to_string(), InprocBinding { socket_id, core });
    tracing::debug!(socket_id, name, "Registered inproc binding");
    Ok(())
  }

  /// Removes `name` if `socket_id` owns it.
  pub(crate) fn unbind(&self, name: &str, socket_id: usize) -> bool {
    let mut bindings = self.bindings.write();
    match bindings.get(name) {
      Some(b) if b.socket_id == socket_id => {
        bindings.remove(name);
        true
      }
      _ => false,
    }
  }

  /// Drops every name owned by a closing socket.
  pub(crate) fn remove_socket(&self, socket_id: usize) {
    self.bindings.write().retain(|_, b| b.socket_id != socket_id);
  }

  fn lookup(&self, name: &str) -> Option<Arc<SocketCore>> {
    let weak = self.bindings.read().get(name).map(|b| b.core.clone());
    weak.and_then(|w| w.upgrade())
  }
}

/// What one side of an inproc connection contributes to the pipe.
#[derive(Debug, Clone)]
pub(crate) struct InprocPeer {
  pub socket_type: SocketType,
  pub signal: Signal,
  pub mailbox: MailboxSender,
  pub sndhwm: usize,
  pub conflate: bool,
  pub routing_id: Option<Blob>,
}

/// Connects `local` to the socket bound at `name`. Returns the connecting
/// side's pipe end; the binder's end is posted to its mailbox.
pub(crate) fn connect(registry: &InprocRegistry, name: &str, uri: &str, local: &InprocPeer) -> Result<Pipe, ZmqError> {
  let binder = registry
    .lookup(name)
    .ok_or_else(|| ZmqError::ConnectionRefused(uri.to_string()))?;
  let remote = binder
    .inproc_peer()
    .map_err(|_| ZmqError::ConnectionRefused(uri.to_string()))?;
  drop(binder);

  if !local.socket_type.is_compatible(remote.socket_type) {
    tracing::debug!(local = ?local.socket_type, remote = ?remote.socket_type, uri, "Incompatible inproc peer");
    return Err(ZmqError::InvalidSocketType("peer socket type is incompatible"));
  }

  // Each direction is bounded by its sender's SNDHWM.
  let conflate = local.conflate || remote.conflate;
  let (mut ours, mut theirs) = pipe_pair(
    local.signal.clone(),
    remote.signal.clone(),
    PipeConfig::new(local.sndhwm, conflate),
    PipeConfig::new(remote.sndhwm, conflate),
    uri,
  );
  ours.set_peer_identity(remote.routing_id.clone());
  theirs.set_peer_identity(local.routing_id.clone());

  // The binder's mailbox is unbounded; this only fails if it is closing.
  remote
    .mailbox
    .try_post(Command::AttachPipe { pipe: theirs })
    .map_err(|_| ZmqError::ConnectionRefused(uri.to_string()))?;
  tracing::debug!(uri, pipe_id = ours.id(), "Inproc pipe established");
  Ok(ours)
}
