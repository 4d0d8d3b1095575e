// src/socket/core.rs

//! Per-socket state shared by every clone of a [`Socket`](crate::Socket).
//!
//! All routing happens synchronously under one short-lived lock. Blocking
//! operations release the lock and wait on the socket's [`Signal`], which is
//! raised by pipe peers and by the socket's mailbox.

use crate::context::ContextInner;
use crate::error::ZmqError;
use crate::message::{normalize_more_flags, Msg};
use crate::poller::PollEvents;
use crate::runtime::command::{Command, SocketLink};
use crate::runtime::event_bus::SystemEvent;
use crate::runtime::io_thread::IoThread;
use crate::runtime::mailbox::{socket_mailbox, MailboxReceiver, MailboxRecv, MailboxSender};
use crate::runtime::pipe::{pipe_pair, Pipe};
use crate::runtime::signal::Signal;
use crate::socket::events::{Monitor, MonitorReceiver, SocketEvent};
use crate::socket::options::{
  self, option_spec, OptionAccess, OptionScope, OptionValue, SocketOptions, EVENTS, LAST_ENDPOINT, RCVMORE, TYPE,
};
use crate::socket::patterns::PipeSet;
use crate::socket::{create_pattern, ISocket, SocketType};
use crate::transport::connecter::{ConnectionState, ConnectionStatus, SharedStatus};
use crate::transport::endpoint::{parse_endpoint, Endpoint};
#[cfg(feature = "inproc")]
use crate::transport::inproc::{self, InprocPeer};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// How long a blocking call may wait for progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wait {
  NoWait,
  Forever,
  Until(Instant),
}

impl Wait {
  /// Maps SNDTIMEO/RCVTIMEO: unset blocks, zero never waits.
  pub(crate) fn from_timeout(timeout: Option<Duration>) -> Self {
    match timeout {
      None => Wait::Forever,
      Some(d) if d.is_zero() => Wait::NoWait,
      Some(d) => Wait::Until(Instant::now() + d),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
  Active,
  Closed,
  Terminated,
}

#[derive(Debug)]
struct BindRecord {
  requested: String,
  resolved: String,
}

#[derive(Debug)]
struct ConnectRecord {
  status: SharedStatus,
  /// Pipe created at connect time (inproc, or a queue that survives reconnects).
  pipe_id: Option<usize>,
  network: bool,
}

struct CoreState {
  phase: Phase,
  options: SocketOptions,
  pattern: Box<dyn ISocket>,
  pipes: PipeSet,
  mailbox_rx: MailboxReceiver,
  binds: Vec<BindRecord>,
  connects: HashMap<String, ConnectRecord>,
  last_endpoint: String,
  /// Frames of a multipart message staged until its final frame.
  send_buf: Vec<Msg>,
  /// Remaining frames of the message being received.
  recv_buf: VecDeque<Msg>,
  rcvmore: bool,
}

impl CoreState {
  fn check_active(&self) -> Result<(), ZmqError> {
    match self.phase {
      Phase::Active => Ok(()),
      Phase::Closed => Err(ZmqError::SocketClosed),
      Phase::Terminated => Err(ZmqError::ContextTerminated),
    }
  }

  /// Pipes in use plus connects still waiting for their pipe.
  fn peer_count(&self) -> usize {
    let waiting = self
      .connects
      .values()
      .filter(|c| c.pipe_id.map_or(true, |id| self.pipes.get(id).is_none()))
      .count();
    self.pipes.len() + waiting
  }
}

pub(crate) struct SocketCore {
  pub(crate) handle: usize,
  pub(crate) socket_type: SocketType,
  weak_self: Weak<SocketCore>,
  context: Arc<ContextInner>,
  io_thread: Option<Arc<IoThread>>,
  mailbox_tx: MailboxSender,
  signal: Signal,
  monitor: Monitor,
  state: Mutex<CoreState>,
}

impl SocketCore {
  pub(crate) fn new(
    handle: usize,
    socket_type: SocketType,
    context: Arc<ContextInner>,
    io_thread: Option<Arc<IoThread>>,
  ) -> Arc<Self> {
    let signal = Signal::new();
    let (mailbox_tx, mailbox_rx) = socket_mailbox(signal.clone());
    tracing::debug!(socket_handle = handle, ?socket_type, io_thread = io_thread.as_ref().map(|t| t.id()), "Creating socket");
    Arc::new_cyclic(|weak_self| SocketCore {
      handle,
      socket_type,
      weak_self: weak_self.clone(),
      context,
      io_thread,
      mailbox_tx,
      signal,
      monitor: Monitor::default(),
      state: Mutex::new(CoreState {
        phase: Phase::Active,
        options: SocketOptions::default(),
        pattern: create_pattern(socket_type),
        pipes: PipeSet::default(),
        mailbox_rx,
        binds: Vec::new(),
        connects: HashMap::new(),
        last_endpoint: String::new(),
        send_buf: Vec::new(),
        recv_buf: VecDeque::new(),
        rcvmore: false,
      }),
    })
  }

  pub(crate) fn signal(&self) -> &Signal {
    &self.signal
  }

  fn link(&self) -> SocketLink {
    SocketLink {
      socket_id: self.handle,
      socket_type: self.socket_type,
      mailbox: self.mailbox_tx.clone(),
      signal: self.signal.clone(),
      monitor: self.monitor.clone(),
      core: self.weak_self.clone(),
    }
  }

  fn io_thread_for(&self, endpoint: &str) -> Result<&Arc<IoThread>, ZmqError> {
    self
      .io_thread
      .as_ref()
      .ok_or_else(|| ZmqError::UnsupportedTransport(format!("{} (context has no I/O threads)", endpoint)))
  }

  // --- Commands and pipes ---

  /// Applies queued mailbox commands and drops pipes whose peer has gone.
  fn process_commands(&self, st: &mut CoreState) {
    loop {
      match st.mailbox_rx.try_recv() {
        MailboxRecv::Command(Command::AttachPipe { pipe }) => {
          let pipe_id = pipe.id();
          if let Err(e) = self.attach_pipe(st, pipe) {
            tracing::warn!(socket_handle = self.handle, pipe_id, error = %e, "Refused pipe");
          }
        }
        MailboxRecv::Command(Command::DetachPipe { pipe_id }) => {
          if let Some(pipe) = st.pipes.get(pipe_id) {
            pipe.close();
          }
        }
        MailboxRecv::Command(other) => {
          tracing::warn!(socket_handle = self.handle, command = other.variant_name(), "Unexpected command for socket");
        }
        MailboxRecv::Empty | MailboxRecv::Closed => break,
      }
    }
    for pipe_id in st.pipes.exhausted() {
      st.pattern.detach(pipe_id);
      if let Some(pipe) = st.pipes.remove(pipe_id) {
        tracing::debug!(socket_handle = self.handle, pipe_id, endpoint = %pipe.endpoint(), "Pipe detached");
      }
    }
  }

  fn attach_pipe(&self, st: &mut CoreState, pipe: Pipe) -> Result<(), ZmqError> {
    if let Err(e) = st.pattern.attach(&st.pipes, &pipe) {
      pipe.close();
      return Err(e);
    }
    tracing::debug!(socket_handle = self.handle, pipe_id = pipe.id(), endpoint = %pipe.endpoint(), "Pipe attached");
    st.pipes.insert(pipe);
    self.signal.raise();
    Ok(())
  }

  /// A pipe created at connect time now leads to a new peer after a
  /// reconnect. Called from the session that resumed it.
  pub(crate) fn pipe_resumed(&self, pipe_id: usize) {
    let mut guard = self.state.lock();
    let st = &mut *guard;
    if st.phase != Phase::Active {
      return;
    }
    if let Some(pipe) = st.pipes.get(pipe_id) {
      tracing::debug!(socket_handle = self.handle, pipe_id, endpoint = %pipe.endpoint(), "Pipe resumed on a new connection");
      st.pattern.resumed(pipe);
    }
  }

  // --- Endpoints ---

  pub(crate) async fn bind(&self, endpoint_str: &str) -> Result<(), ZmqError> {
    let endpoint = parse_endpoint(endpoint_str)?;
    let options = {
      let st = self.state.lock();
      st.check_active()?;
      st.options.clone()
    };

    let resolved = match &endpoint {
      #[cfg(feature = "inproc")]
      Endpoint::Inproc(name) => {
        if self.socket_type == SocketType::Stream {
          return Err(ZmqError::UnsupportedTransport(endpoint_str.to_string()));
        }
        self.context.inproc.bind(name, self.handle, self.weak_self.clone())?;
        let uri = endpoint.uri();
        self.monitor.emit(SocketEvent::Listening { endpoint: uri.clone() });
        uri
      }
      _ => {
        let io = self.io_thread_for(endpoint_str)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        io.post(Command::Bind {
          link: self.link(),
          endpoint,
          options,
          stop_rx: self.context.bus.subscribe(),
          reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| ZmqError::ContextTerminated)??
      }
    };

    let mut st = self.state.lock();
    tracing::info!(socket_handle = self.handle, endpoint = %resolved, "Socket bound");
    st.binds.push(BindRecord {
      requested: endpoint_str.to_string(),
      resolved: resolved.clone(),
    });
    st.last_endpoint = resolved;
    Ok(())
  }

  pub(crate) async fn connect(&self, endpoint_str: &str) -> Result<(), ZmqError> {
    let endpoint = parse_endpoint(endpoint_str)?;
    let uri = endpoint.uri();
    match endpoint {
      #[cfg(feature = "inproc")]
      Endpoint::Inproc(ref name) => self.connect_inproc(name, uri),
      _ => self.connect_network(endpoint, uri).await,
    }
  }

  #[cfg(feature = "inproc")]
  fn connect_inproc(&self, name: &str, uri: String) -> Result<(), ZmqError> {
    if self.socket_type == SocketType::Stream {
      return Err(ZmqError::UnsupportedTransport(uri));
    }
    let local = {
      let mut st = self.state.lock();
      st.check_active()?;
      self.process_commands(&mut st);
      if st.pattern.max_peers().is_some_and(|max| st.peer_count() >= max) {
        return Err(ZmqError::TooManyPeers);
      }
      self.inproc_peer_locked(&st)
    };
    let pipe = inproc::connect(&self.context.inproc, name, &uri, &local)?;

    let mut guard = self.state.lock();
    let st = &mut *guard;
    st.check_active()?;
    let pipe_id = pipe.id();
    self.attach_pipe(st, pipe)?;
    let status = SharedStatus::new(&uri);
    status.set_state(ConnectionState::Connected);
    st.connects.insert(
      uri.clone(),
      ConnectRecord {
        status,
        pipe_id: Some(pipe_id),
        network: false,
      },
    );
    self.monitor.emit(SocketEvent::Connected {
      endpoint: uri.clone(),
      peer_addr: uri,
    });
    Ok(())
  }

  async fn connect_network(&self, endpoint: Endpoint, uri: String) -> Result<(), ZmqError> {
    let io = self.io_thread_for(&uri)?;
    let status = SharedStatus::new(&uri);
    let (options, pipe) = {
      let mut guard = self.state.lock();
      let st = &mut *guard;
      st.check_active()?;
      self.process_commands(st);
      if st.pattern.max_peers().is_some_and(|max| st.peer_count() >= max) {
        return Err(ZmqError::TooManyPeers);
      }
      // Identity-routed sockets learn the peer's identity in the handshake,
      // so their pipes always wait for the connection.
      let queue_while_disconnected = !st.options.immediate && !self.socket_type.routes_by_identity();
      let mut pipe_id = None;
      let mut session_pipe = None;
      if queue_while_disconnected {
        let session_signal = Signal::new();
        let (socket_end, session_end) = pipe_pair(
          self.signal.clone(),
          session_signal.clone(),
          st.options.outbound_pipe(),
          st.options.inbound_pipe(),
          &uri,
        );
        pipe_id = Some(socket_end.id());
        self.attach_pipe(st, socket_end)?;
        session_pipe = Some((session_end, session_signal));
      }
      st.connects.insert(
        uri.clone(),
        ConnectRecord {
          status: status.clone(),
          pipe_id,
          network: true,
        },
      );
      (st.options.clone(), session_pipe)
    };

    tracing::debug!(socket_handle = self.handle, endpoint = %uri, "Connecting");
    io.post(Command::Connect {
      link: self.link(),
      endpoint,
      options,
      stop_rx: self.context.bus.subscribe(),
      pipe,
      status,
    })
    .await
  }

  pub(crate) async fn unbind(&self, endpoint: &str) -> Result<(), ZmqError> {
    let record = {
      let mut st = self.state.lock();
      st.check_active()?;
      let idx = st
        .binds
        .iter()
        .position(|b| b.requested == endpoint || b.resolved == endpoint)
        .ok_or_else(|| ZmqError::InvalidEndpoint(format!("{} is not bound", endpoint)))?;
      st.binds.remove(idx)
    };
    match parse_endpoint(&record.resolved)? {
      #[cfg(feature = "inproc")]
      Endpoint::Inproc(name) => {
        self.context.inproc.unbind(&name, self.handle);
        self.monitor.emit(SocketEvent::Closed {
          endpoint: record.resolved,
        });
        Ok(())
      }
      _ => {
        let io = self.io_thread_for(endpoint)?;
        io.post(Command::Unbind {
          socket_id: self.handle,
          endpoint: record.resolved,
        })
        .await
      }
    }
  }

  pub(crate) async fn disconnect(&self, endpoint: &str) -> Result<(), ZmqError> {
    let record = {
      let mut guard = self.state.lock();
      let st = &mut *guard;
      st.check_active()?;
      let record = st
        .connects
        .remove(endpoint)
        .ok_or_else(|| ZmqError::InvalidEndpoint(format!("{} is not connected", endpoint)))?;
      if let Some(pipe) = record.pipe_id.and_then(|id| st.pipes.remove(id)) {
        st.pattern.detach(pipe.id());
        pipe.close();
      }
      record
    };
    record.status.set_state(ConnectionState::Closed);
    if record.network {
      let io = self.io_thread_for(endpoint)?;
      io.post(Command::Disconnect {
        socket_id: self.handle,
        endpoint: endpoint.to_string(),
      })
      .await?;
    }
    Ok(())
  }

  // --- Sending ---

  /// Stages `msg`; returns the complete message once its final frame arrives.
  fn stage(&self, msg: Msg) -> Result<Option<Vec<Msg>>, ZmqError> {
    let mut st = self.state.lock();
    st.check_active()?;
    if msg.is_more() {
      st.send_buf.push(msg);
      return Ok(None);
    }
    let mut parts = std::mem::take(&mut st.send_buf);
    parts.push(msg);
    Ok(Some(parts))
  }

  /// Puts the leading frames back after a send that made no progress, so the
  /// final frame can be retried.
  fn unstage(&self, mut parts: Vec<Msg>) {
    parts.pop();
    let mut st = self.state.lock();
    if st.phase == Phase::Active {
      st.send_buf = parts;
    }
  }

  fn send_attempt(&self, parts: &[Msg]) -> Result<(), ZmqError> {
    let mut guard = self.state.lock();
    let st = &mut *guard;
    st.check_active()?;
    self.process_commands(st);
    st.pattern.send(&st.pipes, parts)
  }

  pub(crate) fn try_send(&self, msg: Msg) -> Result<(), ZmqError> {
    let Some(parts) = self.stage(msg)? else { return Ok(()) };
    let result = self.send_attempt(&parts);
    if matches!(result, Err(ZmqError::WouldBlock)) {
      self.unstage(parts);
    }
    result
  }

  /// Sends one frame, waiting per `wait` (SNDTIMEO when `None`).
  pub(crate) async fn send(&self, msg: Msg, wait: Option<Wait>) -> Result<(), ZmqError> {
    let wait = match wait {
      Some(w) => w,
      None => Wait::from_timeout(self.state.lock().options.sndtimeo),
    };
    let Some(parts) = self.stage(msg)? else { return Ok(()) };
    let result = self.send_parts(&parts, wait).await;
    if matches!(result, Err(ZmqError::WouldBlock | ZmqError::Timeout)) {
      self.unstage(parts);
    }
    result
  }

  async fn send_parts(&self, parts: &[Msg], wait: Wait) -> Result<(), ZmqError> {
    loop {
      let seen = self.signal.epoch();
      match self.send_attempt(parts) {
        Err(ZmqError::WouldBlock) => {}
        other => return other,
      }
      self.wait_for_progress(seen, wait).await?;
    }
  }

  // --- Receiving ---

  fn recv_attempt(&self) -> Result<Msg, ZmqError> {
    let mut guard = self.state.lock();
    let st = &mut *guard;
    st.check_active()?;
    if let Some(msg) = st.recv_buf.pop_front() {
      st.rcvmore = msg.is_more();
      return Ok(msg);
    }
    self.process_commands(st);
    loop {
      let mut parts = st.pattern.recv(&st.pipes)?;
      normalize_more_flags(&mut parts);
      let mut frames = parts.into_iter();
      if let Some(first) = frames.next() {
        st.recv_buf.extend(frames);
        st.rcvmore = first.is_more();
        return Ok(first);
      }
    }
  }

  pub(crate) fn try_recv(&self) -> Result<Msg, ZmqError> {
    self.recv_attempt()
  }

  /// Receives one frame, waiting per `wait` (RCVTIMEO when `None`).
  pub(crate) async fn recv(&self, wait: Option<Wait>) -> Result<Msg, ZmqError> {
    let wait = match wait {
      Some(w) => w,
      None => Wait::from_timeout(self.state.lock().options.rcvtimeo),
    };
    loop {
      let seen = self.signal.epoch();
      match self.recv_attempt() {
        Err(ZmqError::WouldBlock) => {}
        other => return other,
      }
      self.wait_for_progress(seen, wait).await?;
    }
  }

  async fn wait_for_progress(&self, seen: u64, wait: Wait) -> Result<(), ZmqError> {
    match wait {
      Wait::NoWait => Err(ZmqError::WouldBlock),
      Wait::Forever => {
        self.signal.changed_since(seen, None).await;
        Ok(())
      }
      Wait::Until(deadline) => {
        if self.signal.changed_since(seen, Some(deadline)).await {
          Ok(())
        } else {
          Err(ZmqError::Timeout)
        }
      }
    }
  }

  // --- Options ---

  pub(crate) fn set_option(&self, option: i32, value: &[u8]) -> Result<(), ZmqError> {
    let spec = option_spec(option).ok_or_else(|| ZmqError::UnknownOption(option.to_string()))?;
    if spec.access == OptionAccess::ReadOnly {
      return Err(ZmqError::InvalidOptionValue(option));
    }
    let value = options::validate(spec, value)?;

    let mut guard = self.state.lock();
    let st = &mut *guard;
    st.check_active()?;
    match spec.scope {
      OptionScope::Core => {
        st.options.apply(option, &value)?;
        if let Some(io) = &self.io_thread {
          if let Err(e) = io.try_post(Command::SetOption {
            socket_id: self.handle,
            option,
            value,
          }) {
            tracing::warn!(socket_handle = self.handle, option = spec.name, error = %e, "Option not forwarded to I/O thread");
          }
        }
      }
      OptionScope::Pattern => {
        self.process_commands(st);
        st.pattern.set_option(&st.pipes, option, &value)?;
      }
      OptionScope::State => return Err(ZmqError::InvalidOptionValue(option)),
    }
    tracing::debug!(socket_handle = self.handle, option = spec.name, "Option set");
    Ok(())
  }

  pub(crate) fn get_option(&self, option: i32) -> Result<Vec<u8>, ZmqError> {
    let spec = option_spec(option).ok_or_else(|| ZmqError::UnknownOption(option.to_string()))?;
    if spec.access == OptionAccess::WriteOnly {
      return Err(ZmqError::InvalidOptionValue(option));
    }
    let mut guard = self.state.lock();
    let st = &mut *guard;
    st.check_active()?;
    let value = match spec.scope {
      OptionScope::Core => st.options.read(option).ok_or(ZmqError::InvalidOptionValue(option))?,
      OptionScope::Pattern => st.pattern.get_option(option)?,
      OptionScope::State => match option {
        RCVMORE => OptionValue::Bool(st.rcvmore),
        EVENTS => OptionValue::Int(self.events_locked(st).bits() as i64),
        TYPE => OptionValue::Int(self.socket_type.as_byte() as i64),
        LAST_ENDPOINT => OptionValue::Bytes(st.last_endpoint.clone().into()),
        _ => return Err(ZmqError::InvalidOptionValue(option)),
      },
    };
    Ok(value.to_bytes())
  }

  // --- Readiness & monitoring ---

  fn events_locked(&self, st: &mut CoreState) -> PollEvents {
    self.process_commands(st);
    let mut events = PollEvents::empty();
    if !st.recv_buf.is_empty() || st.pattern.has_in(&st.pipes) {
      events |= PollEvents::POLLIN;
    }
    if st.pattern.has_out(&st.pipes) {
      events |= PollEvents::POLLOUT;
    }
    events
  }

  pub(crate) fn events(&self) -> Result<PollEvents, ZmqError> {
    let mut guard = self.state.lock();
    guard.check_active()?;
    Ok(self.events_locked(&mut guard))
  }

  pub(crate) fn monitor(&self, capacity: usize) -> Result<MonitorReceiver, ZmqError> {
    self.state.lock().check_active()?;
    Ok(self.monitor.attach(capacity))
  }

  pub(crate) fn connection_status(&self, endpoint: &str) -> Option<ConnectionStatus> {
    self.state.lock().connects.get(endpoint).map(|r| r.status.snapshot())
  }

  #[cfg(feature = "inproc")]
  pub(crate) fn inproc_peer(&self) -> Result<InprocPeer, ZmqError> {
    let st = self.state.lock();
    st.check_active()?;
    Ok(self.inproc_peer_locked(&st))
  }

  #[cfg(feature = "inproc")]
  fn inproc_peer_locked(&self, st: &CoreState) -> InprocPeer {
    InprocPeer {
      socket_type: self.socket_type,
      signal: self.signal.clone(),
      mailbox: self.mailbox_tx.clone(),
      sndhwm: st.options.sndhwm,
      conflate: st.options.conflate,
      routing_id: st.options.routing_id.clone(),
    }
  }

  // --- Lifecycle ---

  /// Closes the socket. Later calls fail with `SocketClosed`.
  pub(crate) fn close(&self) {
    self.shut(Phase::Closed);
  }

  /// Closes the socket on behalf of a terminating context. Later calls fail
  /// with `ContextTerminated`.
  pub(crate) fn terminate(&self) {
    self.shut(Phase::Terminated);
  }

  fn shut(&self, phase: Phase) {
    {
      let mut st = self.state.lock();
      if st.phase != Phase::Active {
        return;
      }
      st.phase = phase;
      for pipe in st.pipes.drain() {
        pipe.close();
      }
      st.mailbox_rx.close();
      while let MailboxRecv::Command(_) = st.mailbox_rx.try_recv() {}
      for record in st.connects.values() {
        record.status.set_state(ConnectionState::Closed);
      }
      st.send_buf.clear();
      st.recv_buf.clear();
    }
    tracing::debug!(socket_handle = self.handle, ?phase, "Socket closing");

    self.context.bus.publish(SystemEvent::SocketClosing { socket_id: self.handle });
    if let Some(io) = &self.io_thread {
      if let Err(e) = io.try_post(Command::CloseSocket { socket_id: self.handle }) {
        tracing::debug!(socket_handle = self.handle, error = %e, "CloseSocket not delivered");
      }
      io.release();
    }
    #[cfg(feature = "inproc")]
    self.context.inproc.remove_socket(self.handle);
    self.context.unregister_socket(self.handle);
    self.monitor.detach();
    self.signal.raise();
  }
}

impl Drop for SocketCore {
  fn drop(&mut self) {
    self.shut(Phase::Closed);
  }
}

impl fmt::Debug for SocketCore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SocketCore")
      .field("handle", &self.handle)
      .field("socket_type", &self.socket_type)
      .finish_non_exhaustive()
  }
}
