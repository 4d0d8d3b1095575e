// src/runtime/io_thread.rs

//! Background I/O threads. Each owns a current-thread tokio runtime on which
//! the listeners, connecters and sessions of its sockets run.

use crate::error::ZmqError;
use crate::runtime::command::{Command, SocketLink};
use crate::runtime::event_bus::{wait_for_stop, SystemEvent};
use crate::runtime::mailbox::{mailbox, MailboxReceiver, MailboxRecv, MailboxSender, DEFAULT_MAILBOX_CAPACITY};
use crate::socket::events::SocketEvent;
use crate::socket::options::SocketOptions;
use crate::transport::connecter::Connecter;
use crate::transport::endpoint::Endpoint;
use crate::transport::{self, listener};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// How often an idle I/O thread prunes finished endpoint tasks.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to one I/O thread.
#[derive(Debug)]
pub(crate) struct IoThread {
  id: usize,
  mailbox: MailboxSender,
  /// Sockets currently assigned to this thread.
  load: AtomicUsize,
  done: Mutex<Option<oneshot::Receiver<()>>>,
  thread: Mutex<Option<JoinHandle<()>>>,
}

impl IoThread {
  /// Starts thread `zmq-io-{id}`.
  pub(crate) fn spawn(id: usize) -> Result<Arc<Self>, ZmqError> {
    let (tx, rx) = mailbox(DEFAULT_MAILBOX_CAPACITY);
    let (done_tx, done_rx) = oneshot::channel();
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let thread = std::thread::Builder::new()
      .name(format!("zmq-io-{}", id))
      .spawn(move || {
        runtime.block_on(IoLoop::new(id, rx).run());
        drop(runtime);
        let _ = done_tx.send(());
      })?;
    tracing::debug!(io_thread = id, "I/O thread started");
    Ok(Arc::new(Self {
      id,
      mailbox: tx,
      load: AtomicUsize::new(0),
      done: Mutex::new(Some(done_rx)),
      thread: Mutex::new(Some(thread)),
    }))
  }

  pub(crate) fn id(&self) -> usize {
    self.id
  }

  pub(crate) fn load(&self) -> usize {
    self.load.load(Ordering::Relaxed)
  }

  pub(crate) fn acquire(&self) {
    self.load.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn release(&self) {
    let _ = self
      .load
      .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
  }

  pub(crate) async fn post(&self, cmd: Command) -> Result<(), ZmqError> {
    self.mailbox.post(cmd).await
  }

  pub(crate) fn try_post(&self, cmd: Command) -> Result<(), ZmqError> {
    self.mailbox.try_post(cmd)
  }

  /// Stops the thread after its tasks finish and joins it.
  pub(crate) async fn terminate(&self) {
    if let Err(e) = self.mailbox.post(Command::Terminate).await {
      tracing::debug!(io_thread = self.id, error = %e, "I/O thread already stopped");
    }
    let done = self.done.lock().take();
    if let Some(done) = done {
      let _ = done.await;
    }
    let handle = self.thread.lock().take();
    if let Some(handle) = handle {
      // `done` fires as the thread body returns, so this join does not block the executor.
      if handle.join().is_err() {
        tracing::error!(io_thread = self.id, "I/O thread panicked");
      }
    }
    tracing::debug!(io_thread = self.id, "I/O thread terminated");
  }

  /// Asks the thread to stop without waiting for it.
  pub(crate) fn shutdown_nowait(&self) {
    let _ = self.mailbox.try_post(Command::Terminate);
  }
}

/// Endpoint tasks owned by one socket.
#[derive(Debug)]
struct SocketEntry {
  /// This thread's copy of the socket's options.
  options: Arc<RwLock<SocketOptions>>,
  listeners: HashMap<String, CancellationToken>,
  connecters: HashMap<String, CancellationToken>,
}

impl SocketEntry {
  fn cancel_all(&mut self) {
    for (_, token) in self.listeners.drain().chain(self.connecters.drain()) {
      token.cancel();
    }
  }
}

struct IoLoop {
  id: usize,
  mailbox: MailboxReceiver,
  sockets: HashMap<usize, SocketEntry>,
  tracker: TaskTracker,
}

impl IoLoop {
  fn new(id: usize, mailbox: MailboxReceiver) -> Self {
    Self {
      id,
      mailbox,
      sockets: HashMap::new(),
      tracker: TaskTracker::new(),
    }
  }

  async fn run(mut self) {
    loop {
      match self.mailbox.recv_timeout(Some(HOUSEKEEPING_INTERVAL)).await {
        MailboxRecv::Command(Command::Terminate) => break,
        MailboxRecv::Command(cmd) => self.handle(cmd).await,
        MailboxRecv::Empty => self.housekeeping(),
        MailboxRecv::Closed => break,
      }
    }
    self.shutdown().await;
  }

  async fn handle(&mut self, cmd: Command) {
    let command = cmd.variant_name();
    tracing::trace!(io_thread = self.id, command, "Processing command");
    match cmd {
      Command::Bind {
        link,
        endpoint,
        options,
        stop_rx,
        reply_tx,
      } => self.bind(link, endpoint, options, stop_rx, reply_tx).await,
      Command::Connect {
        link,
        endpoint,
        options,
        stop_rx,
        pipe,
        status,
      } => {
        let uri = endpoint.uri();
        let socket_id = link.socket_id;
        let token = CancellationToken::new();
        self.watch_stop(stop_rx, socket_id, token.clone());
        let entry = self.entry(socket_id, options);
        if let Some(previous) = entry.connecters.insert(uri, token.clone()) {
          previous.cancel();
        }
        let connecter = Connecter {
          link,
          endpoint,
          options: entry.options.clone(),
          pipe,
          status,
          cancel: token,
        };
        self.tracker.spawn(connecter.run());
      }
      Command::Unbind { socket_id, endpoint } => {
        match self.sockets.get_mut(&socket_id).and_then(|e| e.listeners.remove(&endpoint)) {
          Some(token) => token.cancel(),
          None => tracing::debug!(io_thread = self.id, socket_id, %endpoint, "Unbind for unknown listener"),
        }
      }
      Command::Disconnect { socket_id, endpoint } => {
        match self.sockets.get_mut(&socket_id).and_then(|e| e.connecters.remove(&endpoint)) {
          Some(token) => token.cancel(),
          None => tracing::debug!(io_thread = self.id, socket_id, %endpoint, "Disconnect for unknown connecter"),
        }
      }
      Command::SetOption {
        socket_id,
        option,
        value,
      } => {
        if let Some(entry) = self.sockets.get(&socket_id) {
          if let Err(e) = entry.options.write().apply(option, &value) {
            tracing::warn!(io_thread = self.id, socket_id, option, error = %e, "Failed to mirror option");
          }
        }
      }
      Command::CloseSocket { socket_id } => {
        if let Some(mut entry) = self.sockets.remove(&socket_id) {
          entry.cancel_all();
          tracing::debug!(io_thread = self.id, socket_id, "Socket tasks cancelled");
        }
      }
      Command::Terminate | Command::AttachPipe { .. } | Command::DetachPipe { .. } => {
        tracing::warn!(io_thread = self.id, command, "Unexpected command for I/O thread");
      }
    }
  }

  async fn bind(
    &mut self,
    link: SocketLink,
    endpoint: Endpoint,
    options: SocketOptions,
    stop_rx: broadcast::Receiver<SystemEvent>,
    reply_tx: oneshot::Sender<Result<String, ZmqError>>,
  ) {
    let socket_id = link.socket_id;
    let acceptor = match transport::listen(&endpoint, &options).await {
      Ok(acceptor) => acceptor,
      Err(e) => {
        tracing::debug!(io_thread = self.id, socket_id, endpoint = %endpoint.uri(), error = %e, "Bind failed");
        link.monitor.emit(SocketEvent::BindFailed {
          endpoint: endpoint.uri(),
          error_msg: e.to_string(),
        });
        let _ = reply_tx.send(Err(e));
        return;
      }
    };
    let uri = acceptor.local_uri();
    link.monitor.emit(SocketEvent::Listening { endpoint: uri.clone() });

    let token = CancellationToken::new();
    self.watch_stop(stop_rx, socket_id, token.clone());
    let entry = self.entry(socket_id, options);
    entry.listeners.insert(uri.clone(), token.clone());
    let options = entry.options.clone();
    self
      .tracker
      .spawn(listener::run_listener(acceptor, link, options, token, self.tracker.clone()));
    if reply_tx.send(Ok(uri)).is_err() {
      tracing::debug!(io_thread = self.id, socket_id, "Bind caller went away");
    }
  }

  fn entry(&mut self, socket_id: usize, options: SocketOptions) -> &mut SocketEntry {
    self.sockets.entry(socket_id).or_insert_with(|| SocketEntry {
      options: Arc::new(RwLock::new(options)),
      listeners: HashMap::new(),
      connecters: HashMap::new(),
    })
  }

  /// Cancels `token` when the bus announces the socket's (or context's) end.
  fn watch_stop(&self, mut stop_rx: broadcast::Receiver<SystemEvent>, socket_id: usize, token: CancellationToken) {
    self.tracker.spawn(async move {
      tokio::select! {
        _ = wait_for_stop(&mut stop_rx, socket_id) => token.cancel(),
        _ = token.cancelled() => {}
      }
    });
  }

  fn housekeeping(&mut self) {
    for entry in self.sockets.values_mut() {
      entry.listeners.retain(|_, t| !t.is_cancelled());
      entry.connecters.retain(|_, t| !t.is_cancelled());
    }
  }

  async fn shutdown(mut self) {
    for entry in self.sockets.values_mut() {
      entry.cancel_all();
    }
    self.mailbox.close();
    self.tracker.close();
    tracing::debug!(io_thread = self.id, tasks = self.tracker.len(), "Waiting for I/O tasks");
    self.tracker.wait().await;
  }
}
