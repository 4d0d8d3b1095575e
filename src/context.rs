// src/context.rs

use crate::error::ZmqError;
use crate::runtime::event_bus::{EventBus, SystemEvent};
use crate::runtime::io_thread::IoThread;
use crate::socket::core::SocketCore;
use crate::socket::{Socket, SocketType};
#[cfg(feature = "inproc")]
use crate::transport::inproc::InprocRegistry;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Default limit on live sockets per context.
pub const DEFAULT_MAX_SOCKETS: usize = 1023;
/// Default number of background I/O threads.
pub const DEFAULT_IO_THREADS: usize = 1;

/// Per-context settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextConfig {
  /// Background I/O threads. Zero restricts the context to inproc endpoints.
  pub io_threads: usize,
  pub max_sockets: usize,
}

impl Default for ContextConfig {
  fn default() -> Self {
    Self {
      io_threads: DEFAULT_IO_THREADS,
      max_sockets: DEFAULT_MAX_SOCKETS,
    }
  }
}

/// Holds the internal state shared by multiple Context handles.
pub(crate) struct ContextInner {
  config: ContextConfig,
  next_handle: AtomicUsize,
  /// Live sockets. Weak so that dropping the last `Socket` closes it.
  sockets: Mutex<HashMap<usize, Weak<SocketCore>>>,
  io_threads: Vec<Arc<IoThread>>,
  pub(crate) bus: EventBus,
  #[cfg(feature = "inproc")]
  pub(crate) inproc: InprocRegistry,
  terminating: AtomicBool,
}

impl ContextInner {
  fn new(config: ContextConfig) -> Result<Self, ZmqError> {
    let io_threads = (0..config.io_threads)
      .map(IoThread::spawn)
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self {
      config,
      next_handle: AtomicUsize::new(1),
      sockets: Mutex::new(HashMap::new()),
      io_threads,
      bus: EventBus::new(),
      #[cfg(feature = "inproc")]
      inproc: InprocRegistry::default(),
      terminating: AtomicBool::new(false),
    })
  }

  fn least_loaded_io_thread(&self) -> Option<Arc<IoThread>> {
    self.io_threads.iter().min_by_key(|t| t.load()).cloned()
  }

  /// Forgets a socket that has closed.
  pub(crate) fn unregister_socket(&self, handle: usize) {
    if self.sockets.lock().remove(&handle).is_some() {
      tracing::debug!(socket_handle = handle, "Socket unregistered");
    }
  }

  /// Closes every live socket and tells all I/O tasks to stop. Does not wait.
  fn begin_shutdown(&self) -> bool {
    if self.terminating.swap(true, Ordering::AcqRel) {
      return false;
    }
    tracing::info!("Context shutdown initiated");
    let live: Vec<Arc<SocketCore>> = self.sockets.lock().values().filter_map(Weak::upgrade).collect();
    tracing::debug!(sockets = live.len(), "Closing live sockets");
    for core in &live {
      core.terminate();
    }
    drop(live);
    self.bus.publish(SystemEvent::ContextTerminating);
    true
  }
}

impl Drop for ContextInner {
  fn drop(&mut self) {
    for io in &self.io_threads {
      io.shutdown_nowait();
    }
  }
}

impl fmt::Debug for ContextInner {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ContextInner")
      .field("config", &self.config)
      .field("io_threads", &self.io_threads.len())
      .field("terminating", &self.terminating.load(Ordering::Relaxed))
      .finish_non_exhaustive()
  }
}

/// A handle to a messaging context, managing sockets and I/O threads.
/// Contexts are cloneable and thread-safe.
///
/// Sockets keep their context's state alive, so the I/O threads run until
/// [`Context::term`] is called or every context handle and socket is gone.
#[derive(Clone)]
pub struct Context {
  inner: Arc<ContextInner>,
}

impl Context {
  /// Creates a context with one I/O thread.
  pub fn new() -> Result<Self, ZmqError> {
    Self::with_config(ContextConfig::default())
  }

  pub fn with_io_threads(io_threads: usize) -> Result<Self, ZmqError> {
    Self::with_config(ContextConfig {
      io_threads,
      ..ContextConfig::default()
    })
  }

  pub fn with_config(config: ContextConfig) -> Result<Self, ZmqError> {
    tracing::debug!(io_threads = config.io_threads, max_sockets = config.max_sockets, "Creating context");
    Ok(Self {
      inner: Arc::new(ContextInner::new(config)?),
    })
  }

  pub fn config(&self) -> ContextConfig {
    self.inner.config
  }

  /// Creates a socket of the specified type associated with this context.
  pub fn socket(&self, socket_type: SocketType) -> Result<Socket, ZmqError> {
    if self.inner.terminating.load(Ordering::Acquire) {
      return Err(ZmqError::ContextTerminated);
    }
    let mut sockets = self.inner.sockets.lock();
    sockets.retain(|_, core| core.strong_count() > 0);
    if sockets.len() >= self.inner.config.max_sockets {
      tracing::warn!(max_sockets = self.inner.config.max_sockets, "Socket limit reached");
      return Err(ZmqError::ResourceLimitReached("maximum number of sockets"));
    }
    let handle = self.inner.next_handle.fetch_add(1, Ordering::Relaxed);
    let io_thread = self.inner.least_loaded_io_thread();
    if let Some(io) = &io_thread {
      io.acquire();
    }
    let core = SocketCore::new(handle, socket_type, self.inner.clone(), io_thread);
    sockets.insert(handle, Arc::downgrade(&core));
    Ok(Socket::new(core))
  }

  /// Closes all sockets and asks the I/O threads to stop. Returns immediately.
  pub async fn shutdown(&self) -> Result<(), ZmqError> {
    self.inner.begin_shutdown();
    for io in &self.inner.io_threads {
      io.shutdown_nowait();
    }
    Ok(())
  }

  /// Closes all sockets and waits for the I/O threads to finish (sessions
  /// flush per LINGER) and exit. Later socket calls fail with
  /// `ContextTerminated`.
  pub async fn term(self) -> Result<(), ZmqError> {
    self.inner.begin_shutdown();
    for io in &self.inner.io_threads {
      io.terminate().await;
    }
    tracing::info!("Context terminated");
    Ok(())
  }
}

impl fmt::Debug for Context {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Context")
      .field("io_threads", &self.inner.io_threads.len())
      .finish_non_exhaustive()
  }
}

/// Creates a new library context.
pub fn context() -> Result<Context, ZmqError> {
  Context::new()
}
