// tests/common.rs
#![allow(dead_code)]

use zmq_engine::options::{LAST_ENDPOINT, RCVTIMEO};
use zmq_engine::{Context, ContextConfig, Msg, MonitorReceiver, Socket, SocketEvent, ZmqError};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use std::time::Duration;

use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

static IPC_ENDPOINT_COUNTER: AtomicUsize = AtomicUsize::new(0);
static INPROC_ENDPOINT_COUNTER: AtomicUsize = AtomicUsize::new(0);

static TRACING_INIT: Once = Once::new();

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(100);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(5);

fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    // Overridable with RUST_LOG.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("zmq_engine=debug,warn"));
    let _ = tracing_subscriber::fmt()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_test_writer()
      .try_init();
  });
}

pub fn test_context() -> Context {
  setup_tracing();
  Context::new().expect("Failed to create test context")
}

/// A context with no I/O threads (inproc only).
pub fn inproc_only_context() -> Context {
  setup_tracing();
  Context::with_config(ContextConfig {
    io_threads: 0,
    ..ContextConfig::default()
  })
  .expect("Failed to create inproc-only context")
}

pub fn unique_ipc_endpoint() -> String {
  let pid = std::process::id();
  let count = IPC_ENDPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
  format!("ipc:///tmp/zmq_engine_test_{}_{}", pid, count)
}

pub fn unique_inproc_endpoint() -> String {
  let pid = std::process::id();
  let count = INPROC_ENDPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
  format!("inproc://zmq_engine_test_{}_{}", pid, count)
}

/// Binds to an OS-chosen loopback port and returns the resolved endpoint.
pub async fn bind_tcp_any(socket: &Socket) -> Result<String, ZmqError> {
  socket.bind("tcp://127.0.0.1:*").await?;
  let raw = socket.get_option(LAST_ENDPOINT).await?;
  String::from_utf8(raw).map_err(|_| ZmqError::Internal("LAST_ENDPOINT is not UTF-8".into()))
}

/// A loopback endpoint with nothing listening on it.
pub fn free_tcp_endpoint() -> Result<String, ZmqError> {
  let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
  let port = listener.local_addr()?.port();
  Ok(format!("tcp://127.0.0.1:{}", port))
}

/// Binds `endpoint`, retrying while a previous owner still holds the address.
pub async fn bind_with_retry(socket: &Socket, endpoint: &str) -> Result<(), ZmqError> {
  let deadline = tokio::time::Instant::now() + LONG_TIMEOUT;
  loop {
    match socket.bind(endpoint).await {
      Err(ZmqError::AddrInUse(_)) if tokio::time::Instant::now() < deadline => {
        tokio::time::sleep(Duration::from_millis(20)).await;
      }
      other => return other,
    }
  }
}

pub async fn set_rcvtimeo(socket: &Socket, duration: Duration) -> Result<(), ZmqError> {
  socket
    .set_option(RCVTIMEO, &(duration.as_millis() as i32).to_ne_bytes())
    .await
}

pub fn int_option(value: i32) -> [u8; 4] {
  value.to_ne_bytes()
}

pub fn read_int_option(raw: &[u8]) -> i32 {
  i32::from_ne_bytes(raw.try_into().expect("option is not 4 bytes"))
}

pub async fn recv_timeout(socket: &Socket, duration: Duration) -> Result<Msg, ZmqError> {
  match timeout(duration, socket.recv()).await {
    Ok(result) => result,
    Err(_) => Err(ZmqError::Timeout),
  }
}

pub async fn recv_multipart_timeout(socket: &Socket, duration: Duration) -> Result<Vec<Msg>, ZmqError> {
  match timeout(duration, socket.recv_multipart()).await {
    Ok(result) => result,
    Err(_) => Err(ZmqError::Timeout),
  }
}

pub async fn send_timeout(socket: &Socket, msg: Msg, duration: Duration) -> Result<(), ZmqError> {
  match timeout(duration, socket.send(msg)).await {
    Ok(result) => result,
    Err(_) => Err(ZmqError::Timeout),
  }
}

pub fn frames_as_strings(frames: &[Msg]) -> Vec<String> {
  frames
    .iter()
    .map(|f| String::from_utf8_lossy(f.data()).into_owned())
    .collect()
}

/// Waits for the first monitor event accepted by `check_event`.
pub async fn wait_for_monitor_event(
  monitor_rx: &MonitorReceiver,
  overall: Duration,
  check_event: impl Fn(&SocketEvent) -> bool,
) -> Result<SocketEvent, String> {
  let deadline = tokio::time::Instant::now() + overall;
  loop {
    match tokio::time::timeout_at(deadline, monitor_rx.recv()).await {
      Ok(Ok(event)) => {
        if check_event(&event) {
          return Ok(event);
        }
      }
      Ok(Err(_)) => return Err("Monitor channel closed unexpectedly".to_string()),
      Err(_) => return Err(format!("Timeout waiting for monitor event after {:?}", overall)),
    }
  }
}
