// src/transport/listener.rs

use crate::runtime::command::SocketLink;
use crate::session::{Session, SessionEnd};
use crate::socket::events::SocketEvent;
use crate::socket::options::SocketOptions;
use crate::transport::Acceptor;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Pause after an accept error so a persistent failure (e.g. EMFILE) does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts connections on a bound endpoint and runs one session per
/// connection until cancelled.
pub(crate) async fn run_listener(
  mut acceptor: Box<dyn Acceptor>,
  link: SocketLink,
  options: Arc<RwLock<SocketOptions>>,
  cancel: CancellationToken,
  tracker: TaskTracker,
) {
  let endpoint = acceptor.local_uri();
  let socket_id = link.socket_id;
  tracing::debug!(socket_id, %endpoint, "Listener started");

  loop {
    let accepted = tokio::select! {
      biased;
      _ = cancel.cancelled() => break,
      accepted = acceptor.accept() => accepted,
    };
    match accepted {
      Ok((stream, peer_addr)) => {
        tracing::debug!(socket_id, %endpoint, %peer_addr, "Accepted connection");
        link.monitor.emit(SocketEvent::Accepted {
          endpoint: endpoint.clone(),
          peer_addr: peer_addr.clone(),
        });
        let session = Session::new(
          link.clone(),
          options.read().clone(),
          endpoint.clone(),
          None,
          cancel.child_token(),
          None,
        );
        let monitor = link.monitor.clone();
        let session_endpoint = endpoint.clone();
        tracker.spawn(async move {
          let (end, _) = session.run(stream).await;
          if let SessionEnd::Disconnected(error) = end {
            tracing::debug!(socket_id, endpoint = %session_endpoint, %peer_addr, error = ?error, "Peer disconnected");
            monitor.emit(SocketEvent::Disconnected {
              endpoint: session_endpoint,
            });
          }
        });
      }
      Err(e) => {
        tracing::warn!(socket_id, %endpoint, error = %e, "Accept failed");
        link.monitor.emit(SocketEvent::AcceptFailed {
          endpoint: endpoint.clone(),
          error_msg: e.to_string(),
        });
        tokio::select! {
          _ = cancel.cancelled() => break,
          _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
        }
      }
    }
  }

  // Dropping the acceptor releases the address (and unlinks an ipc path).
  drop(acceptor);
  tracing::debug!(socket_id, %endpoint, "Listener stopped");
  link.monitor.emit(SocketEvent::Closed { endpoint });
}
