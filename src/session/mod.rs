// src/session/mod.rs

//! One established connection: handshake, then a pump between the byte
//! stream and a socket pipe.

use crate::error::ZmqError;
use crate::message::{normalize_more_flags, Blob, Msg};
use crate::protocol::greeting::{self, Greeting};
use crate::protocol::raw::RawCodec;
use crate::protocol::FrameCodec;
use crate::runtime::command::{Command, SocketLink};
use crate::runtime::pipe::{pipe_pair, Parts, Pipe, PipeRead, PipeWrite};
use crate::runtime::signal::Signal;
use crate::socket::events::SocketEvent;
use crate::socket::options::SocketOptions;
use crate::socket::SocketType;
use crate::transport::connecter::{ConnectionState, SharedStatus};
use crate::transport::BoxedStream;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_util::codec::{Decoder, Encoder, Framed};
use tokio_util::sync::CancellationToken;

/// Why a session ended.
#[derive(Debug)]
pub(crate) enum SessionEnd {
  /// The connection dropped or failed; the caller may reconnect.
  Disconnected(Option<ZmqError>),
  /// Stopped on request, or the socket let go of the pipe.
  Stopped,
  HandshakeFailed(ZmqError),
}

/// What the outbound drain found.
enum Outbound {
  Open,
  PipeClosed,
  /// A STREAM socket asked for the connection to be closed.
  CloseRequested,
  /// The socket closed its end; what is still queued follows the linger policy.
  Released,
}

pub(crate) struct Session {
  link: SocketLink,
  options: SocketOptions,
  /// Endpoint reported in events and attached to pipes.
  endpoint: String,
  /// Pipe created at connect time; `None` means a pipe is opened per connection.
  persistent: Option<(Pipe, Signal)>,
  cancel: CancellationToken,
  status: Option<SharedStatus>,
  /// The persistent pipe already served an earlier connection.
  resumed: bool,
}

impl Session {
  pub(crate) fn new(
    link: SocketLink,
    options: SocketOptions,
    endpoint: String,
    persistent: Option<(Pipe, Signal)>,
    cancel: CancellationToken,
    status: Option<SharedStatus>,
  ) -> Self {
    Self {
      link,
      options,
      endpoint,
      persistent,
      cancel,
      status,
      resumed: false,
    }
  }

  /// Marks the persistent pipe as carried over from an earlier connection, so
  /// the socket replays per-peer state to the new peer.
  pub(crate) fn resuming(mut self, resumed: bool) -> Self {
    self.resumed = resumed;
    self
  }

  /// Runs the session to completion and hands back the persistent pipe, if any.
  pub(crate) async fn run(mut self, stream: BoxedStream) -> (SessionEnd, Option<(Pipe, Signal)>) {
    let end = if self.link.socket_type == SocketType::Stream {
      self.established(Framed::new(stream, RawCodec), None).await
    } else {
      let mut framed = Framed::new(stream, FrameCodec::with_max_frame_size(self.options.max_msg_size));
      match self.handshake(&mut framed).await {
        Ok(Some(peer_identity)) => self.established(framed, peer_identity).await,
        Ok(None) => SessionEnd::Stopped,
        Err(e) => SessionEnd::HandshakeFailed(e),
      }
    };
    tracing::debug!(socket_id = self.link.socket_id, endpoint = %self.endpoint, ?end, "Session ended");
    (end, self.persistent.take())
  }

  /// Exchanges greetings. `Ok(None)` means the session was stopped first.
  async fn handshake(&self, framed: &mut Framed<BoxedStream, FrameCodec>) -> Result<Option<Option<Blob>>, ZmqError> {
    let ours = Greeting::new(self.link.socket_type, self.options.routing_id.clone());
    let result = tokio::select! {
      _ = self.cancel.cancelled() => return Ok(None),
      r = greeting::exchange(framed, &ours, self.options.handshake_ivl) => r,
    };
    match result {
      Ok(peer) => {
        tracing::debug!(
          socket_id = self.link.socket_id,
          endpoint = %self.endpoint,
          peer_type = ?peer.socket_type,
          "Handshake complete"
        );
        self.link.monitor.emit(SocketEvent::HandshakeSucceeded {
          endpoint: self.endpoint.clone(),
        });
        Ok(Some(peer.identity))
      }
      Err(e) => {
        tracing::warn!(socket_id = self.link.socket_id, endpoint = %self.endpoint, error = %e, "Handshake failed");
        self.link.monitor.emit(SocketEvent::HandshakeFailed {
          endpoint: self.endpoint.clone(),
          error_msg: e.to_string(),
        });
        Err(e)
      }
    }
  }

  async fn established<C>(&self, mut framed: Framed<BoxedStream, C>, peer_identity: Option<Blob>) -> SessionEnd
  where
    C: Decoder<Item = Msg, Error = ZmqError> + Encoder<Msg, Error = ZmqError>,
  {
    if let Some(status) = &self.status {
      status.set_state(ConnectionState::Connected);
    }
    let per_connection = match self.persistent {
      Some(_) => None,
      None => match self.open_pipe(peer_identity).await {
        Some(pipe) => Some(pipe),
        None => return SessionEnd::Stopped,
      },
    };
    let Some((pipe, signal)) = self.persistent.as_ref().or(per_connection.as_ref()) else {
      return SessionEnd::Stopped;
    };
    if self.resumed && per_connection.is_none() {
      if let Some(core) = self.link.core.upgrade() {
        core.pipe_resumed(pipe.id());
      }
    }
    let raw = self.link.socket_type == SocketType::Stream;
    let end = pump(&mut framed, pipe, signal, &self.cancel, self.options.linger, raw).await;

    if let Some((pipe, _)) = &per_connection {
      pipe.close();
      // The close already wakes the socket; the command is a hint for idle sockets.
      if let Err(e) = self.link.mailbox.try_post(Command::DetachPipe { pipe_id: pipe.id() }) {
        tracing::trace!(socket_id = self.link.socket_id, pipe_id = pipe.id(), error = %e, "DetachPipe not posted");
      }
    }
    end
  }

  /// Creates this connection's pipe and hands the socket its end.
  async fn open_pipe(&self, peer_identity: Option<Blob>) -> Option<(Pipe, Signal)> {
    let session_signal = Signal::new();
    let (mut socket_end, session_end) = pipe_pair(
      self.link.signal.clone(),
      session_signal.clone(),
      self.options.outbound_pipe(),
      self.options.inbound_pipe(),
      &self.endpoint,
    );
    socket_end.set_peer_identity(peer_identity);
    match self.link.mailbox.post(Command::AttachPipe { pipe: socket_end }).await {
      Ok(()) => Some((session_end, session_signal)),
      Err(e) => {
        tracing::debug!(socket_id = self.link.socket_id, error = %e, "Socket gone before pipe attach");
        None
      }
    }
  }
}

/// Moves messages between `framed` and `pipe` until either side ends.
async fn pump<C>(
  framed: &mut Framed<BoxedStream, C>,
  pipe: &Pipe,
  signal: &Signal,
  cancel: &CancellationToken,
  linger: Option<Duration>,
  raw: bool,
) -> SessionEnd
where
  C: Decoder<Item = Msg, Error = ZmqError> + Encoder<Msg, Error = ZmqError>,
{
  let mut assembling: Parts = Vec::new();
  // A complete inbound message the pipe had no room for.
  let mut stalled: Option<Parts> = None;

  loop {
    if pipe.is_write_closed() {
      return linger_flush(framed, pipe, linger, raw).await;
    }
    let seen = signal.epoch();

    if let Some(parts) = stalled.take() {
      match pipe.try_write(parts) {
        PipeWrite::Written => {}
        PipeWrite::Full(parts) => stalled = Some(parts),
        PipeWrite::Closed(_) => return SessionEnd::Stopped,
      }
    }

    let drained = tokio::select! {
      biased;
      _ = cancel.cancelled() => return linger_flush(framed, pipe, linger, raw).await,
      r = write_outbound(framed, pipe, raw, true) => r,
    };
    match drained {
      Ok(Outbound::Open) => {}
      Ok(Outbound::Released) => return linger_flush(framed, pipe, linger, raw).await,
      Ok(Outbound::PipeClosed) | Ok(Outbound::CloseRequested) => return SessionEnd::Stopped,
      Err(e) => return SessionEnd::Disconnected(Some(e)),
    }

    tokio::select! {
      biased;
      _ = cancel.cancelled() => return linger_flush(framed, pipe, linger, raw).await,
      _ = signal.changed_since(seen, None) => {}
      frame = framed.next(), if stalled.is_none() => match frame {
        Some(Ok(msg)) => {
          if msg.is_command() {
            tracing::trace!(size = msg.size(), "Ignoring command frame");
            continue;
          }
          let more = !raw && msg.is_more();
          assembling.push(msg);
          if !more {
            match pipe.try_write(std::mem::take(&mut assembling)) {
              PipeWrite::Written => {}
              PipeWrite::Full(parts) => stalled = Some(parts),
              PipeWrite::Closed(_) => return SessionEnd::Stopped,
            }
          }
        }
        Some(Err(e)) => return SessionEnd::Disconnected(Some(e)),
        None => return SessionEnd::Disconnected(None),
      },
    }
  }
}

/// Writes every queued outbound message, then flushes once. With
/// `stop_on_release` the drain stops as soon as the socket closes its end.
async fn write_outbound<C>(
  framed: &mut Framed<BoxedStream, C>,
  pipe: &Pipe,
  raw: bool,
  stop_on_release: bool,
) -> Result<Outbound, ZmqError>
where
  C: Encoder<Msg, Error = ZmqError>,
{
  let mut wrote = false;
  let state = loop {
    if stop_on_release && pipe.is_write_closed() {
      break Outbound::Released;
    }
    match pipe.try_read() {
      PipeRead::Message(mut parts) => {
        if raw && parts.iter().all(Msg::is_empty) {
          break Outbound::CloseRequested;
        }
        normalize_more_flags(&mut parts);
        for frame in parts {
          framed.feed(frame).await?;
        }
        wrote = true;
      }
      PipeRead::Empty => break Outbound::Open,
      PipeRead::Closed => break Outbound::PipeClosed,
    }
  };
  if wrote {
    framed.flush().await?;
  }
  Ok(state)
}

/// Gives queued outbound messages up to `linger` to reach the wire.
async fn linger_flush<C>(
  framed: &mut Framed<BoxedStream, C>,
  pipe: &Pipe,
  linger: Option<Duration>,
  raw: bool,
) -> SessionEnd
where
  C: Encoder<Msg, Error = ZmqError>,
{
  let flushed = match linger {
    Some(limit) if limit.is_zero() => {
      if pipe.has_pending() {
        tracing::debug!(endpoint = %pipe.endpoint(), "Discarding unsent messages, linger is zero");
      }
      return SessionEnd::Stopped;
    }
    Some(limit) => match tokio::time::timeout(limit, write_outbound(framed, pipe, raw, false)).await {
      Ok(result) => result,
      Err(_) => {
        tracing::debug!(endpoint = %pipe.endpoint(), "Linger expired with messages unsent");
        return SessionEnd::Stopped;
      }
    },
    None => write_outbound(framed, pipe, raw, false).await,
  };
  if let Err(e) = flushed {
    tracing::debug!(endpoint = %pipe.endpoint(), error = %e, "Flush on close failed");
  }
  SessionEnd::Stopped
}
