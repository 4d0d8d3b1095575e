// src/protocol/greeting.rs

//! Connection handshake. Each side sends one COMMAND frame:
//!
//! ```text
//! | 0xFF 'Z' 'E' 0x7F | version: u8 | socket type: u8 | id len: u8 | identity |
//! ```

use crate::error::ZmqError;
use crate::message::{Blob, Msg, MsgFlags};
use crate::protocol::codec::FrameCodec;
use crate::socket::SocketType;
use bytes::{BufMut, BytesMut};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

pub const SIGNATURE: [u8; 4] = [0xFF, b'Z', b'E', 0x7F];
pub const PROTOCOL_VERSION: u8 = 1;
const FIXED_LEN: usize = SIGNATURE.len() + 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
  pub version: u8,
  pub socket_type: SocketType,
  pub identity: Option<Blob>,
}

impl Greeting {
  pub fn new(socket_type: SocketType, identity: Option<Blob>) -> Self {
    Self {
      version: PROTOCOL_VERSION,
      socket_type,
      identity,
    }
  }

  pub fn to_msg(&self) -> Msg {
    let id = self.identity.as_deref().unwrap_or(&[]);
    let id_len = id.len().min(u8::MAX as usize);
    let mut buf = BytesMut::with_capacity(FIXED_LEN + id_len);
    buf.put_slice(&SIGNATURE);
    buf.put_u8(self.version);
    buf.put_u8(self.socket_type.as_byte());
    buf.put_u8(id_len as u8);
    buf.put_slice(&id[..id_len]);
    let mut msg = Msg::from_bytes(buf.freeze());
    msg.set_flags(MsgFlags::COMMAND);
    msg
  }

  pub fn from_msg(msg: &Msg) -> Result<Self, ZmqError> {
    if !msg.is_command() || msg.is_more() {
      return Err(ZmqError::ProtocolViolation("expected a single greeting command frame".into()));
    }
    let data = msg.data();
    if data.len() < FIXED_LEN || data[..SIGNATURE.len()] != SIGNATURE {
      return Err(ZmqError::ProtocolViolation("bad greeting signature".into()));
    }
    let version = data[4];
    if version != PROTOCOL_VERSION {
      return Err(ZmqError::ProtocolViolation(format!("unsupported protocol version {}", version)));
    }
    let socket_type = SocketType::from_byte(data[5])
      .ok_or_else(|| ZmqError::ProtocolViolation(format!("unknown peer socket type {}", data[5])))?;
    let id_len = data[6] as usize;
    if data.len() != FIXED_LEN + id_len {
      return Err(ZmqError::ProtocolViolation("greeting identity length mismatch".into()));
    }
    let identity = (id_len > 0).then(|| Blob::from(msg.data_bytes().slice(FIXED_LEN..)));
    Ok(Self {
      version,
      socket_type,
      identity,
    })
  }
}

/// Sends our greeting and waits for the peer's, bounded by `deadline`.
pub async fn exchange<S>(
  framed: &mut Framed<S, FrameCodec>,
  ours: &Greeting,
  deadline: Option<Duration>,
) -> Result<Greeting, ZmqError>
where
  S: AsyncRead + AsyncWrite + Unpin,
{
  let handshake = async {
    framed.send(ours.to_msg()).await?;
    match framed.next().await {
      Some(Ok(frame)) => Greeting::from_msg(&frame),
      Some(Err(e)) => Err(e),
      None => Err(ZmqError::ConnectionClosed),
    }
  };
  let peer = match deadline {
    Some(limit) => tokio::time::timeout(limit, handshake)
      .await
      .map_err(|_| ZmqError::Timeout)??,
    None => handshake.await?,
  };
  if !ours.socket_type.is_compatible(peer.socket_type) {
    return Err(ZmqError::ProtocolViolation(format!(
      "incompatible socket types {:?} and {:?}",
      ours.socket_type, peer.socket_type
    )));
  }
  Ok(peer)
}
