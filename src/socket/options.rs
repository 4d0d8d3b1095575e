// src/socket/options.rs

//! Socket option identifiers, the option table and the parsed option state.
//!
//! Option values cross the API as raw bytes, laid out the way the C API lays
//! them out: native-endian `i32` for integers, booleans and millisecond
//! durations, native-endian `i64` for MAXMSGSIZE, raw bytes for identities and
//! topics.

use std::time::Duration;

use bytes::Bytes;

use crate::runtime::pipe::PipeConfig;
use crate::{Blob, ZmqError};

// Values consistent with libzmq.
pub const ROUTING_ID: i32 = 5; // a.k.a. ZMQ_IDENTITY
pub const IDENTITY: i32 = ROUTING_ID;
pub const SUBSCRIBE: i32 = 6;
pub const UNSUBSCRIBE: i32 = 7;
pub const RCVMORE: i32 = 13;
pub const EVENTS: i32 = 15;
pub const TYPE: i32 = 16;
pub const LINGER: i32 = 17;
pub const RECONNECT_IVL: i32 = 18;
pub const BACKLOG: i32 = 19;
pub const RECONNECT_IVL_MAX: i32 = 21;
pub const MAXMSGSIZE: i32 = 22;
pub const SNDHWM: i32 = 23;
pub const RCVHWM: i32 = 24;
pub const RCVTIMEO: i32 = 27;
pub const SNDTIMEO: i32 = 28;
pub const LAST_ENDPOINT: i32 = 32;
pub const ROUTER_MANDATORY: i32 = 33;
pub const TCP_KEEPALIVE: i32 = 34;
pub const TCP_KEEPALIVE_CNT: i32 = 35;
pub const TCP_KEEPALIVE_IDLE: i32 = 36;
pub const TCP_KEEPALIVE_INTVL: i32 = 37;
pub const IMMEDIATE: i32 = 39;
pub const XPUB_VERBOSE: i32 = 40;
pub const REQ_CORRELATE: i32 = 52;
pub const REQ_RELAXED: i32 = 53;
pub const CONFLATE: i32 = 54;
pub const ROUTER_HANDOVER: i32 = 56;
pub const HANDSHAKE_IVL: i32 = 66;
pub const XPUB_NODROP: i32 = 69;
pub const XPUB_WELCOME_MSG: i32 = 72;
pub const STREAM_NOTIFY: i32 = 73;
pub const INVERT_MATCHING: i32 = 74;
pub const CONNECT_TIMEOUT: i32 = 79;

/// Longest identity or welcome message accepted.
pub const MAX_IDENTITY_LEN: usize = 255;

/// How an option's raw bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
  /// `i32`, rejected below `min`.
  Int { min: i32 },
  /// `i64` (4-byte input is accepted too), -1 = unlimited.
  Int64,
  /// `i32` restricted to 0 or 1.
  Bool,
  /// `i32` milliseconds, -1 = infinite.
  Millis,
  /// Raw bytes up to `max_len`.
  Bytes { max_len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionAccess {
  ReadWrite,
  ReadOnly,
  WriteOnly,
}

/// Which part of a socket owns an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OptionScope {
  /// Stored in [`SocketOptions`] and mirrored to the socket's I/O thread.
  Core,
  /// Interpreted by the socket kind's pattern logic.
  Pattern,
  /// Derived from live socket state.
  State,
}

/// One row of the option table.
#[derive(Debug, Clone, Copy)]
pub struct OptionSpec {
  pub id: i32,
  pub name: &'static str,
  pub kind: OptionKind,
  pub access: OptionAccess,
  pub(crate) scope: OptionScope,
}

const fn spec(id: i32, name: &'static str, kind: OptionKind, access: OptionAccess, scope: OptionScope) -> OptionSpec {
  OptionSpec {
    id,
    name,
    kind,
    access,
    scope,
  }
}

use OptionAccess::{ReadOnly, ReadWrite, WriteOnly};
use OptionKind::{Bool, Int, Int64, Millis};
use OptionScope::{Core, Pattern, State};

const IDENTITY_BYTES: OptionKind = OptionKind::Bytes {
  max_len: MAX_IDENTITY_LEN,
};
const TOPIC_BYTES: OptionKind = OptionKind::Bytes { max_len: usize::MAX };

static OPTION_TABLE: &[OptionSpec] = &[
  spec(ROUTING_ID, "ROUTING_ID", IDENTITY_BYTES, ReadWrite, Core),
  spec(SUBSCRIBE, "SUBSCRIBE", TOPIC_BYTES, WriteOnly, Pattern),
  spec(UNSUBSCRIBE, "UNSUBSCRIBE", TOPIC_BYTES, WriteOnly, Pattern),
  spec(RCVMORE, "RCVMORE", Bool, ReadOnly, State),
  spec(EVENTS, "EVENTS", Int { min: 0 }, ReadOnly, State),
  spec(TYPE, "TYPE", Int { min: 0 }, ReadOnly, State),
  spec(LINGER, "LINGER", Millis, ReadWrite, Core),
  spec(RECONNECT_IVL, "RECONNECT_IVL", Millis, ReadWrite, Core),
  spec(BACKLOG, "BACKLOG", Int { min: 0 }, ReadWrite, Core),
  spec(RECONNECT_IVL_MAX, "RECONNECT_IVL_MAX", Int { min: 0 }, ReadWrite, Core),
  spec(MAXMSGSIZE, "MAXMSGSIZE", Int64, ReadWrite, Core),
  spec(SNDHWM, "SNDHWM", Int { min: 0 }, ReadWrite, Core),
  spec(RCVHWM, "RCVHWM", Int { min: 0 }, ReadWrite, Core),
  spec(RCVTIMEO, "RCVTIMEO", Millis, ReadWrite, Core),
  spec(SNDTIMEO, "SNDTIMEO", Millis, ReadWrite, Core),
  spec(LAST_ENDPOINT, "LAST_ENDPOINT", TOPIC_BYTES, ReadOnly, State),
  spec(ROUTER_MANDATORY, "ROUTER_MANDATORY", Bool, WriteOnly, Pattern),
  spec(TCP_KEEPALIVE, "TCP_KEEPALIVE", Int { min: -1 }, ReadWrite, Core),
  spec(TCP_KEEPALIVE_CNT, "TCP_KEEPALIVE_CNT", Int { min: -1 }, ReadWrite, Core),
  spec(TCP_KEEPALIVE_IDLE, "TCP_KEEPALIVE_IDLE", Int { min: -1 }, ReadWrite, Core),
  spec(TCP_KEEPALIVE_INTVL, "TCP_KEEPALIVE_INTVL", Int { min: -1 }, ReadWrite, Core),
  spec(IMMEDIATE, "IMMEDIATE", Bool, ReadWrite, Core),
  spec(XPUB_VERBOSE, "XPUB_VERBOSE", Bool, WriteOnly, Pattern),
  spec(REQ_CORRELATE, "REQ_CORRELATE", Bool, WriteOnly, Pattern),
  spec(REQ_RELAXED, "REQ_RELAXED", Bool, WriteOnly, Pattern),
  spec(CONFLATE, "CONFLATE", Bool, ReadWrite, Core),
  spec(ROUTER_HANDOVER, "ROUTER_HANDOVER", Bool, WriteOnly, Pattern),
  spec(HANDSHAKE_IVL, "HANDSHAKE_IVL", Int { min: 0 }, ReadWrite, Core),
  spec(XPUB_NODROP, "XPUB_NODROP", Bool, WriteOnly, Pattern),
  spec(XPUB_WELCOME_MSG, "XPUB_WELCOME_MSG", IDENTITY_BYTES, WriteOnly, Pattern),
  spec(STREAM_NOTIFY, "STREAM_NOTIFY", Bool, WriteOnly, Pattern),
  spec(INVERT_MATCHING, "INVERT_MATCHING", Bool, ReadWrite, Pattern),
  spec(CONNECT_TIMEOUT, "CONNECT_TIMEOUT", Int { min: 0 }, ReadWrite, Core),
];

/// Looks up the table row for an option id.
pub fn option_spec(id: i32) -> Option<&'static OptionSpec> {
  OPTION_TABLE.iter().find(|s| s.id == id)
}

/// Resolves an option name (`"SNDHWM"`, `"sndhwm"`, `"ZMQ_SNDHWM"`; `"IDENTITY"` is an
/// alias of `"ROUTING_ID"`) to its id.
pub fn option_id(name: &str) -> Option<i32> {
  let upper = name.trim().to_ascii_uppercase();
  let bare = upper.strip_prefix("ZMQ_").unwrap_or(&upper);
  if bare == "IDENTITY" {
    return Some(IDENTITY);
  }
  OPTION_TABLE.iter().find(|s| s.name == bare).map(|s| s.id)
}

pub fn option_name(id: i32) -> Option<&'static str> {
  option_spec(id).map(|s| s.name)
}

/// A validated option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
  Int(i64),
  /// 64-bit integer, always encoded as 8 bytes.
  Long(i64),
  Bool(bool),
  Millis(Option<Duration>),
  Bytes(Bytes),
}

impl OptionValue {
  /// Encodes the value in the raw layout used by `get_option`.
  pub fn to_bytes(&self) -> Vec<u8> {
    match self {
      OptionValue::Int(v) => (*v as i32).to_ne_bytes().to_vec(),
      OptionValue::Long(v) => v.to_ne_bytes().to_vec(),
      OptionValue::Bool(b) => (*b as i32).to_ne_bytes().to_vec(),
      OptionValue::Millis(None) => (-1i32).to_ne_bytes().to_vec(),
      OptionValue::Millis(Some(d)) => (d.as_millis().min(i32::MAX as u128) as i32).to_ne_bytes().to_vec(),
      OptionValue::Bytes(b) => b.to_vec(),
    }
  }

  pub(crate) fn as_bool(&self) -> bool {
    matches!(self, OptionValue::Bool(true)) || matches!(self, OptionValue::Int(v) if *v != 0)
  }

  pub(crate) fn as_bytes(&self) -> Bytes {
    match self {
      OptionValue::Bytes(b) => b.clone(),
      other => Bytes::from(other.to_bytes()),
    }
  }
}

/// Checks raw bytes against the option table and parses them.
pub(crate) fn validate(spec: &OptionSpec, raw: &[u8]) -> Result<OptionValue, ZmqError> {
  let id = spec.id;
  let value = match spec.kind {
    OptionKind::Int { min } => {
      let v = parse_i32_option(raw, id)?;
      if v < min {
        return Err(ZmqError::InvalidOptionValue(id));
      }
      OptionValue::Int(v as i64)
    }
    OptionKind::Int64 => {
      let v = parse_i64_option(raw, id)?;
      if v < -1 {
        return Err(ZmqError::InvalidOptionValue(id));
      }
      OptionValue::Long(v)
    }
    OptionKind::Bool => OptionValue::Bool(parse_bool_option(raw, id)?),
    OptionKind::Millis => OptionValue::Millis(parse_duration_ms_option(raw, id)?),
    OptionKind::Bytes { max_len } => {
      if raw.len() > max_len {
        return Err(ZmqError::InvalidOptionValue(id));
      }
      OptionValue::Bytes(Bytes::copy_from_slice(raw))
    }
  };
  Ok(value)
}

/// Parsed per-socket configuration.
#[derive(Debug, Clone)]
pub(crate) struct SocketOptions {
  pub sndhwm: usize,
  pub rcvhwm: usize,
  /// `None` blocks indefinitely.
  pub sndtimeo: Option<Duration>,
  pub rcvtimeo: Option<Duration>,
  /// `None` lingers indefinitely.
  pub linger: Option<Duration>,
  pub routing_id: Option<Blob>,
  /// `None` disables reconnection.
  pub reconnect_ivl: Option<Duration>,
  /// Zero keeps the interval fixed.
  pub reconnect_ivl_max: Duration,
  pub backlog: u32,
  pub max_msg_size: Option<u64>,
  /// -1 leaves the OS setting, 0 disables, 1 enables.
  pub tcp_keepalive: i32,
  pub tcp_keepalive_cnt: i32,
  pub tcp_keepalive_idle: i32,
  pub tcp_keepalive_intvl: i32,
  pub immediate: bool,
  pub conflate: bool,
  /// `None` waits for the peer's greeting indefinitely.
  pub handshake_ivl: Option<Duration>,
  /// `None` leaves the OS connect timeout.
  pub connect_timeout: Option<Duration>,
}

impl Default for SocketOptions {
  fn default() -> Self {
    Self {
      sndhwm: 1000,
      rcvhwm: 1000,
      sndtimeo: None,
      rcvtimeo: None,
      linger: Some(Duration::ZERO),
      routing_id: None,
      reconnect_ivl: Some(Duration::from_millis(100)),
      reconnect_ivl_max: Duration::ZERO,
      backlog: 100,
      max_msg_size: None,
      tcp_keepalive: -1,
      tcp_keepalive_cnt: -1,
      tcp_keepalive_idle: -1,
      tcp_keepalive_intvl: -1,
      immediate: false,
      conflate: false,
      handshake_ivl: Some(Duration::from_secs(30)),
      connect_timeout: None,
    }
  }
}

fn non_zero_millis(v: i64) -> Option<Duration> {
  (v > 0).then(|| Duration::from_millis(v as u64))
}

impl SocketOptions {
  /// Stores a validated core-scope option.
  pub(crate) fn apply(&mut self, id: i32, value: &OptionValue) -> Result<(), ZmqError> {
    match (id, value) {
      (SNDHWM, OptionValue::Int(v)) => self.sndhwm = *v as usize,
      (RCVHWM, OptionValue::Int(v)) => self.rcvhwm = *v as usize,
      (SNDTIMEO, OptionValue::Millis(d)) => self.sndtimeo = *d,
      (RCVTIMEO, OptionValue::Millis(d)) => self.rcvtimeo = *d,
      (LINGER, OptionValue::Millis(d)) => self.linger = *d,
      (ROUTING_ID, OptionValue::Bytes(b)) => {
        self.routing_id = (!b.is_empty()).then(|| Blob::from_bytes(b.clone()));
      }
      (RECONNECT_IVL, OptionValue::Millis(d)) => self.reconnect_ivl = *d,
      (RECONNECT_IVL_MAX, OptionValue::Int(v)) => self.reconnect_ivl_max = Duration::from_millis(*v as u64),
      (BACKLOG, OptionValue::Int(v)) => self.backlog = (*v).min(u32::MAX as i64) as u32,
      (MAXMSGSIZE, OptionValue::Long(v)) => self.max_msg_size = u64::try_from(*v).ok(),
      (TCP_KEEPALIVE, OptionValue::Int(v)) => {
        if *v > 1 {
          return Err(ZmqError::InvalidOptionValue(id));
        }
        self.tcp_keepalive = *v as i32;
      }
      (TCP_KEEPALIVE_CNT, OptionValue::Int(v)) => self.tcp_keepalive_cnt = *v as i32,
      (TCP_KEEPALIVE_IDLE, OptionValue::Int(v)) => self.tcp_keepalive_idle = *v as i32,
      (TCP_KEEPALIVE_INTVL, OptionValue::Int(v)) => self.tcp_keepalive_intvl = *v as i32,
      (IMMEDIATE, OptionValue::Bool(b)) => self.immediate = *b,
      (CONFLATE, OptionValue::Bool(b)) => self.conflate = *b,
      (HANDSHAKE_IVL, OptionValue::Int(v)) => self.handshake_ivl = non_zero_millis(*v),
      (CONNECT_TIMEOUT, OptionValue::Int(v)) => self.connect_timeout = non_zero_millis(*v),
      _ => return Err(ZmqError::InvalidOptionValue(id)),
    }
    Ok(())
  }

  /// Reads back a core-scope option.
  pub(crate) fn read(&self, id: i32) -> Option<OptionValue> {
    let millis = |d: Option<Duration>| d.map_or(0, |d| d.as_millis() as i64);
    let value = match id {
      SNDHWM => OptionValue::Int(self.sndhwm as i64),
      RCVHWM => OptionValue::Int(self.rcvhwm as i64),
      SNDTIMEO => OptionValue::Millis(self.sndtimeo),
      RCVTIMEO => OptionValue::Millis(self.rcvtimeo),
      LINGER => OptionValue::Millis(self.linger),
      ROUTING_ID => OptionValue::Bytes(self.routing_id.as_ref().map(Blob::to_bytes).unwrap_or_default()),
      RECONNECT_IVL => OptionValue::Millis(self.reconnect_ivl),
      RECONNECT_IVL_MAX => OptionValue::Int(self.reconnect_ivl_max.as_millis() as i64),
      BACKLOG => OptionValue::Int(self.backlog as i64),
      MAXMSGSIZE => OptionValue::Long(self.max_msg_size.map_or(-1, |v| v.min(i64::MAX as u64) as i64)),
      TCP_KEEPALIVE => OptionValue::Int(self.tcp_keepalive as i64),
      TCP_KEEPALIVE_CNT => OptionValue::Int(self.tcp_keepalive_cnt as i64),
      TCP_KEEPALIVE_IDLE => OptionValue::Int(self.tcp_keepalive_idle as i64),
      TCP_KEEPALIVE_INTVL => OptionValue::Int(self.tcp_keepalive_intvl as i64),
      IMMEDIATE => OptionValue::Bool(self.immediate),
      CONFLATE => OptionValue::Bool(self.conflate),
      HANDSHAKE_IVL => OptionValue::Int(millis(self.handshake_ivl)),
      CONNECT_TIMEOUT => OptionValue::Int(millis(self.connect_timeout)),
      _ => return None,
    };
    Some(value)
  }

  /// Sizing for messages this socket writes toward a peer.
  pub(crate) fn outbound_pipe(&self) -> PipeConfig {
    PipeConfig::new(self.sndhwm, self.conflate)
  }

  /// Sizing for messages a peer writes toward this socket.
  pub(crate) fn inbound_pipe(&self) -> PipeConfig {
    PipeConfig::new(self.rcvhwm, self.conflate)
  }
}

// --- Helper functions for parsing option values ---

/// Parses a native-endian `i32` option value.
pub(crate) fn parse_i32_option(value: &[u8], id: i32) -> Result<i32, ZmqError> {
  let arr: [u8; 4] = value.try_into().map_err(|_| ZmqError::InvalidOptionValue(id))?;
  Ok(i32::from_ne_bytes(arr))
}

/// Parses an `i64` option value; a 4-byte `i32` is widened.
pub(crate) fn parse_i64_option(value: &[u8], id: i32) -> Result<i64, ZmqError> {
  match value.len() {
    8 => {
      let arr: [u8; 8] = value.try_into().map_err(|_| ZmqError::InvalidOptionValue(id))?;
      Ok(i64::from_ne_bytes(arr))
    }
    4 => parse_i32_option(value, id).map(i64::from),
    _ => Err(ZmqError::InvalidOptionValue(id)),
  }
}

/// Parses a boolean option (0 or 1).
pub(crate) fn parse_bool_option(value: &[u8], id: i32) -> Result<bool, ZmqError> {
  match parse_i32_option(value, id)? {
    0 => Ok(false),
    1 => Ok(true),
    _ => Err(ZmqError::InvalidOptionValue(id)),
  }
}

/// Parses a millisecond duration where -1 means infinite.
pub(crate) fn parse_duration_ms_option(value: &[u8], id: i32) -> Result<Option<Duration>, ZmqError> {
  match parse_i32_option(value, id)? {
    -1 => Ok(None),
    v @ 0.. => Ok(Some(Duration::from_millis(v as u64))),
    _ => Err(ZmqError::InvalidOptionValue(id)),
  }
}
