// src/message/msg.rs

use crate::message::flags::MsgFlags;
use bytes::Bytes;
use std::fmt;

/// A single message frame.
///
/// The payload is a reference-counted `Bytes`, so cloning a `Msg` (for
/// fan-out to several pipes, for example) never copies the data.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Msg {
  data: Bytes,
  flags: MsgFlags,
}

impl Msg {
  /// Creates an empty frame.
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a frame from a `Vec<u8>`, taking ownership.
  pub fn from_vec(data: Vec<u8>) -> Self {
    Self {
      data: Bytes::from(data),
      flags: MsgFlags::empty(),
    }
  }

  /// Creates a frame from `bytes::Bytes`.
  pub fn from_bytes(data: Bytes) -> Self {
    Self {
      data,
      flags: MsgFlags::empty(),
    }
  }

  /// Creates a frame from a static byte slice (zero-copy).
  pub fn from_static(data: &'static [u8]) -> Self {
    Self {
      data: Bytes::from_static(data),
      flags: MsgFlags::empty(),
    }
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }

  pub fn size(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn flags(&self) -> MsgFlags {
    self.flags
  }

  pub fn set_flags(&mut self, flags: MsgFlags) {
    self.flags = flags;
  }

  /// Sets or clears the `MORE` flag.
  pub fn set_more(&mut self, more: bool) {
    self.flags.set(MsgFlags::MORE, more);
  }

  /// Builder-style variant of [`Msg::set_more`].
  pub fn with_more(mut self, more: bool) -> Self {
    self.set_more(more);
    self
  }

  pub fn is_more(&self) -> bool {
    self.flags.contains(MsgFlags::MORE)
  }

  pub fn is_command(&self) -> bool {
    self.flags.contains(MsgFlags::COMMAND)
  }

  /// Returns a cheap clone of the payload.
  pub fn data_bytes(&self) -> Bytes {
    self.data.clone()
  }

  pub fn into_bytes(self) -> Bytes {
    self.data
  }

  /// Interprets the payload as UTF-8.
  pub fn as_str(&self) -> Option<&str> {
    std::str::from_utf8(&self.data).ok()
  }
}

impl From<Vec<u8>> for Msg {
  fn from(data: Vec<u8>) -> Self {
    Msg::from_vec(data)
  }
}

impl From<Bytes> for Msg {
  fn from(data: Bytes) -> Self {
    Msg::from_bytes(data)
  }
}

impl From<&str> for Msg {
  fn from(s: &str) -> Self {
    Msg::from_vec(s.as_bytes().to_vec())
  }
}

impl From<String> for Msg {
  fn from(s: String) -> Self {
    Msg::from_vec(s.into_bytes())
  }
}

impl fmt::Debug for Msg {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Msg")
      .field("size", &self.size())
      .field("flags", &self.flags)
      .finish()
  }
}

/// Rewrites the `MORE` flags of a complete message so that every frame but
/// the last carries it.
pub(crate) fn normalize_more_flags(parts: &mut [Msg]) {
  let last = parts.len().saturating_sub(1);
  for (i, part) in parts.iter_mut().enumerate() {
    part.set_more(i < last);
  }
}
