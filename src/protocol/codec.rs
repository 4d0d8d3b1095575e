// src/protocol/codec.rs

//! Frame codec: length-prefixed frames with a flags byte.
//!
//! ```text
//! payload < 255 : | len: u8 | flags: u8 | payload |
//! otherwise     : | 0xFF | len: u64 (BE) | flags: u8 | payload |
//! ```

use crate::error::ZmqError;
use crate::message::{Msg, MsgFlags};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Marker byte announcing an 8-byte length.
pub const LONG_LENGTH_MARKER: u8 = 0xFF;
/// Wire flag bit for `MsgFlags::MORE`.
pub const FLAG_MORE: u8 = 0x01;
/// Wire flag bit for `MsgFlags::COMMAND`.
pub const FLAG_COMMAND: u8 = 0x02;
const FLAG_RESERVED_MASK: u8 = !(FLAG_MORE | FLAG_COMMAND);

#[derive(Debug, Default, Clone, Copy)]
enum DecodingState {
  #[default]
  ReadLength,
  ReadFlags { size: usize },
  ReadBody { size: usize, flags: MsgFlags },
}

/// Encoder/decoder for the frame wire format.
///
/// Decoding is resumable: partial input leaves the codec in an intermediate
/// `DecodingState` and `Ok(None)` is returned until more bytes arrive.
#[derive(Debug, Default)]
pub struct FrameCodec {
  state: DecodingState,
  max_frame_size: Option<u64>,
}

impl FrameCodec {
  pub fn new() -> Self {
    Self::default()
  }

  /// A codec that rejects frames whose declared length exceeds `max`.
  pub fn with_max_frame_size(max: Option<u64>) -> Self {
    Self {
      state: DecodingState::ReadLength,
      max_frame_size: max,
    }
  }

  pub fn max_frame_size(&self) -> Option<u64> {
    self.max_frame_size
  }

  /// Returns true when the decoder sits between frames.
  pub fn is_idle(&self) -> bool {
    matches!(self.state, DecodingState::ReadLength)
  }

  /// Lazily decodes frames from `src`. The iterator ends when the buffer does
  /// not hold a complete frame; feeding more bytes and calling `frames` again
  /// resumes where it stopped.
  pub fn frames<'a>(&'a mut self, src: &'a mut BytesMut) -> Frames<'a> {
    Frames {
      codec: self,
      src,
      failed: false,
    }
  }

  fn check_size(&self, size: u64) -> Result<usize, ZmqError> {
    if let Some(max) = self.max_frame_size {
      if size > max {
        return Err(ZmqError::ProtocolViolation(format!(
          "frame of {} bytes exceeds maximum of {}",
          size, max
        )));
      }
    }
    usize::try_from(size)
      .map_err(|_| ZmqError::ProtocolViolation(format!("frame length {} does not fit in memory", size)))
  }
}

fn wire_flags(flags: MsgFlags) -> u8 {
  let mut byte = 0u8;
  if flags.contains(MsgFlags::MORE) {
    byte |= FLAG_MORE;
  }
  if flags.contains(MsgFlags::COMMAND) {
    byte |= FLAG_COMMAND;
  }
  byte
}

/// Writes the length prefix and flags byte for `item`.
fn put_header(item: &Msg, dst: &mut BytesMut) {
  let size = item.size();
  if size < LONG_LENGTH_MARKER as usize {
    dst.reserve(2 + size);
    dst.put_u8(size as u8);
  } else {
    dst.reserve(10 + size);
    dst.put_u8(LONG_LENGTH_MARKER);
    dst.put_u64(size as u64);
  }
  dst.put_u8(wire_flags(item.flags()));
}

/// Serialises a sequence of frames exactly as given.
pub fn encode_frames(frames: &[Msg]) -> BytesMut {
  let total: usize = frames.iter().map(|f| f.size() + 10).sum();
  let mut dst = BytesMut::with_capacity(total);
  for frame in frames {
    put_header(frame, &mut dst);
    dst.put_slice(frame.data());
  }
  dst
}

impl Encoder<Msg> for FrameCodec {
  type Error = ZmqError;

  fn encode(&mut self, item: Msg, dst: &mut BytesMut) -> Result<(), Self::Error> {
    put_header(&item, dst);
    dst.put_slice(item.data());
    Ok(())
  }
}

impl Decoder for FrameCodec {
  type Item = Msg;
  type Error = ZmqError;

  fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
    loop {
      match self.state {
        DecodingState::ReadLength => {
          if src.is_empty() {
            return Ok(None);
          }
          let size = if src[0] == LONG_LENGTH_MARKER {
            if src.len() < 9 {
              src.reserve(9 - src.len());
              return Ok(None);
            }
            src.advance(1);
            let declared = src.get_u64();
            if declared < LONG_LENGTH_MARKER as u64 {
              return Err(ZmqError::ProtocolViolation(format!(
                "long length prefix used for short frame ({} bytes)",
                declared
              )));
            }
            self.check_size(declared)?
          } else {
            let declared = src.get_u8() as u64;
            self.check_size(declared)?
          };
          self.state = DecodingState::ReadFlags { size };
        }

        DecodingState::ReadFlags { size } => {
          if src.is_empty() {
            return Ok(None);
          }
          let byte = src.get_u8();
          if byte & FLAG_RESERVED_MASK != 0 {
            self.state = DecodingState::ReadLength;
            return Err(ZmqError::ProtocolViolation(format!("reserved flag bits set: {:#04x}", byte)));
          }
          let mut flags = MsgFlags::empty();
          flags.set(MsgFlags::MORE, byte & FLAG_MORE != 0);
          flags.set(MsgFlags::COMMAND, byte & FLAG_COMMAND != 0);
          self.state = DecodingState::ReadBody { size, flags };
        }

        DecodingState::ReadBody { size, flags } => {
          if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
          }
          let body = src.split_to(size).freeze();
          self.state = DecodingState::ReadLength;
          let mut msg = Msg::from_bytes(body);
          msg.set_flags(flags);
          tracing::trace!(size, more = msg.is_more(), command = msg.is_command(), "Decoded frame");
          return Ok(Some(msg));
        }
      }
    }
  }
}

/// Iterator returned by [`FrameCodec::frames`].
pub struct Frames<'a> {
  codec: &'a mut FrameCodec,
  src: &'a mut BytesMut,
  failed: bool,
}

impl Iterator for Frames<'_> {
  type Item = Result<Msg, ZmqError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.failed {
      return None;
    }
    match self.codec.decode(self.src) {
      Ok(Some(msg)) => Some(Ok(msg)),
      Ok(None) => None,
      Err(e) => {
        self.failed = true;
        Some(Err(e))
      }
    }
  }
}
