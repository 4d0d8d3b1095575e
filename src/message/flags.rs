// src/message/flags.rs

use bitflags::bitflags;

bitflags! {
  /// Per-frame flags. The bit values are the ones carried in the wire flags byte.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
  pub struct MsgFlags: u8 {
    /// More frames of the same message follow this one.
    const MORE = 0b01;
    /// Connection-level control frame (handshake), never delivered to users.
    const COMMAND = 0b10;
  }
}
