// src/protocol/mod.rs

pub mod codec;
pub mod greeting;
pub mod raw;

pub use codec::{encode_frames, FrameCodec};
pub use greeting::Greeting;
