// src/message/mod.rs

pub mod blob;
pub mod flags;
pub mod msg;

pub use blob::Blob;
pub use flags::MsgFlags;
pub use msg::Msg;

pub(crate) use msg::normalize_more_flags;
