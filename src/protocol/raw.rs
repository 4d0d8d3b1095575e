// src/protocol/raw.rs

//! Unframed byte codec used by STREAM sockets: each read chunk becomes one
//! frame and outbound frames are written without any header.

use crate::error::ZmqError;
use crate::message::Msg;
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug, Default)]
pub struct RawCodec;

impl Encoder<Msg> for RawCodec {
  type Error = ZmqError;

  fn encode(&mut self, item: Msg, dst: &mut BytesMut) -> Result<(), Self::Error> {
    dst.reserve(item.size());
    dst.put_slice(item.data());
    Ok(())
  }
}

impl Decoder for RawCodec {
  type Item = Msg;
  type Error = ZmqError;

  fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
    if src.is_empty() {
      return Ok(None);
    }
    Ok(Some(Msg::from_bytes(src.split().freeze())))
  }
}
