// tests/options.rs

use std::time::Duration;
use zmq_engine::options::{
  EVENTS, LINGER, RCVHWM, RCVMORE, RCVTIMEO, ROUTING_ID, SNDHWM, SNDTIMEO, SUBSCRIBE, TYPE, XPUB_VERBOSE,
};
use zmq_engine::{Msg, PollEvents, SocketType, ZmqError};

mod common;
use common::{int_option, read_int_option};

#[tokio::test]
async fn test_int_options_round_trip() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let socket = ctx.socket(SocketType::Dealer)?;

  assert_eq!(read_int_option(&socket.get_option(SNDHWM).await?), 1000);
  socket.set_option(SNDHWM, &int_option(50)).await?;
  socket.set_option(RCVHWM, &int_option(0)).await?;
  socket.set_option(LINGER, &int_option(-1)).await?;
  assert_eq!(read_int_option(&socket.get_option(SNDHWM).await?), 50);
  assert_eq!(read_int_option(&socket.get_option(RCVHWM).await?), 0);
  assert_eq!(read_int_option(&socket.get_option(LINGER).await?), -1);

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_options_by_name() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let socket = ctx.socket(SocketType::Dealer)?;

  socket.set_option_by_name("sndhwm", &int_option(7)).await?;
  assert_eq!(read_int_option(&socket.get_option_by_name("ZMQ_SNDHWM").await?), 7);
  socket.set_option_by_name("IDENTITY", b"me").await?;
  assert_eq!(socket.get_option(ROUTING_ID).await?, b"me".to_vec());

  let result = socket.set_option_by_name("NOT_AN_OPTION", &int_option(1)).await;
  assert!(matches!(result, Err(ZmqError::UnknownOption(_))));

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_unknown_and_invalid_values() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let socket = ctx.socket(SocketType::Dealer)?;

  assert!(matches!(socket.set_option(9999, &int_option(1)).await, Err(ZmqError::UnknownOption(_))));
  assert!(matches!(socket.get_option(9999).await, Err(ZmqError::UnknownOption(_))));
  assert!(matches!(
    socket.set_option(SNDHWM, &int_option(-5)).await,
    Err(ZmqError::InvalidOptionValue(SNDHWM))
  ));
  assert!(matches!(
    socket.set_option(SNDHWM, &[1, 2]).await,
    Err(ZmqError::InvalidOptionValue(SNDHWM))
  ));
  assert!(matches!(
    socket.set_option(ROUTING_ID, &[7u8; 256]).await,
    Err(ZmqError::InvalidOptionValue(ROUTING_ID))
  ));

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_access_modes_are_enforced() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let sub = ctx.socket(SocketType::Sub)?;

  assert!(matches!(
    sub.set_option(RCVMORE, &int_option(1)).await,
    Err(ZmqError::InvalidOptionValue(RCVMORE))
  ));
  assert!(matches!(
    sub.get_option(SUBSCRIBE).await,
    Err(ZmqError::InvalidOptionValue(SUBSCRIBE))
  ));

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_pattern_options_need_matching_socket_type() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let push = ctx.socket(SocketType::Push)?;

  assert!(matches!(push.subscribe(b"x").await, Err(ZmqError::UnsupportedOption(SUBSCRIBE))));
  assert!(matches!(
    push.set_option(XPUB_VERBOSE, &int_option(1)).await,
    Err(ZmqError::UnsupportedOption(XPUB_VERBOSE))
  ));

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_type_option_reports_socket_type() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  for socket_type in [SocketType::Req, SocketType::Router, SocketType::XPub, SocketType::Stream] {
    let socket = ctx.socket(socket_type)?;
    assert_eq!(
      read_int_option(&socket.get_option(TYPE).await?),
      socket_type.as_byte() as i32
    );
  }
  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_timeouts_default_to_blocking() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let pull = ctx.socket(SocketType::Pull)?;
  let push = ctx.socket(SocketType::Push)?;

  assert_eq!(read_int_option(&pull.get_option(RCVTIMEO).await?), -1);
  assert_eq!(read_int_option(&push.get_option(SNDTIMEO).await?), -1);

  // Neither call returns on its own: no peer, no message.
  assert!(tokio::time::timeout(Duration::from_millis(100), pull.recv()).await.is_err());
  assert!(tokio::time::timeout(Duration::from_millis(100), push.send(Msg::from("x"))).await.is_err());

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_rcvtimeo_zero_and_positive() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let pull = ctx.socket(SocketType::Pull)?;

  pull.set_option(RCVTIMEO, &int_option(0)).await?;
  assert!(matches!(pull.recv().await, Err(ZmqError::WouldBlock)));

  pull.set_option(RCVTIMEO, &int_option(50)).await?;
  let started = tokio::time::Instant::now();
  assert!(matches!(pull.recv().await, Err(ZmqError::Timeout)));
  assert!(started.elapsed() >= Duration::from_millis(40));

  assert!(pull.try_recv()?.is_none());

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_rcvmore_and_events_track_the_current_message() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let push = ctx.socket(SocketType::Push)?;
  let pull = ctx.socket(SocketType::Pull)?;

  let endpoint = common::unique_inproc_endpoint();
  pull.bind(&endpoint).await?;
  push.connect(&endpoint).await?;

  let events = PollEvents::from_bits_truncate(read_int_option(&pull.get_option(EVENTS).await?) as i16);
  assert!(!events.contains(PollEvents::POLLIN));

  push.send_multipart(vec![Msg::from("one"), Msg::from("two")]).await?;

  let events = PollEvents::from_bits_truncate(read_int_option(&pull.get_option(EVENTS).await?) as i16);
  assert!(events.contains(PollEvents::POLLIN));
  assert!(push.events()?.contains(PollEvents::POLLOUT));

  let first = pull.recv().await?;
  assert!(first.is_more());
  assert_eq!(read_int_option(&pull.get_option(RCVMORE).await?), 1);
  let second = pull.recv().await?;
  assert!(!second.is_more());
  assert_eq!(read_int_option(&pull.get_option(RCVMORE).await?), 0);

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_set_option_after_close_fails() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let socket = ctx.socket(SocketType::Dealer)?;
  socket.close().await?;

  assert!(matches!(
    socket.set_option(SNDHWM, &int_option(1)).await,
    Err(ZmqError::SocketClosed)
  ));

  ctx.term().await?;
  Ok(())
}
