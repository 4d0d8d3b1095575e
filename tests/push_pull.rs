// tests/push_pull.rs

use std::time::Duration;
use zmq_engine::options::{CONFLATE, IMMEDIATE, LINGER, RCVTIMEO, RECONNECT_IVL, SNDHWM, SNDTIMEO};
use zmq_engine::{Msg, SocketEvent, SocketType, ZmqError};

mod common;
use common::{LONG_TIMEOUT, SHORT_TIMEOUT};

#[tokio::test]
async fn test_push_pull_tcp_basic() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let push = ctx.socket(SocketType::Push)?;
  let pull = ctx.socket(SocketType::Pull)?;

  let endpoint = common::bind_tcp_any(&pull).await?;
  push.connect(&endpoint).await?;

  push.send(Msg::from_static(b"Hello")).await?;
  let received = common::recv_timeout(&pull, LONG_TIMEOUT).await?;
  assert_eq!(received.data(), b"Hello");

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_push_pull_tcp_multiple_messages_keep_order() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let push = ctx.socket(SocketType::Push)?;
  let pull = ctx.socket(SocketType::Pull)?;

  let endpoint = common::bind_tcp_any(&pull).await?;
  push.connect(&endpoint).await?;

  for i in 0..50 {
    push.send(Msg::from(format!("msg-{}", i))).await?;
  }
  for i in 0..50 {
    let received = common::recv_timeout(&pull, LONG_TIMEOUT).await?;
    assert_eq!(received.data(), format!("msg-{}", i).as_bytes());
  }

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_push_pull_tcp_multipart() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let push = ctx.socket(SocketType::Push)?;
  let pull = ctx.socket(SocketType::Pull)?;

  let endpoint = common::bind_tcp_any(&pull).await?;
  push.connect(&endpoint).await?;

  push
    .send_multipart(vec![Msg::from("header"), Msg::new(), Msg::from("body")])
    .await?;
  let frames = common::recv_multipart_timeout(&pull, LONG_TIMEOUT).await?;
  assert_eq!(common::frames_as_strings(&frames), vec!["header", "", "body"]);
  assert!(!frames[2].is_more());

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_push_pull_tcp_connect_before_bind() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let push = ctx.socket(SocketType::Push)?;
  let pull = ctx.socket(SocketType::Pull)?;

  let endpoint = common::free_tcp_endpoint()?;

  push.connect(&endpoint).await?;
  // Queued on the connecter's pipe until the peer shows up.
  push.send(Msg::from_static(b"early bird")).await?;

  tokio::time::sleep(SHORT_TIMEOUT).await;
  pull.bind(&endpoint).await?;

  let received = common::recv_timeout(&pull, LONG_TIMEOUT).await?;
  assert_eq!(received.data(), b"early bird");

  ctx.term().await?;
  Ok(())
}

#[cfg(feature = "ipc")]
#[tokio::test]
async fn test_push_pull_ipc_basic() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let push = ctx.socket(SocketType::Push)?;
  let pull = ctx.socket(SocketType::Pull)?;

  let endpoint = common::unique_ipc_endpoint();
  pull.bind(&endpoint).await?;
  push.connect(&endpoint).await?;

  push.send(Msg::from_static(b"over ipc")).await?;
  let received = common::recv_timeout(&pull, LONG_TIMEOUT).await?;
  assert_eq!(received.data(), b"over ipc");

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_push_pull_inproc_basic() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let push = ctx.socket(SocketType::Push)?;
  let pull = ctx.socket(SocketType::Pull)?;

  let endpoint = common::unique_inproc_endpoint();
  pull.bind(&endpoint).await?;
  push.connect(&endpoint).await?;

  push.send_string("over inproc").await?;
  assert_eq!(pull.recv_string().await?, "over inproc");

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_push_pull_inproc_hello_bye_then_would_block() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let pull = ctx.socket(SocketType::Pull)?;
  let push = ctx.socket(SocketType::Push)?;

  let endpoint = common::unique_inproc_endpoint();
  pull.bind(&endpoint).await?;
  push.connect(&endpoint).await?;

  push.send_string("Hello").await?;
  push.send_string("Bye").await?;
  assert_eq!(pull.recv_string().await?, "Hello");
  assert_eq!(pull.recv_string().await?, "Bye");

  pull.set_option(RCVTIMEO, &common::int_option(0)).await?;
  assert!(matches!(pull.recv().await, Err(ZmqError::WouldBlock)));

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_push_round_robins_across_pullers() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let push = ctx.socket(SocketType::Push)?;
  let pull_a = ctx.socket(SocketType::Pull)?;
  let pull_b = ctx.socket(SocketType::Pull)?;

  let endpoint = common::unique_inproc_endpoint();
  push.bind(&endpoint).await?;
  pull_a.connect(&endpoint).await?;
  pull_b.connect(&endpoint).await?;

  for i in 0..4 {
    push.send(Msg::from(format!("task-{}", i))).await?;
  }

  let mut count_a = 0;
  while pull_a.try_recv()?.is_some() {
    count_a += 1;
  }
  let mut count_b = 0;
  while pull_b.try_recv()?.is_some() {
    count_b += 1;
  }
  assert_eq!(count_a, 2);
  assert_eq!(count_b, 2);

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_push_blocks_at_sndhwm() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let push = ctx.socket(SocketType::Push)?;
  let pull = ctx.socket(SocketType::Pull)?;

  push.set_option(SNDHWM, &common::int_option(2)).await?;
  let endpoint = common::unique_inproc_endpoint();
  pull.bind(&endpoint).await?;
  push.connect(&endpoint).await?;

  assert!(push.try_send(Msg::from("1"))?);
  assert!(push.try_send(Msg::from("2"))?);
  assert!(!push.try_send(Msg::from("3"))?);

  push.set_option(SNDTIMEO, &common::int_option(50)).await?;
  assert!(matches!(push.send(Msg::from("3")).await, Err(ZmqError::Timeout)));

  // Draining one frees a slot.
  assert_eq!(pull.recv().await?.data(), b"1");
  assert!(push.try_send(Msg::from("3"))?);

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_push_without_peers_would_block() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let push = ctx.socket(SocketType::Push)?;
  push.set_option(SNDTIMEO, &common::int_option(0)).await?;

  assert!(matches!(push.send(Msg::from("nobody")).await, Err(ZmqError::WouldBlock)));
  assert!(!push.try_send(Msg::from("nobody"))?);

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_pull_conflate_keeps_latest() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let push = ctx.socket(SocketType::Push)?;
  let pull = ctx.socket(SocketType::Pull)?;

  pull.set_option(CONFLATE, &common::int_option(1)).await?;
  let endpoint = common::unique_inproc_endpoint();
  pull.bind(&endpoint).await?;
  push.connect(&endpoint).await?;

  for i in 1..=3 {
    push.send(Msg::from(format!("{}", i))).await?;
  }
  assert_eq!(pull.recv().await?.data(), b"3");
  assert!(pull.try_recv()?.is_none());

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_push_cannot_recv_and_pull_cannot_send() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let push = ctx.socket(SocketType::Push)?;
  let pull = ctx.socket(SocketType::Pull)?;

  assert!(matches!(push.try_recv(), Err(ZmqError::InvalidSocketType(_))));
  assert!(matches!(pull.send(Msg::from("x")).await, Err(ZmqError::InvalidSocketType(_))));

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_many_inproc_connects_to_idle_puller() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let pull = ctx.socket(SocketType::Pull)?;
  let endpoint = common::unique_inproc_endpoint();
  pull.bind(&endpoint).await?;

  // The puller makes no calls while the pushers connect.
  let mut pushers = Vec::new();
  for i in 0..200 {
    let push = ctx.socket(SocketType::Push)?;
    push.connect(&endpoint).await?;
    push.send(Msg::from(format!("from-{}", i))).await?;
    pushers.push(push);
  }

  let mut received = 0;
  while pull.try_recv()?.is_some() {
    received += 1;
  }
  assert_eq!(received, 200);

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_push_queues_while_disconnected_and_delivers_after_reconnect() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let push = ctx.socket(SocketType::Push)?;
  let first = ctx.socket(SocketType::Pull)?;

  push.set_option(IMMEDIATE, &common::int_option(0)).await?;
  push.set_option(RECONNECT_IVL, &common::int_option(20)).await?;
  let push_monitor = push.monitor_default().await?;

  let endpoint = common::bind_tcp_any(&first).await?;
  push.connect(&endpoint).await?;
  push.send_string("before").await?;
  assert_eq!(common::recv_timeout(&first, LONG_TIMEOUT).await?.data(), b"before");

  first.close().await?;
  common::wait_for_monitor_event(&push_monitor, LONG_TIMEOUT, |e| {
    matches!(e, SocketEvent::Disconnected { .. })
  })
  .await
  .map_err(ZmqError::Internal)?;

  // Nobody is listening; the message waits in the connect pipe.
  push.send_string("while away").await?;

  let second = ctx.socket(SocketType::Pull)?;
  common::bind_with_retry(&second, &endpoint).await?;
  assert_eq!(common::recv_timeout(&second, LONG_TIMEOUT).await?.data(), b"while away");

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_close_with_zero_linger_discards_queued_messages() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let push = ctx.socket(SocketType::Push)?;
  let pull = ctx.socket(SocketType::Pull)?;

  push.set_option(LINGER, &common::int_option(0)).await?;
  push.set_option(RECONNECT_IVL, &common::int_option(20)).await?;
  let endpoint = common::free_tcp_endpoint()?;
  push.connect(&endpoint).await?;
  push.send_string("dropped").await?;
  push.close().await?;

  pull.bind(&endpoint).await?;
  assert!(matches!(
    common::recv_timeout(&pull, Duration::from_millis(300)).await,
    Err(ZmqError::Timeout)
  ));

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_close_with_linger_delivers_once_peer_appears() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let push = ctx.socket(SocketType::Push)?;
  let pull = ctx.socket(SocketType::Pull)?;

  push.set_option(LINGER, &common::int_option(2000)).await?;
  push.set_option(RECONNECT_IVL, &common::int_option(20)).await?;
  let endpoint = common::free_tcp_endpoint()?;
  push.connect(&endpoint).await?;
  push.send_string("kept").await?;
  push.close().await?;

  // The closed socket's connecter keeps dialing until the linger runs out.
  tokio::time::sleep(SHORT_TIMEOUT).await;
  pull.bind(&endpoint).await?;
  assert_eq!(common::recv_timeout(&pull, LONG_TIMEOUT).await?.data(), b"kept");

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_close_with_linger_flushes_connected_peer() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let push = ctx.socket(SocketType::Push)?;
  let pull = ctx.socket(SocketType::Pull)?;

  push.set_option(LINGER, &common::int_option(2000)).await?;
  let push_monitor = push.monitor_default().await?;
  let endpoint = common::bind_tcp_any(&pull).await?;
  push.connect(&endpoint).await?;
  common::wait_for_monitor_event(&push_monitor, LONG_TIMEOUT, |e| {
    matches!(e, SocketEvent::HandshakeSucceeded { .. })
  })
  .await
  .map_err(ZmqError::Internal)?;

  for i in 0..50 {
    push.send(Msg::from(format!("m{}", i))).await?;
  }
  push.close().await?;

  for i in 0..50 {
    let msg = common::recv_timeout(&pull, LONG_TIMEOUT).await?;
    assert_eq!(msg.data(), format!("m{}", i).as_bytes());
  }

  ctx.term().await?;
  Ok(())
}
