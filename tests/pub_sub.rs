// tests/pub_sub.rs

use std::time::Duration;
use zmq_engine::options::{
  IMMEDIATE, INVERT_MATCHING, RECONNECT_IVL, SNDHWM, SNDTIMEO, XPUB_NODROP, XPUB_VERBOSE, XPUB_WELCOME_MSG,
};
use zmq_engine::{Msg, SocketEvent, SocketType, ZmqError};

mod common;
use common::{LONG_TIMEOUT, SHORT_TIMEOUT};

#[tokio::test]
async fn test_pub_sub_inproc_prefix_filtering() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let publisher = ctx.socket(SocketType::Pub)?;
  let subscriber = ctx.socket(SocketType::Sub)?;

  let endpoint = common::unique_inproc_endpoint();
  publisher.bind(&endpoint).await?;
  subscriber.connect(&endpoint).await?;
  subscriber.subscribe(b"weather").await?;

  publisher.send_string("weather sunny").await?;
  publisher.send_string("sports result").await?;
  publisher.send_string("weather rain").await?;

  assert_eq!(subscriber.recv_string().await?, "weather sunny");
  assert_eq!(subscriber.recv_string().await?, "weather rain");
  assert!(subscriber.try_recv()?.is_none());

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_sub_without_subscription_receives_nothing() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let publisher = ctx.socket(SocketType::Pub)?;
  let subscriber = ctx.socket(SocketType::Sub)?;

  let endpoint = common::unique_inproc_endpoint();
  publisher.bind(&endpoint).await?;
  subscriber.connect(&endpoint).await?;

  publisher.send_string("anything").await?;
  common::set_rcvtimeo(&subscriber, SHORT_TIMEOUT).await?;
  assert!(matches!(subscriber.recv().await, Err(ZmqError::Timeout)));

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_sub_empty_topic_matches_everything() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let publisher = ctx.socket(SocketType::Pub)?;
  let subscriber = ctx.socket(SocketType::Sub)?;

  let endpoint = common::unique_inproc_endpoint();
  publisher.bind(&endpoint).await?;
  subscriber.connect(&endpoint).await?;
  subscriber.subscribe(b"").await?;

  publisher.send_string("a").await?;
  publisher.send_string("b").await?;
  assert_eq!(subscriber.recv_string().await?, "a");
  assert_eq!(subscriber.recv_string().await?, "b");

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_sub_unsubscribe_stops_delivery() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let publisher = ctx.socket(SocketType::Pub)?;
  let subscriber = ctx.socket(SocketType::Sub)?;

  let endpoint = common::unique_inproc_endpoint();
  publisher.bind(&endpoint).await?;
  subscriber.connect(&endpoint).await?;
  subscriber.subscribe(b"news").await?;

  publisher.send_string("news 1").await?;
  assert_eq!(subscriber.recv_string().await?, "news 1");

  subscriber.unsubscribe(b"news").await?;
  publisher.send_string("news 2").await?;
  common::set_rcvtimeo(&subscriber, SHORT_TIMEOUT).await?;
  assert!(matches!(subscriber.recv().await, Err(ZmqError::Timeout)));

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_sub_invert_matching() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let publisher = ctx.socket(SocketType::Pub)?;
  let subscriber = ctx.socket(SocketType::Sub)?;

  subscriber.set_option(INVERT_MATCHING, &common::int_option(1)).await?;
  let endpoint = common::unique_inproc_endpoint();
  publisher.bind(&endpoint).await?;
  subscriber.connect(&endpoint).await?;
  subscriber.subscribe(b"noise").await?;

  publisher.send_string("noise ignored").await?;
  publisher.send_string("signal kept").await?;
  assert_eq!(subscriber.recv_string().await?, "signal kept");

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_pub_sub_tcp_with_slow_joiner() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let publisher = ctx.socket(SocketType::Pub)?;
  let subscriber = ctx.socket(SocketType::Sub)?;

  let endpoint = common::bind_tcp_any(&publisher).await?;
  subscriber.connect(&endpoint).await?;
  subscriber.subscribe(b"tick").await?;

  // Messages published before the connection is up are dropped, so keep
  // publishing until one arrives.
  let mut received = None;
  for _ in 0..50 {
    publisher.send_string("tick").await?;
    match common::recv_timeout(&subscriber, SHORT_TIMEOUT).await {
      Ok(msg) => {
        received = Some(msg);
        break;
      }
      Err(ZmqError::Timeout) => continue,
      Err(e) => return Err(e),
    }
  }
  assert_eq!(received.map(|m| m.data().to_vec()), Some(b"tick".to_vec()));

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_pub_sub_multipart_is_filtered_on_first_frame() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let publisher = ctx.socket(SocketType::Pub)?;
  let subscriber = ctx.socket(SocketType::Sub)?;

  let endpoint = common::unique_inproc_endpoint();
  publisher.bind(&endpoint).await?;
  subscriber.connect(&endpoint).await?;
  subscriber.subscribe(b"key").await?;

  publisher
    .send_multipart(vec![Msg::from("other"), Msg::from("skipped")])
    .await?;
  publisher
    .send_multipart(vec![Msg::from("key"), Msg::from("payload")])
    .await?;
  let frames = subscriber.recv_multipart().await?;
  assert_eq!(common::frames_as_strings(&frames), vec!["key", "payload"]);

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_sub_cannot_send_and_pub_cannot_recv() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let publisher = ctx.socket(SocketType::Pub)?;
  let subscriber = ctx.socket(SocketType::Sub)?;

  assert!(matches!(subscriber.send_string("x").await, Err(ZmqError::InvalidSocketType(_))));
  assert!(matches!(publisher.try_recv(), Err(ZmqError::InvalidSocketType(_))));

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_xpub_surfaces_new_subscriptions_once() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let xpub = ctx.socket(SocketType::XPub)?;
  let sub_1 = ctx.socket(SocketType::Sub)?;
  let sub_2 = ctx.socket(SocketType::Sub)?;

  let endpoint = common::unique_inproc_endpoint();
  xpub.bind(&endpoint).await?;
  sub_1.connect(&endpoint).await?;
  sub_2.connect(&endpoint).await?;

  sub_1.subscribe(b"A").await?;
  let notice = xpub.recv().await?;
  assert_eq!(notice.data(), b"\x01A");

  // A second holder of the same topic is not reported.
  sub_2.subscribe(b"A").await?;
  common::set_rcvtimeo(&xpub, Duration::from_millis(50)).await?;
  assert!(matches!(xpub.recv().await, Err(ZmqError::Timeout)));

  xpub.send_string("A-update").await?;
  assert_eq!(sub_1.recv_string().await?, "A-update");
  assert_eq!(sub_2.recv_string().await?, "A-update");

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_xpub_verbose_reports_every_subscribe() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let xpub = ctx.socket(SocketType::XPub)?;
  let sub_1 = ctx.socket(SocketType::Sub)?;
  let sub_2 = ctx.socket(SocketType::Sub)?;

  xpub.set_option(XPUB_VERBOSE, &common::int_option(1)).await?;
  let endpoint = common::unique_inproc_endpoint();
  xpub.bind(&endpoint).await?;
  sub_1.connect(&endpoint).await?;
  sub_2.connect(&endpoint).await?;

  sub_1.subscribe(b"A").await?;
  sub_2.subscribe(b"A").await?;
  assert_eq!(xpub.recv().await?.data(), b"\x01A");
  assert_eq!(xpub.recv().await?.data(), b"\x01A");

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_xpub_filters_per_subscriber() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let xpub = ctx.socket(SocketType::XPub)?;
  let sub_a = ctx.socket(SocketType::Sub)?;
  let sub_b = ctx.socket(SocketType::Sub)?;

  let endpoint = common::unique_inproc_endpoint();
  xpub.bind(&endpoint).await?;
  sub_a.connect(&endpoint).await?;
  sub_b.connect(&endpoint).await?;
  sub_a.subscribe(b"a").await?;
  sub_b.subscribe(b"b").await?;

  xpub.send_string("a only").await?;
  xpub.send_string("b only").await?;

  assert_eq!(sub_a.recv_string().await?, "a only");
  assert!(sub_a.try_recv()?.is_none());
  assert_eq!(sub_b.recv_string().await?, "b only");
  assert!(sub_b.try_recv()?.is_none());

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_xpub_welcome_message() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let xpub = ctx.socket(SocketType::XPub)?;
  let subscriber = ctx.socket(SocketType::Sub)?;

  xpub.set_option(XPUB_WELCOME_MSG, b"WELCOME").await?;
  let endpoint = common::unique_inproc_endpoint();
  xpub.bind(&endpoint).await?;
  subscriber.connect(&endpoint).await?;
  subscriber.subscribe(b"WELCOME").await?;

  // The welcome is written when XPUB attaches the new pipe.
  let _ = xpub.try_recv()?;
  assert_eq!(subscriber.recv_string().await?, "WELCOME");

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_xsub_forwards_subscriptions_to_xpub() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let xpub = ctx.socket(SocketType::XPub)?;
  let xsub = ctx.socket(SocketType::XSub)?;

  let endpoint = common::unique_inproc_endpoint();
  xpub.bind(&endpoint).await?;
  xsub.connect(&endpoint).await?;

  xsub.send(Msg::from_static(b"\x01topic")).await?;
  assert_eq!(xpub.recv().await?.data(), b"\x01topic");

  xpub.send_string("topic data").await?;
  assert_eq!(xsub.recv_string().await?, "topic data");

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_sub_resends_subscriptions_after_reconnect() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let first = ctx.socket(SocketType::XPub)?;
  let subscriber = ctx.socket(SocketType::Sub)?;

  subscriber.set_option(IMMEDIATE, &common::int_option(0)).await?;
  subscriber.set_option(RECONNECT_IVL, &common::int_option(20)).await?;
  let sub_monitor = subscriber.monitor_default().await?;

  let endpoint = common::bind_tcp_any(&first).await?;
  subscriber.connect(&endpoint).await?;
  subscriber.subscribe(b"A").await?;
  assert_eq!(common::recv_timeout(&first, LONG_TIMEOUT).await?.data(), b"\x01A");

  first.close().await?;
  common::wait_for_monitor_event(&sub_monitor, LONG_TIMEOUT, |e| {
    matches!(e, SocketEvent::Disconnected { .. })
  })
  .await
  .map_err(ZmqError::Internal)?;

  // The subscriber stays idle; the new publisher learns its topics anyway.
  let second = ctx.socket(SocketType::XPub)?;
  common::bind_with_retry(&second, &endpoint).await?;
  assert_eq!(common::recv_timeout(&second, LONG_TIMEOUT).await?.data(), b"\x01A");

  second.send_string("A-after").await?;
  second.send_string("B-after").await?;
  assert_eq!(common::recv_timeout(&subscriber, LONG_TIMEOUT).await?.data(), b"A-after");
  assert!(matches!(
    common::recv_timeout(&subscriber, SHORT_TIMEOUT).await,
    Err(ZmqError::Timeout)
  ));

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_xpub_nodrop_would_block_on_full_subscriber() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let xpub = ctx.socket(SocketType::XPub)?;
  let subscriber = ctx.socket(SocketType::Sub)?;

  xpub.set_option(SNDHWM, &common::int_option(1)).await?;
  xpub.set_option(XPUB_NODROP, &common::int_option(1)).await?;
  xpub.set_option(SNDTIMEO, &common::int_option(0)).await?;
  let endpoint = common::unique_inproc_endpoint();
  xpub.bind(&endpoint).await?;
  subscriber.connect(&endpoint).await?;
  subscriber.subscribe(b"").await?;
  assert_eq!(xpub.recv().await?.data(), b"\x01");

  xpub.send_string("one").await?;
  assert!(matches!(xpub.send_string("two").await, Err(ZmqError::WouldBlock)));

  assert_eq!(subscriber.recv_string().await?, "one");
  xpub.send_string("two").await?;
  assert_eq!(subscriber.recv_string().await?, "two");

  ctx.term().await?;
  Ok(())
}

#[tokio::test]
async fn test_xpub_without_nodrop_drops_for_full_subscriber() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let xpub = ctx.socket(SocketType::XPub)?;
  let subscriber = ctx.socket(SocketType::Sub)?;

  xpub.set_option(SNDHWM, &common::int_option(1)).await?;
  xpub.set_option(SNDTIMEO, &common::int_option(0)).await?;
  let endpoint = common::unique_inproc_endpoint();
  xpub.bind(&endpoint).await?;
  subscriber.connect(&endpoint).await?;
  subscriber.subscribe(b"").await?;
  assert_eq!(xpub.recv().await?.data(), b"\x01");

  xpub.send_string("one").await?;
  xpub.send_string("two").await?;

  assert_eq!(subscriber.recv_string().await?, "one");
  assert!(subscriber.try_recv()?.is_none());

  ctx.term().await?;
  Ok(())
}
