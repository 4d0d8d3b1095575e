// benches/pull_throughput.rs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::time::timeout;
use zmq_engine::options::{LAST_ENDPOINT, RCVHWM, SNDHWM};
use zmq_engine::{Context, Msg, MonitorReceiver, Socket, SocketEvent, SocketType, ZmqError};

const NUM_MESSAGES: usize = 1000;
const SETUP_TIMEOUT: Duration = Duration::from_secs(5);
const BENCH_HWM: i32 = 100_000;

async fn wait_for_event(monitor_rx: &MonitorReceiver, check_event: impl Fn(&SocketEvent) -> bool) -> Result<(), ZmqError> {
  loop {
    match monitor_rx.recv().await {
      Ok(event) if check_event(&event) => return Ok(()),
      Ok(_) => {}
      Err(_) => return Err(ZmqError::Internal("monitor closed".into())),
    }
  }
}

async fn setup_push_pull(ctx: &Context, transport: &str) -> Result<(Socket, Socket), ZmqError> {
  let push = ctx.socket(SocketType::Push)?;
  let pull = ctx.socket(SocketType::Pull)?;
  push.set_option(SNDHWM, &BENCH_HWM.to_ne_bytes()).await?;
  pull.set_option(RCVHWM, &BENCH_HWM.to_ne_bytes()).await?;

  match transport {
    "tcp" => {
      let pull_monitor = pull.monitor_default().await?;
      pull.bind("tcp://127.0.0.1:*").await?;
      let endpoint = String::from_utf8(pull.get_option(LAST_ENDPOINT).await?)
        .map_err(|_| ZmqError::Internal("LAST_ENDPOINT is not UTF-8".into()))?;
      push.connect(&endpoint).await?;
      wait_for_event(&pull_monitor, |e| matches!(e, SocketEvent::HandshakeSucceeded { .. })).await?;
    }
    _ => {
      let endpoint = format!("inproc://bench-{}", std::process::id());
      pull.bind(&endpoint).await?;
      push.connect(&endpoint).await?;
    }
  }
  Ok((push, pull))
}

fn push_pull_throughput(c: &mut Criterion) {
  let rt = Runtime::new().expect("Failed to create Tokio runtime");
  let mut group = c.benchmark_group("PUSH_PULL_Throughput");
  group
    .warm_up_time(Duration::from_secs(3))
    .measurement_time(Duration::from_secs(10))
    .sample_size(20);

  for transport in ["inproc", "tcp"] {
    for size in [16usize, 1024, 16384] {
      group.throughput(Throughput::Bytes((NUM_MESSAGES * size) as u64));
      let bench_id = BenchmarkId::new(transport, format!("{}B", size));

      group.bench_with_input(bench_id, &size, |b, &msg_size| {
        b.to_async(&rt).iter_custom(|_iters| async move {
          let ctx = Context::new().expect("Bench context creation failed");
          let (push, pull) = match timeout(SETUP_TIMEOUT, setup_push_pull(&ctx, transport)).await {
            Ok(Ok(sockets)) => sockets,
            Ok(Err(e)) => panic!("Bench socket setup failed: {}", e),
            Err(_) => panic!("Bench socket setup timed out"),
          };

          let payload = vec![0u8; msg_size];
          let start = Instant::now();

          let sender_task = {
            let push = push.clone();
            tokio::spawn(async move {
              for _ in 0..NUM_MESSAGES {
                push.send(Msg::from_vec(black_box(payload.clone()))).await?;
              }
              Ok::<_, ZmqError>(())
            })
          };
          let receiver_task = {
            let pull = pull.clone();
            tokio::spawn(async move {
              for _ in 0..NUM_MESSAGES {
                let msg = pull.recv().await?;
                black_box(msg.data());
              }
              Ok::<_, ZmqError>(())
            })
          };

          let send_result = sender_task.await.expect("Sender task panicked");
          let recv_result = receiver_task.await.expect("Receiver task panicked");
          let elapsed = start.elapsed();

          ctx.term().await.expect("Context termination failed");
          send_result.expect("Benchmark sender failed");
          recv_result.expect("Benchmark receiver failed");
          elapsed
        });
      });
    }
  }
  group.finish();
}

criterion_group!(benches, push_pull_throughput);
criterion_main!(benches);
