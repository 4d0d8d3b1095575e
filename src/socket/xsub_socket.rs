// src/socket/xsub_socket.rs

use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::pipe::{Parts, Pipe};
use crate::socket::options::{OptionValue, SUBSCRIBE, UNSUBSCRIBE};
use crate::socket::patterns::{Distributor, FairQueue, PipeSet, SubscriptionTrie};
use crate::socket::sub_socket::send_subscription;
use crate::socket::{parse_subscription, subscription_message, ISocket};

/// Subscriber that passes subscriptions through as ordinary messages and does
/// no filtering of its own.
#[derive(Debug)]
pub(crate) struct XSubSocket {
  distributor: Distributor,
  fair_queue: FairQueue,
  /// Replayed to publishers that attach later.
  subscriptions: SubscriptionTrie,
}

impl XSubSocket {
  pub(crate) fn new() -> Self {
    Self {
      distributor: Distributor::new(),
      fair_queue: FairQueue::new(),
      subscriptions: SubscriptionTrie::new(),
    }
  }
}

impl ISocket for XSubSocket {
  fn attach(&mut self, _pipes: &PipeSet, pipe: &Pipe) -> Result<(), ZmqError> {
    self.distributor.add_pipe(pipe.id());
    self.fair_queue.add_pipe(pipe.id());
    for topic in self.subscriptions.topics() {
      send_subscription(pipe, true, &topic);
    }
    Ok(())
  }

  fn detach(&mut self, pipe_id: usize) {
    self.distributor.remove_pipe(pipe_id);
    self.fair_queue.remove_pipe(pipe_id);
  }

  fn resumed(&mut self, pipe: &Pipe) {
    for topic in self.subscriptions.topics() {
      send_subscription(pipe, true, &topic);
    }
  }

  fn send(&mut self, pipes: &PipeSet, parts: &[Msg]) -> Result<(), ZmqError> {
    match parse_subscription(parts) {
      Some((true, topic)) => {
        self.subscriptions.subscribe(topic);
      }
      Some((false, topic)) => {
        self.subscriptions.unsubscribe(topic);
      }
      None => {}
    }
    self.distributor.send(pipes, parts, |_| true, false).map(|_| ())
  }

  fn recv(&mut self, pipes: &PipeSet) -> Result<Parts, ZmqError> {
    self
      .fair_queue
      .recv(pipes)
      .map(|(_, parts)| parts)
      .ok_or(ZmqError::WouldBlock)
  }

  fn has_in(&self, pipes: &PipeSet) -> bool {
    self.fair_queue.has_in(pipes)
  }

  fn has_out(&self, _pipes: &PipeSet) -> bool {
    true
  }

  fn set_option(&mut self, pipes: &PipeSet, option: i32, value: &OptionValue) -> Result<(), ZmqError> {
    let subscribe = match option {
      SUBSCRIBE => true,
      UNSUBSCRIBE => false,
      _ => return Err(ZmqError::UnsupportedOption(option)),
    };
    self.send(pipes, &subscription_message(subscribe, &value.as_bytes()))
  }
}
