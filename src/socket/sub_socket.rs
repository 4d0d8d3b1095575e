// src/socket/sub_socket.rs

use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::pipe::{Parts, Pipe, PipeWrite};
use crate::socket::options::{OptionValue, INVERT_MATCHING, SUBSCRIBE, UNSUBSCRIBE};
use crate::socket::patterns::{FairQueue, PipeSet, SubscriptionTrie};
use crate::socket::{first_frame, subscription_message, ISocket};

#[derive(Debug)]
pub(crate) struct SubSocket {
  fair_queue: FairQueue,
  subscriptions: SubscriptionTrie,
  invert_matching: bool,
}

impl SubSocket {
  pub(crate) fn new() -> Self {
    Self {
      fair_queue: FairQueue::new(),
      subscriptions: SubscriptionTrie::new(),
      invert_matching: false,
    }
  }
}

/// Sends a subscription change upstream on one pipe; a full pipe loses it.
pub(crate) fn send_subscription(pipe: &Pipe, subscribe: bool, topic: &[u8]) {
  if let PipeWrite::Full(_) = pipe.try_write(subscription_message(subscribe, topic)) {
    tracing::warn!(pipe_id = pipe.id(), subscribe, "Subscription message dropped, pipe full");
  }
}

impl ISocket for SubSocket {
  fn attach(&mut self, _pipes: &PipeSet, pipe: &Pipe) -> Result<(), ZmqError> {
    self.fair_queue.add_pipe(pipe.id());
    for topic in self.subscriptions.topics() {
      send_subscription(pipe, true, &topic);
    }
    Ok(())
  }

  fn detach(&mut self, pipe_id: usize) {
    self.fair_queue.remove_pipe(pipe_id);
  }

  fn resumed(&mut self, pipe: &Pipe) {
    for topic in self.subscriptions.topics() {
      send_subscription(pipe, true, &topic);
    }
  }

  fn send(&mut self, _pipes: &PipeSet, _parts: &[Msg]) -> Result<(), ZmqError> {
    Err(ZmqError::InvalidSocketType("SUB sockets cannot send; use SUBSCRIBE"))
  }

  fn recv(&mut self, pipes: &PipeSet) -> Result<Parts, ZmqError> {
    while let Some((pipe_id, parts)) = self.fair_queue.recv(pipes) {
      if self.subscriptions.matches(first_frame(&parts)) != self.invert_matching {
        return Ok(parts);
      }
      tracing::trace!(pipe_id, "SUB filtered out message");
    }
    Err(ZmqError::WouldBlock)
  }

  fn has_in(&self, pipes: &PipeSet) -> bool {
    self.fair_queue.has_in(pipes)
  }

  fn has_out(&self, _pipes: &PipeSet) -> bool {
    false
  }

  fn set_option(&mut self, pipes: &PipeSet, option: i32, value: &OptionValue) -> Result<(), ZmqError> {
    match option {
      SUBSCRIBE => {
        let topic = value.as_bytes();
        if self.subscriptions.subscribe(&topic) {
          pipes.iter().for_each(|p| send_subscription(p, true, &topic));
        }
      }
      UNSUBSCRIBE => {
        let topic = value.as_bytes();
        if self.subscriptions.unsubscribe(&topic) {
          pipes.iter().for_each(|p| send_subscription(p, false, &topic));
        }
      }
      INVERT_MATCHING => self.invert_matching = value.as_bool(),
      _ => return Err(ZmqError::UnsupportedOption(option)),
    }
    Ok(())
  }

  fn get_option(&self, option: i32) -> Result<OptionValue, ZmqError> {
    match option {
      INVERT_MATCHING => Ok(OptionValue::Bool(self.invert_matching)),
      _ => Err(ZmqError::UnsupportedOption(option)),
    }
  }
}
