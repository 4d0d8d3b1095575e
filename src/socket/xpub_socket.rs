// src/socket/xpub_socket.rs

use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::pipe::{Parts, Pipe, PipeRead, PipeWrite};
use crate::socket::options::{OptionValue, INVERT_MATCHING, XPUB_NODROP, XPUB_VERBOSE, XPUB_WELCOME_MSG};
use crate::socket::patterns::{Distributor, PipeSet, SubscriptionTrie};
use crate::socket::{first_frame, parse_subscription, subscription_message, ISocket};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};

/// Publisher that filters per subscriber and exposes subscriptions to the user.
#[derive(Debug)]
pub(crate) struct XPubSocket {
  distributor: Distributor,
  subscriptions: HashMap<usize, SubscriptionTrie>,
  /// Subscription changes (and other upstream messages) waiting for `recv`.
  upstream: VecDeque<Parts>,
  verbose: bool,
  nodrop: bool,
  invert_matching: bool,
  welcome: Option<Bytes>,
}

impl XPubSocket {
  pub(crate) fn new() -> Self {
    Self {
      distributor: Distributor::new(),
      subscriptions: HashMap::new(),
      upstream: VecDeque::new(),
      verbose: false,
      nodrop: false,
      invert_matching: false,
      welcome: None,
    }
  }

  /// Reads everything subscribers sent upstream into the tries and the
  /// `upstream` queue.
  fn process_upstream(&mut self, pipes: &PipeSet) {
    for &pipe_id in self.distributor.pipe_ids() {
      let Some(pipe) = pipes.get(pipe_id) else { continue };
      while let PipeRead::Message(parts) = pipe.try_read() {
        let report = match parse_subscription(&parts) {
          Some((subscribe, topic)) => {
            let held_elsewhere = self
              .subscriptions
              .iter()
              .any(|(&id, trie)| id != pipe_id && trie.contains(topic));
            let trie = self.subscriptions.entry(pipe_id).or_default();
            // A pipe holds each topic once, so subscriptions resent after a
            // reconnect change nothing.
            let changed = if subscribe {
              !trie.contains(topic) && trie.subscribe(topic)
            } else {
              trie.unsubscribe(topic)
            };
            (changed && !held_elsewhere) || (subscribe && self.verbose)
          }
          None => true,
        };
        if report {
          self.upstream.push_back(parts);
        }
      }
    }
  }
}

impl ISocket for XPubSocket {
  fn attach(&mut self, _pipes: &PipeSet, pipe: &Pipe) -> Result<(), ZmqError> {
    self.distributor.add_pipe(pipe.id());
    self.subscriptions.insert(pipe.id(), SubscriptionTrie::new());
    if let Some(welcome) = &self.welcome {
      if !matches!(pipe.try_write(vec![Msg::from_bytes(welcome.clone())]), PipeWrite::Written) {
        tracing::debug!(pipe_id = pipe.id(), "Welcome message not delivered");
      }
    }
    Ok(())
  }

  fn detach(&mut self, pipe_id: usize) {
    self.distributor.remove_pipe(pipe_id);
    if let Some(trie) = self.subscriptions.remove(&pipe_id) {
      // Topics nobody else holds are reported as unsubscribed.
      for topic in trie.topics() {
        let still_held = self.subscriptions.values().any(|t| t.contains(&topic));
        if !still_held {
          self.upstream.push_back(subscription_message(false, &topic));
        }
      }
    }
  }

  fn send(&mut self, pipes: &PipeSet, parts: &[Msg]) -> Result<(), ZmqError> {
    self.process_upstream(pipes);
    let topic = first_frame(parts);
    let invert = self.invert_matching;
    let subscriptions = &self.subscriptions;
    let matches = |pipe_id: usize| subscriptions.get(&pipe_id).is_some_and(|t| t.matches(topic) != invert);
    self.distributor.send(pipes, parts, matches, self.nodrop).map(|_| ())
  }

  fn recv(&mut self, pipes: &PipeSet) -> Result<Parts, ZmqError> {
    self.process_upstream(pipes);
    self.upstream.pop_front().ok_or(ZmqError::WouldBlock)
  }

  fn has_in(&self, pipes: &PipeSet) -> bool {
    !self.upstream.is_empty() || pipes.iter().any(Pipe::has_pending)
  }

  fn has_out(&self, pipes: &PipeSet) -> bool {
    !self.nodrop || self.distributor.has_out(pipes)
  }

  fn set_option(&mut self, _pipes: &PipeSet, option: i32, value: &OptionValue) -> Result<(), ZmqError> {
    match option {
      XPUB_VERBOSE => self.verbose = value.as_bool(),
      XPUB_NODROP => self.nodrop = value.as_bool(),
      INVERT_MATCHING => self.invert_matching = value.as_bool(),
      XPUB_WELCOME_MSG => {
        let bytes = value.as_bytes();
        self.welcome = (!bytes.is_empty()).then_some(bytes);
      }
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
