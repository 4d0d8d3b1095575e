// src/socket/patterns/mod.rs

//! Routing building blocks shared by the socket kinds.

pub(crate) mod distributor;
pub(crate) mod fair_queue;
pub(crate) mod load_balancer;
pub(crate) mod router;
pub(crate) mod trie;

pub(crate) use distributor::Distributor;
pub(crate) use fair_queue::FairQueue;
pub(crate) use load_balancer::LoadBalancer;
pub(crate) use router::RouterMap;
pub(crate) use trie::SubscriptionTrie;

use crate::runtime::pipe::Pipe;
use std::collections::HashMap;

/// The pipes currently attached to a socket, keyed by pipe id.
#[derive(Debug, Default)]
pub(crate) struct PipeSet {
  pipes: HashMap<usize, Pipe>,
}

impl PipeSet {
  pub(crate) fn get(&self, id: usize) -> Option<&Pipe> {
    self.pipes.get(&id)
  }

  pub(crate) fn insert(&mut self, pipe: Pipe) {
    self.pipes.insert(pipe.id(), pipe);
  }

  pub(crate) fn remove(&mut self, id: usize) -> Option<Pipe> {
    self.pipes.remove(&id)
  }

  pub(crate) fn len(&self) -> usize {
    self.pipes.len()
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.pipes.is_empty()
  }

  pub(crate) fn iter(&self) -> impl Iterator<Item = &Pipe> {
    self.pipes.values()
  }

  /// Ids of pipes whose peer has gone and whose inbound queue is drained.
  pub(crate) fn exhausted(&self) -> Vec<usize> {
    self.pipes.values().filter(|p| p.is_exhausted()).map(Pipe::id).collect()
  }

  pub(crate) fn drain(&mut self) -> impl Iterator<Item = Pipe> + '_ {
    self.pipes.drain().map(|(_, p)| p)
  }
}
