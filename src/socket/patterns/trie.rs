// src/socket/patterns/trie.rs

use std::collections::HashMap;

#[derive(Debug, Default)]
struct TrieNode {
  children: HashMap<u8, TrieNode>,
  /// Subscriptions ending exactly at this node.
  count: usize,
}

impl TrieNode {
  fn is_unused(&self) -> bool {
    self.count == 0 && self.children.is_empty()
  }
}

/// Counted set of topic prefixes with prefix matching.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionTrie {
  root: TrieNode,
}

impl SubscriptionTrie {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Adds one reference to `topic`. Returns true if the topic is new.
  pub(crate) fn subscribe(&mut self, topic: &[u8]) -> bool {
    let mut node = &mut self.root;
    for &byte in topic {
      node = node.children.entry(byte).or_default();
    }
    node.count += 1;
    tracing::trace!(topic = ?String::from_utf8_lossy(topic), count = node.count, "Subscribed");
    node.count == 1
  }

  /// Drops one reference to `topic`. Returns true if the topic is now gone.
  /// Unknown topics are ignored and return false.
  pub(crate) fn unsubscribe(&mut self, topic: &[u8]) -> bool {
    fn remove(node: &mut TrieNode, topic: &[u8]) -> Option<bool> {
      match topic.split_first() {
        None => {
          if node.count == 0 {
            return None;
          }
          node.count -= 1;
          Some(node.count == 0)
        }
        Some((&byte, rest)) => {
          let child = node.children.get_mut(&byte)?;
          let removed = remove(child, rest)?;
          if child.is_unused() {
            node.children.remove(&byte);
          }
          Some(removed)
        }
      }
    }
    remove(&mut self.root, topic).unwrap_or(false)
  }

  /// True if some subscribed prefix is a prefix of `data`.
  pub(crate) fn matches(&self, data: &[u8]) -> bool {
    let mut node = &self.root;
    if node.count > 0 {
      return true;
    }
    for byte in data {
      match node.children.get(byte) {
        Some(next) => {
          node = next;
          if node.count > 0 {
            return true;
          }
        }
        None => return false,
      }
    }
    false
  }

  /// True if exactly `topic` is subscribed.
  pub(crate) fn contains(&self, topic: &[u8]) -> bool {
    let mut node = &self.root;
    for byte in topic {
      match node.children.get(byte) {
        Some(next) => node = next,
        None => return false,
      }
    }
    node.count > 0
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.root.is_unused()
  }

  /// Every distinct subscribed topic, for replaying to new peers.
  pub(crate) fn topics(&self) -> Vec<Vec<u8>> {
    fn walk(node: &TrieNode, prefix: &mut Vec<u8>, out: &mut Vec<Vec<u8>>) {
      if node.count > 0 {
        out.push(prefix.clone());
      }
      for (&byte, child) in &node.children {
        prefix.push(byte);
        walk(child, prefix, out);
        prefix.pop();
      }
    }
    let mut out = Vec::new();
    walk(&self.root, &mut Vec::new(), &mut out);
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn prefix_matching() {
    let mut trie = SubscriptionTrie::new();
    assert!(!trie.matches(b"weather"));
    trie.subscribe(b"wea");
    assert!(trie.matches(b"weather"));
    assert!(trie.matches(b"wea"));
    assert!(!trie.matches(b"we"));
    assert!(!trie.matches(b"news"));
  }

  #[test]
  fn empty_topic_matches_everything() {
    let mut trie = SubscriptionTrie::new();
    trie.subscribe(b"");
    assert!(trie.matches(b""));
    assert!(trie.matches(b"anything"));
  }

  #[test]
  fn counts_are_reference_counts() {
    let mut trie = SubscriptionTrie::new();
    assert!(trie.subscribe(b"a"));
    assert!(!trie.subscribe(b"a"));
    assert!(!trie.unsubscribe(b"a"));
    assert!(trie.matches(b"abc"));
    assert!(trie.contains(b"a"));
    assert!(!trie.contains(b"ab"));
    assert!(trie.unsubscribe(b"a"));
    assert!(!trie.matches(b"abc"));
    assert!(trie.is_empty());
    assert!(!trie.unsubscribe(b"a"));
  }

  #[test]
  fn topics_lists_distinct_subscriptions() {
    let mut trie = SubscriptionTrie::new();
    trie.subscribe(b"b");
    trie.subscribe(b"ab");
    trie.subscribe(b"ab");
    let mut topics = trie.topics();
    topics.sort();
    assert_eq!(topics, vec![b"ab".to_vec(), b"b".to_vec()]);
  }
}
