// src/socket/req_socket.rs

use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::pipe::{Parts, Pipe, PipeRead};
use crate::socket::options::{OptionValue, REQ_CORRELATE, REQ_RELAXED};
use crate::socket::patterns::{LoadBalancer, PipeSet};
use crate::socket::ISocket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReqState {
  ReadyToSend,
  ExpectingReply { pipe_id: usize, request_id: u32 },
}

/// Strictly alternating requester.
///
/// Requests go out as `[request id]? "" body..`; a reply is accepted only from
/// the pipe the request went to, and only if its envelope matches.
#[derive(Debug)]
pub(crate) struct ReqSocket {
  load_balancer: LoadBalancer,
  state: ReqState,
  next_request_id: u32,
  relaxed: bool,
  correlate: bool,
}

impl ReqSocket {
  pub(crate) fn new() -> Self {
    Self {
      load_balancer: LoadBalancer::new(),
      state: ReqState::ReadyToSend,
      next_request_id: rand::random(),
      relaxed: false,
      correlate: false,
    }
  }

  /// Strips and checks the reply envelope. `None` means the reply is dropped.
  fn unwrap_reply(&self, mut parts: Parts, request_id: u32) -> Option<Parts> {
    if self.correlate {
      if parts.first().map(Msg::data) != Some(&request_id.to_be_bytes()[..]) {
        return None;
      }
      parts.remove(0);
    }
    if !parts.first().is_some_and(Msg::is_empty) || parts.len() < 2 {
      return None;
    }
    parts.remove(0);
    Some(parts)
  }

  /// Throws away anything that arrived on pipes other than the awaited one.
  fn discard_strays(&self, pipes: &PipeSet, awaited: usize) {
    for pipe in pipes.iter().filter(|p| p.id() != awaited) {
      while let PipeRead::Message(parts) = pipe.try_read() {
        tracing::trace!(pipe_id = pipe.id(), frames = parts.len(), "REQ dropped reply from unexpected peer");
      }
    }
  }
}

impl ISocket for ReqSocket {
  fn attach(&mut self, _pipes: &PipeSet, pipe: &Pipe) -> Result<(), ZmqError> {
    self.load_balancer.add_pipe(pipe.id());
    Ok(())
  }

  fn detach(&mut self, pipe_id: usize) {
    self.load_balancer.remove_pipe(pipe_id);
  }

  fn send(&mut self, pipes: &PipeSet, parts: &[Msg]) -> Result<(), ZmqError> {
    if matches!(self.state, ReqState::ExpectingReply { .. }) && !self.relaxed {
      return Err(ZmqError::InvalidState("REQ socket must receive a reply before sending again"));
    }
    let request_id = self.next_request_id;
    let mut request = Vec::with_capacity(parts.len() + 2);
    if self.correlate {
      request.push(Msg::from_vec(request_id.to_be_bytes().to_vec()));
    }
    request.push(Msg::new());
    request.extend_from_slice(parts);

    let pipe_id = self.load_balancer.send(pipes, &request)?;
    self.next_request_id = self.next_request_id.wrapping_add(1);
    if let ReqState::ExpectingReply { pipe_id: old, .. } = self.state {
      tracing::debug!(abandoned_pipe = old, "REQ_RELAXED abandoned outstanding request");
    }
    self.state = ReqState::ExpectingReply { pipe_id, request_id };
    Ok(())
  }

  fn recv(&mut self, pipes: &PipeSet) -> Result<Parts, ZmqError> {
    let ReqState::ExpectingReply { pipe_id, request_id } = self.state else {
      return Err(ZmqError::InvalidState("REQ socket must send a request before receiving"));
    };
    self.discard_strays(pipes, pipe_id);
    let pipe = pipes.get(pipe_id).ok_or(ZmqError::WouldBlock)?;
    loop {
      match pipe.try_read() {
        PipeRead::Message(parts) => match self.unwrap_reply(parts, request_id) {
          Some(body) => {
            self.state = ReqState::ReadyToSend;
            return Ok(body);
          }
          None => tracing::debug!(pipe_id, "REQ dropped malformed or mismatched reply"),
        },
        PipeRead::Empty | PipeRead::Closed => return Err(ZmqError::WouldBlock),
      }
    }
  }

  fn has_in(&self, pipes: &PipeSet) -> bool {
    match self.state {
      ReqState::ExpectingReply { pipe_id, .. } => pipes.get(pipe_id).is_some_and(Pipe::has_pending),
      ReqState::ReadyToSend => false,
    }
  }

  fn has_out(&self, pipes: &PipeSet) -> bool {
    (self.relaxed || self.state == ReqState::ReadyToSend) && self.load_balancer.has_out(pipes)
  }

  fn set_option(&mut self, _pipes: &PipeSet, option: i32, value: &OptionValue) -> Result<(), ZmqError> {
    match option {
      REQ_RELAXED => self.relaxed = value.as_bool(),
      REQ_CORRELATE => self.correlate = value.as_bool(),
      _ => return Err(ZmqError::UnsupportedOption(option)),
    }
    Ok(())
  }
}
