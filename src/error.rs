// src/error.rs

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive] // Allows adding more variants later without breaking change
pub enum ZmqError {
  // --- I/O Errors ---
  #[error("I/O error: {0}")]
  Io(#[from] io::Error),

  #[error("Invalid argument provided: {0}")]
  InvalidArgument(String), // EINVAL for non-option errors

  // --- Timeouts / Non-blocking ---
  #[error("Operation timed out")]
  Timeout, // ETIMEDOUT
  /// A non-blocking operation could not make progress. Not a failure.
  #[error("Resource temporarily unavailable")]
  WouldBlock, // EAGAIN

  // --- Connection/Binding Errors ---
  #[error("Address already in use: {0}")]
  AddrInUse(String),
  #[error("Address not available: {0}")]
  AddrNotAvailable(String),
  #[error("Connection refused by peer: {0}")]
  ConnectionRefused(String),
  #[error("Host is unreachable: {0}")]
  HostUnreachable(String), // EHOSTUNREACH, also unroutable ROUTER identities
  #[error("Connection closed by peer or transport")]
  ConnectionClosed,
  #[error("Permission denied for endpoint: {0}")]
  PermissionDenied(String),

  // --- Endpoint Errors ---
  #[error("Invalid endpoint format: {0}")]
  InvalidEndpoint(String),
  #[error("Endpoint resolution failed: {0}")]
  EndpointResolutionFailed(String),

  // --- Option Errors ---
  #[error("Unknown socket option: {0}")]
  UnknownOption(String),
  #[error("Invalid value provided for option ID {0}")]
  InvalidOptionValue(i32),
  #[error("Socket option {0} is not supported by this socket type")]
  UnsupportedOption(i32),

  // --- State Errors ---
  #[error("Operation is invalid for the socket type ({0})")]
  InvalidSocketType(&'static str),
  #[error("Operation is invalid for the current socket state: {0}")]
  InvalidState(&'static str), // EFSM
  #[error("Socket already has its maximum number of peers")]
  TooManyPeers,

  // --- Protocol Errors ---
  #[error("Protocol violation: {0}")]
  ProtocolViolation(String), // EPROTO
  #[error("Invalid message format for operation: {0}")]
  InvalidMessage(String),

  // --- Lifecycle ---
  #[error("Context was terminated")]
  ContextTerminated, // ETERM
  #[error("Socket is closed")]
  SocketClosed, // ENOTSOCK

  // --- Resource Limits ---
  #[error("Resource limit reached: {0}")]
  ResourceLimitReached(&'static str), // EMFILE

  // --- Unsupported ---
  #[error("Transport scheme not supported or enabled: {0}")]
  UnsupportedTransport(String), // EPROTONOSUPPORT

  // --- Internal Errors ---
  #[error("Internal library error: {0}")]
  Internal(String),
}

impl ZmqError {
  /// Maps common `std::io::Error` kinds to endpoint-specific variants.
  pub fn from_io_endpoint(e: io::Error, endpoint: &str) -> Self {
    match e.kind() {
      io::ErrorKind::AddrInUse => ZmqError::AddrInUse(endpoint.to_string()),
      io::ErrorKind::AddrNotAvailable => ZmqError::AddrNotAvailable(endpoint.to_string()),
      io::ErrorKind::ConnectionRefused => ZmqError::ConnectionRefused(endpoint.to_string()),
      io::ErrorKind::PermissionDenied => ZmqError::PermissionDenied(endpoint.to_string()),
      io::ErrorKind::NotFound => ZmqError::ConnectionRefused(endpoint.to_string()), // missing ipc path
      io::ErrorKind::TimedOut => ZmqError::Timeout,
      io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => {
        ZmqError::ConnectionClosed
      }
      _ => ZmqError::Io(e),
    }
  }

  /// True for the non-failure "try again" outcome of a non-blocking call.
  pub fn is_would_block(&self) -> bool {
    matches!(self, ZmqError::WouldBlock)
  }

  /// Errors that end a socket's usefulness rather than a single call.
  pub fn is_terminal(&self) -> bool {
    matches!(self, ZmqError::ContextTerminated | ZmqError::SocketClosed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn io_errors_map_to_endpoint_variants() {
    let e = ZmqError::from_io_endpoint(io::Error::from(io::ErrorKind::AddrInUse), "tcp://127.0.0.1:1");
    assert!(matches!(e, ZmqError::AddrInUse(ref ep) if ep == "tcp://127.0.0.1:1"));

    let e = ZmqError::from_io_endpoint(io::Error::from(io::ErrorKind::BrokenPipe), "x");
    assert!(matches!(e, ZmqError::ConnectionClosed));

    let e = ZmqError::from_io_endpoint(io::Error::from(io::ErrorKind::Other), "x");
    assert!(matches!(e, ZmqError::Io(_)));
  }
}
