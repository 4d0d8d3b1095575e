// src/transport/endpoint.rs

use crate::error::ZmqError;
#[cfg(feature = "ipc")]
use std::path::PathBuf;

/// A parsed endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Endpoint {
  /// `host` is `*` for all interfaces; `port` 0 lets the OS pick one.
  Tcp { host: String, port: u16, uri: String },
  #[cfg(feature = "ipc")]
  Ipc(PathBuf, String),
  #[cfg(feature = "inproc")]
  Inproc(String),
}

impl Endpoint {
  /// The endpoint as the user wrote it.
  pub(crate) fn uri(&self) -> String {
    match self {
      Endpoint::Tcp { uri, .. } => uri.clone(),
      #[cfg(feature = "ipc")]
      Endpoint::Ipc(_, uri) => uri.clone(),
      #[cfg(feature = "inproc")]
      Endpoint::Inproc(name) => format!("inproc://{}", name),
    }
  }

  pub(crate) fn is_network(&self) -> bool {
    match self {
      #[cfg(feature = "inproc")]
      Endpoint::Inproc(_) => false,
      _ => true,
    }
  }
}

/// Parses `tcp://host:port`, `ipc://path` or `inproc://name`.
pub(crate) fn parse_endpoint(endpoint_str: &str) -> Result<Endpoint, ZmqError> {
  let invalid = || ZmqError::InvalidEndpoint(endpoint_str.to_string());
  let (scheme, address) = endpoint_str.split_once("://").ok_or_else(invalid)?;
  if address.is_empty() || address.contains('\0') {
    return Err(invalid());
  }

  match scheme {
    "tcp" => {
      let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
      let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
      if host.is_empty() {
        return Err(invalid());
      }
      let port = match port {
        "*" => 0,
        p => p.parse::<u16>().map_err(|_| {
          tracing::debug!(address, "Failed to parse TCP port");
          invalid()
        })?,
      };
      Ok(Endpoint::Tcp {
        host: host.to_string(),
        port,
        uri: endpoint_str.to_string(),
      })
    }
    #[cfg(feature = "ipc")]
    "ipc" => Ok(Endpoint::Ipc(PathBuf::from(address), endpoint_str.to_string())),
    #[cfg(feature = "inproc")]
    "inproc" => Ok(Endpoint::Inproc(address.to_string())),
    _ => Err(ZmqError::UnsupportedTransport(endpoint_str.to_string())),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tcp_forms() {
    match parse_endpoint("tcp://*:5555").unwrap() {
      Endpoint::Tcp { host, port, .. } => {
        assert_eq!(host, "*");
        assert_eq!(port, 5555);
      }
      other => panic!("unexpected {:?}", other),
    }
    match parse_endpoint("tcp://[::1]:0").unwrap() {
      Endpoint::Tcp { host, port, .. } => {
        assert_eq!(host, "::1");
        assert_eq!(port, 0);
      }
      other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(parse_endpoint("tcp://localhost:*"), Ok(Endpoint::Tcp { port: 0, .. })));
  }

  #[test]
  fn malformed_endpoints() {
    assert!(matches!(parse_endpoint("tcp://127.0.0.1"), Err(ZmqError::InvalidEndpoint(_))));
    assert!(matches!(parse_endpoint("tcp://:80"), Err(ZmqError::InvalidEndpoint(_))));
    assert!(matches!(parse_endpoint("tcp://host:99999"), Err(ZmqError::InvalidEndpoint(_))));
    assert!(matches!(parse_endpoint("no-scheme"), Err(ZmqError::InvalidEndpoint(_))));
    assert!(matches!(parse_endpoint("pgm://eth0;239.1.1.1:5555"), Err(ZmqError::UnsupportedTransport(_))));
  }

  #[cfg(feature = "inproc")]
  #[test]
  fn inproc_uri_round_trips() {
    let ep = parse_endpoint("inproc://workers").unwrap();
    assert_eq!(ep, Endpoint::Inproc("workers".into()));
    assert_eq!(ep.uri(), "inproc://workers");
    assert!(!ep.is_network());
  }
}
