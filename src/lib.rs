//! zmq-engine - An asynchronous ZeroMQ-style messaging engine on Tokio.
//!
//! Create a [`Context`], open [`Socket`]s of the classic patterns
//! (REQ/REP, DEALER/ROUTER, PUB/SUB, XPUB/XSUB, PUSH/PULL, PAIR, STREAM) and
//! connect them over `tcp://`, `ipc://` or `inproc://` endpoints.

pub mod context;
pub mod error;
pub mod message;
pub mod poller;
pub mod protocol;
pub(crate) mod runtime;
pub(crate) mod session;
pub mod socket;
pub(crate) mod transport;

pub use context::{context, Context, ContextConfig};
pub use error::ZmqError;
pub use message::{Blob, Msg, MsgFlags};
pub use poller::{poll, PollEvents, PollItem};
pub use socket::options;
pub use socket::{MonitorReceiver, Socket, SocketEvent, SocketType};
pub use transport::connecter::{ConnectionState, ConnectionStatus};

// --- Top-Level Functions ---

const VERSION_MAJOR: i32 = 0;
const VERSION_MINOR: i32 = 1;
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}

/// Returns the major version number of the library.
pub fn version_major() -> i32 {
  VERSION_MAJOR
}

/// Returns the minor version number of the library.
pub fn version_minor() -> i32 {
  VERSION_MINOR
}

/// Returns the patch version number of the library.
pub fn version_patch() -> i32 {
  VERSION_PATCH
}
