// src/runtime/mod.rs

//! Core asynchronous primitives: Commands, Mailboxes, Pipes, Signals and the
//! I/O threads that drive transports.

pub(crate) mod command;
pub(crate) mod event_bus;
pub(crate) mod io_thread;
pub(crate) mod mailbox;
pub(crate) mod pipe;
pub(crate) mod signal;
