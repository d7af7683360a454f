//! Downstream command handlers.
//!
//! Each command is served by a `Handler` looked up in the [`Registry`].
//! Handlers work on a [`Context`] borrowing the connection's [`Session`]
//! and the shared [`Server`](crate::state::Server).

mod batch;
mod cap;
mod chathistory;
mod connection;
mod core;
mod passthrough;
mod search;

pub use self::core::{Context, Registry, Session};
