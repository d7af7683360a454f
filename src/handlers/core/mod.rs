//! Core handler infrastructure: the handler trait, per-connection session
//! state and the command registry.

pub mod context;
pub mod registry;

pub use context::{Context, Handler, SaslState, Session};
pub use registry::Registry;
