//! Network module.
//!
//! Contains the Gateway (TCP listener), the downstream client task, the
//! upstream network tasks and the line transport they share.

mod downstream;
mod gateway;
pub mod transport;
pub mod upstream;

pub use gateway::Gateway;
